use super::{InlineKeyboard, TelegramError, Update, User};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Spare margin over the long-poll timeout so the HTTP call outlives it.
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct TelegramApiClient {
    api_base: String,
    bot_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct TelegramEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

impl TelegramApiClient {
    pub fn new(bot_token: String, api_base: Option<String>) -> Self {
        Self {
            api_base: api_base
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            bot_token,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.bot_token,
            method
        )
    }

    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let mut request = ureq::post(&self.endpoint(method));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send_json(body)
            .map_err(|e| TelegramError::ApiRequest(e.to_string()))?;
        let envelope: TelegramEnvelope<T> = response
            .into_json()
            .map_err(|e| TelegramError::ApiRequest(e.to_string()))?;
        if !envelope.ok {
            return Err(TelegramError::ApiResponse(
                envelope
                    .description
                    .unwrap_or_else(|| format!("{method} failed")),
            ));
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::ApiResponse(format!("{method} returned no result")))
    }

    pub fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", json!({}), None)
    }

    pub fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
            Some(Duration::from_secs(timeout_secs + HTTP_TIMEOUT_MARGIN_SECS)),
        )
    }

    pub fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }
        let _: serde_json::Value = self.call("sendMessage", body, None)?;
        Ok(())
    }

    pub fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }
        let _: serde_json::Value = self.call("editMessageText", body, None)?;
        Ok(())
    }

    /// Callback queries must be answered even when no notification is shown;
    /// some clients stay stuck on a spinner otherwise.
    pub fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let _: serde_json::Value = self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_query_id }),
            None,
        )?;
        Ok(())
    }

    pub fn send_chat_action_typing(&self, chat_id: i64) -> Result<(), TelegramError> {
        let _: serde_json::Value = self.call(
            "sendChatAction",
            json!({ "chat_id": chat_id, "action": "typing" }),
            None,
        )?;
        Ok(())
    }
}
