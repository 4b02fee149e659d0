use crate::acl::{AclError, AclStore};
use crate::config::{bootstrap_state_root, load_env_config, BotConfig, ConfigError};
use crate::docker::DockerApiClient;
use crate::registry::ResourceRegistry;
use crate::router::{handle_event, EventPrincipal, InboundEvent, ReplyAction, RouterContext};
use crate::shared::logging::append_event_log;
use crate::telegram::{TelegramApiClient, TelegramError, Update};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const POLL_TIMEOUT_SECS: u64 = 25;
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Acl(#[from] AclError),
    #[error("telegram startup check failed: {0}")]
    Telegram(#[from] TelegramError),
}

pub struct Bot {
    config: BotConfig,
    acl: AclStore,
    registry: ResourceRegistry,
    api: TelegramApiClient,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("config", &self.config)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

/// Process lifecycle: load config, open and seed the ACL store, verify the
/// transport credential, take a first look at the workload manager, then
/// serve events until a stop signal.
pub fn bootstrap() -> Result<Bot, BotError> {
    let config = load_env_config()?;
    bootstrap_state_root(&config.state_root)?;

    let acl = AclStore::open(&config.acl_db_path())?;
    if config.reset_acl {
        acl.reset()?;
        append_event_log(&config.state_root, "info", "acl store reinitialized");
    } else {
        acl.ensure_schema()?;
    }
    let seeded = acl.seed(&config.seeded_ids)?;
    if seeded > 0 {
        append_event_log(
            &config.state_root,
            "info",
            &format!("seeded {seeded} preauthorized principals"),
        );
    }
    if config.admin_id.is_none() {
        append_event_log(
            &config.state_root,
            "info",
            "no admin configured; admission escalation and stop are disabled",
        );
    }

    let api = TelegramApiClient::new(config.bot_token.clone(), config.telegram_api_base.clone());
    api.get_me()?;

    let registry = ResourceRegistry::new(
        Box::new(DockerApiClient::new(config.docker_host.clone())),
        config.workload_label.clone(),
    );
    match registry.refresh() {
        Ok(snapshot) => append_event_log(
            &config.state_root,
            "info",
            &format!("found {} labeled workloads", snapshot.len()),
        ),
        Err(err) => append_event_log(
            &config.state_root,
            "warn",
            &format!("initial registry refresh failed: {err}"),
        ),
    }

    Ok(Bot {
        config,
        acl,
        registry,
        api,
    })
}

pub fn event_from_update(update: &Update) -> Option<InboundEvent> {
    if let Some(callback) = &update.callback_query {
        let data = callback.data.clone()?;
        let message = callback.message.as_ref()?;
        return Some(InboundEvent::Callback {
            principal: EventPrincipal {
                id: callback.from.id,
                display_name: callback.from.display_name(),
            },
            chat_id: message.chat.id,
            message_id: message.message_id,
            callback_id: callback.id.clone(),
            data,
        });
    }

    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;
    let text = message.text.clone()?;
    Some(InboundEvent::Command {
        principal: EventPrincipal {
            id: from.id,
            display_name: from.display_name(),
        },
        chat_id: message.chat.id,
        text,
    })
}

fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::from_millis(0) {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(200));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !stop.load(Ordering::Relaxed)
}

impl Bot {
    pub fn run_until_stop(&self, stop: &AtomicBool) {
        let stop_file = self.config.stop_signal_path();
        let _ = fs::remove_file(&stop_file);

        let mut offset = 0i64;
        while !stop.load(Ordering::Relaxed) {
            if stop_file.exists() {
                append_event_log(&self.config.state_root, "info", "stop signal received");
                break;
            }
            match self.api.get_updates(offset, POLL_TIMEOUT_SECS) {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(&update);
                    }
                }
                Err(err) => {
                    append_event_log(
                        &self.config.state_root,
                        "warn",
                        &format!("poll failed: {err}"),
                    );
                    if !sleep_with_stop(stop, RETRY_INTERVAL) {
                        break;
                    }
                }
            }
        }
    }

    fn dispatch(&self, update: &Update) {
        let Some(event) = event_from_update(update) else {
            return;
        };
        let ctx = RouterContext {
            config: &self.config,
            registry: &self.registry,
            acl: &self.acl,
        };
        let actions = handle_event(&ctx, &event);
        self.execute(&actions);
    }

    /// Delivery failures are logged and the remaining actions still run; a
    /// broken edit must not swallow the acknowledgement or a notification.
    fn execute(&self, actions: &[ReplyAction]) {
        for action in actions {
            let result: Result<(), TelegramError> = match action {
                ReplyAction::AnswerCallback { callback_id } => {
                    self.api.answer_callback_query(callback_id)
                }
                ReplyAction::Typing { chat_id } => self.api.send_chat_action_typing(*chat_id),
                ReplyAction::SendMessage {
                    chat_id,
                    text,
                    keyboard,
                } => self.api.send_message(*chat_id, text, keyboard.as_ref()),
                ReplyAction::EditMessage {
                    chat_id,
                    message_id,
                    text,
                    keyboard,
                } => self
                    .api
                    .edit_message_text(*chat_id, *message_id, text, keyboard.as_ref()),
            };
            if let Err(err) = result {
                append_event_log(
                    &self.config.state_root,
                    "warn",
                    &format!("reply delivery failed: {err}"),
                );
            }
        }
    }
}
