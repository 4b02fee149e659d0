use crate::acl::{AclStore, PersistOutcome, PrincipalRecord};
use crate::auth::{require_admin, require_member, EscalationPrompt, Verdict};
use crate::config::BotConfig;
use crate::engine::{decide, Decision};
use crate::protocol::{resource_token, CallbackToken, ConfirmStage, ResourceVerb};
use crate::registry::{ResourceRegistry, Snapshot};
use crate::shared::logging::append_event_log;
use crate::telegram::{InlineKeyboard, InlineKeyboardButton};

pub const SERVICE_UNAVAILABLE_TEXT: &str =
    "The workload service is unavailable right now. Try again later.";
pub const NOT_ALLOWED_TEXT: &str = "You are not allowed to control workloads here.";
pub const HELP_TEXT: &str = "Send \"start\" to pick a workload to start.\n\
Send \"status\" to check what is running.\n\
Send \"stop\" to pick a workload to stop (admin only).";
pub const ACCESS_GRANTED_TEXT: &str =
    "You have been granted access. Send \"start\" to pick a workload.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPrincipal {
    pub id: i64,
    pub display_name: String,
}

/// One inbound chat event, already stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command {
        principal: EventPrincipal,
        chat_id: i64,
        text: String,
    },
    Callback {
        principal: EventPrincipal,
        chat_id: i64,
        message_id: i64,
        callback_id: String,
        data: String,
    },
}

/// Replies the transport loop must carry out, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    AnswerCallback {
        callback_id: String,
    },
    Typing {
        chat_id: i64,
    },
    SendMessage {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    EditMessage {
        chat_id: i64,
        message_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
}

pub struct RouterContext<'a> {
    pub config: &'a BotConfig,
    pub registry: &'a ResourceRegistry,
    pub acl: &'a AclStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Stop,
    Help,
}

/// Case-insensitive, word-anchored command recognition. `/start` and
/// "please START the server" both count; "restart" does not.
pub fn recognize_command(text: &str) -> Option<Command> {
    let lowered = text.to_ascii_lowercase();
    for word in lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        match word {
            "start" => return Some(Command::Start),
            "status" => return Some(Command::Status),
            "stop" => return Some(Command::Stop),
            "help" => return Some(Command::Help),
            _ => {}
        }
    }
    None
}

fn send(chat_id: i64, text: impl Into<String>) -> ReplyAction {
    ReplyAction::SendMessage {
        chat_id,
        text: text.into(),
        keyboard: None,
    }
}

fn send_with_keyboard(chat_id: i64, text: impl Into<String>, keyboard: InlineKeyboard) -> ReplyAction {
    ReplyAction::SendMessage {
        chat_id,
        text: text.into(),
        keyboard: Some(keyboard),
    }
}

fn edit(chat_id: i64, message_id: i64, text: impl Into<String>) -> ReplyAction {
    ReplyAction::EditMessage {
        chat_id,
        message_id,
        text: text.into(),
        keyboard: None,
    }
}

fn edit_with_keyboard(
    chat_id: i64,
    message_id: i64,
    text: impl Into<String>,
    keyboard: InlineKeyboard,
) -> ReplyAction {
    ReplyAction::EditMessage {
        chat_id,
        message_id,
        text: text.into(),
        keyboard: Some(keyboard),
    }
}

pub fn handle_event(ctx: &RouterContext<'_>, event: &InboundEvent) -> Vec<ReplyAction> {
    match event {
        InboundEvent::Command {
            principal,
            chat_id,
            text,
        } => handle_command(ctx, principal, *chat_id, text),
        InboundEvent::Callback {
            principal,
            chat_id,
            message_id,
            callback_id,
            data,
        } => handle_callback(ctx, principal, *chat_id, *message_id, callback_id, data),
    }
}

fn handle_command(
    ctx: &RouterContext<'_>,
    principal: &EventPrincipal,
    chat_id: i64,
    text: &str,
) -> Vec<ReplyAction> {
    let Some(command) = recognize_command(text) else {
        return Vec::new();
    };

    // One refresh per inbound event; a failure degrades the state-dependent
    // commands instead of serving a stale snapshot.
    let snapshot = match ctx.registry.refresh() {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("registry refresh failed: {err}"),
            );
            None
        }
    };

    let replies = match command {
        Command::Help => vec![send(chat_id, HELP_TEXT)],
        Command::Status => match &snapshot {
            Some(snapshot) => vec![send(chat_id, status_text(snapshot))],
            None => vec![send(chat_id, SERVICE_UNAVAILABLE_TEXT)],
        },
        Command::Start => start_command(ctx, principal, chat_id, snapshot.as_ref()),
        Command::Stop => stop_command(ctx, principal, chat_id, snapshot.as_ref()),
    };

    if replies.is_empty() {
        return replies;
    }
    let mut out = vec![ReplyAction::Typing { chat_id }];
    out.extend(replies);
    out
}

fn start_command(
    ctx: &RouterContext<'_>,
    principal: &EventPrincipal,
    chat_id: i64,
    snapshot: Option<&Snapshot>,
) -> Vec<ReplyAction> {
    let membership = match ctx.acl.membership(principal.id) {
        Ok(membership) => membership,
        Err(err) => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("membership lookup failed for {}: {err}", principal.id),
            );
            return vec![send(chat_id, SERVICE_UNAVAILABLE_TEXT)];
        }
    };

    match require_member(
        ctx.config.admin_id,
        membership,
        principal.id,
        &principal.display_name,
    ) {
        Verdict::Allowed => start_menu(chat_id, snapshot),
        Verdict::Denied => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("denied guarded command for {}", principal.id),
            );
            vec![send(chat_id, NOT_ALLOWED_TEXT)]
        }
        Verdict::DeniedWithEscalation { prompt } => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("escalating admission request for {}", principal.id),
            );
            vec![send(chat_id, NOT_ALLOWED_TEXT), escalation_message(&prompt)]
        }
        // The member guard never denies silently.
        Verdict::DeniedSilently => Vec::new(),
    }
}

fn stop_command(
    ctx: &RouterContext<'_>,
    principal: &EventPrincipal,
    chat_id: i64,
    snapshot: Option<&Snapshot>,
) -> Vec<ReplyAction> {
    match require_admin(ctx.config.admin_id, principal.id) {
        Verdict::Allowed => stop_menu(chat_id, snapshot),
        _ => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("unauthorized stop attempt by {}", principal.id),
            );
            Vec::new()
        }
    }
}

fn escalation_message(prompt: &EscalationPrompt) -> ReplyAction {
    let keyboard = vec![vec![
        InlineKeyboardButton::new("Allow", prompt.approve.encode()),
        InlineKeyboardButton::new("Deny", prompt.decline.encode()),
        InlineKeyboardButton::new("Ban", prompt.ban.encode()),
    ]];
    send_with_keyboard(prompt.admin_id, prompt.text.clone(), keyboard)
}

fn menu_rows(snapshot: &Snapshot, verb: ResourceVerb) -> InlineKeyboard {
    snapshot
        .values()
        .filter(|resource| resource.state != verb.desired_state())
        .map(|resource| {
            vec![InlineKeyboardButton::new(
                resource.name.clone(),
                resource_token(verb, ConfirmStage::Request, &resource.name).encode(),
            )]
        })
        .collect()
}

fn start_menu(chat_id: i64, snapshot: Option<&Snapshot>) -> Vec<ReplyAction> {
    let Some(snapshot) = snapshot else {
        return vec![send(chat_id, SERVICE_UNAVAILABLE_TEXT)];
    };
    let rows = menu_rows(snapshot, ResourceVerb::Start);
    if rows.is_empty() {
        vec![send(chat_id, "Seems like everything is already running!")]
    } else {
        vec![send_with_keyboard(
            chat_id,
            "Which workload do you want to start?",
            rows,
        )]
    }
}

fn stop_menu(chat_id: i64, snapshot: Option<&Snapshot>) -> Vec<ReplyAction> {
    let Some(snapshot) = snapshot else {
        return vec![send(chat_id, SERVICE_UNAVAILABLE_TEXT)];
    };
    let rows = menu_rows(snapshot, ResourceVerb::Stop);
    if rows.is_empty() {
        vec![send(chat_id, "Nothing is running right now.")]
    } else {
        vec![send_with_keyboard(
            chat_id,
            "Which workload do you want to stop?",
            rows,
        )]
    }
}

fn status_text(snapshot: &Snapshot) -> String {
    if snapshot.is_empty() {
        return "No labeled workloads found.".to_string();
    }
    snapshot
        .values()
        .map(|resource| format!("{} is {}.", resource.name, resource.state))
        .collect::<Vec<_>>()
        .join("\n")
}

fn handle_callback(
    ctx: &RouterContext<'_>,
    principal: &EventPrincipal,
    chat_id: i64,
    message_id: i64,
    callback_id: &str,
    data: &str,
) -> Vec<ReplyAction> {
    // Callback events are acknowledged unconditionally, before anything can
    // short-circuit.
    let mut out = vec![ReplyAction::AnswerCallback {
        callback_id: callback_id.to_string(),
    }];

    let token = match CallbackToken::parse(data) {
        Ok(token) => token,
        Err(err) => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("malformed callback token from {}: {err}", principal.id),
            );
            return out;
        }
    };

    let snapshot = match ctx.registry.refresh() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("registry refresh failed: {err}"),
            );
            out.push(edit(chat_id, message_id, SERVICE_UNAVAILABLE_TEXT));
            return out;
        }
    };

    match decide(&token, &snapshot) {
        Decision::ConfirmTransition { verb, resource } => {
            let keyboard = vec![vec![
                InlineKeyboardButton::new(
                    "Yes",
                    resource_token(verb, ConfirmStage::Yes, &resource.name).encode(),
                ),
                InlineKeyboardButton::new(
                    "No",
                    resource_token(verb, ConfirmStage::No, &resource.name).encode(),
                ),
            ]];
            out.push(edit_with_keyboard(
                chat_id,
                message_id,
                format!(
                    "Do you really want to {} {}?",
                    verb.as_str(),
                    resource.name
                ),
                keyboard,
            ));
        }
        Decision::ExecuteTransition { verb, resource } => {
            let result = match verb {
                ResourceVerb::Start => ctx.registry.start(&resource),
                ResourceVerb::Stop => ctx.registry.stop(&resource),
            };
            match result {
                Ok(()) => {
                    append_event_log(
                        &ctx.config.state_root,
                        "info",
                        &format!("{}ing {} for {}", verb.as_str(), resource.name, principal.id),
                    );
                    out.push(edit(
                        chat_id,
                        message_id,
                        format!("Going to {} {} now...", verb.as_str(), resource.name),
                    ));
                }
                Err(err) => {
                    append_event_log(
                        &ctx.config.state_root,
                        "warn",
                        &format!("{} of {} failed: {err}", verb.as_str(), resource.name),
                    );
                    out.push(edit(
                        chat_id,
                        message_id,
                        format!(
                            "Could not {} {}. Try again later.",
                            verb.as_str(),
                            resource.name
                        ),
                    ));
                }
            }
        }
        Decision::AlreadyInState { name, state } => {
            out.push(edit(chat_id, message_id, format!("{name} is already {state}.")));
        }
        Decision::NotFound { name } => {
            out.push(edit(
                chat_id,
                message_id,
                format!("No workloads found with the name {name}."),
            ));
        }
        Decision::TransitionDeclined { verb, name } => {
            out.push(edit(
                chat_id,
                message_id,
                format!("Alright, not going to {} {}.", verb.as_str(), name),
            ));
        }
        Decision::RecordMembership {
            principal_id,
            display_name,
            banned,
        } => {
            out.extend(record_membership(
                ctx,
                chat_id,
                message_id,
                principal_id,
                &display_name,
                banned,
            ));
        }
        Decision::AdmissionDeclined { display_name } => {
            out.push(edit(
                chat_id,
                message_id,
                format!("Alright, not letting {display_name} in."),
            ));
        }
    }

    out
}

fn record_membership(
    ctx: &RouterContext<'_>,
    chat_id: i64,
    message_id: i64,
    principal_id: i64,
    display_name: &str,
    banned: bool,
) -> Vec<ReplyAction> {
    let record = PrincipalRecord {
        principal_id,
        display_name: display_name.to_string(),
    };
    let decision_text = if banned {
        format!("{display_name} is banned.")
    } else {
        format!("{display_name} now has access.")
    };
    match ctx.acl.persist(&record, banned) {
        Ok(PersistOutcome::Inserted) => {
            append_event_log(
                &ctx.config.state_root,
                "info",
                &format!("recorded membership for {principal_id} (banned={banned})"),
            );
            let mut out = vec![edit(chat_id, message_id, decision_text)];
            if !banned {
                // In a direct chat the principal's user id doubles as the
                // chat id, so the grant notice goes straight to them.
                out.push(send(principal_id, ACCESS_GRANTED_TEXT));
            }
            out
        }
        Ok(PersistOutcome::Duplicate) => {
            // Replayed admission token; the decision already stands.
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("duplicate membership persist for {principal_id}"),
            );
            vec![edit(chat_id, message_id, decision_text)]
        }
        Err(err) => {
            append_event_log(
                &ctx.config.state_root,
                "warn",
                &format!("membership persist failed for {principal_id}: {err}"),
            );
            vec![edit(
                chat_id,
                message_id,
                "Could not record that decision. Try again later.",
            )]
        }
    }
}
