use crate::acl::Membership;
use crate::protocol::{admission_token, AdmissionStage, CallbackToken};

/// Admission prompt routed to the admin when an unknown principal asks for a
/// guarded command. The three tokens are the three terminal outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPrompt {
    pub admin_id: i64,
    pub text: String,
    pub approve: CallbackToken,
    pub decline: CallbackToken,
    pub ban: CallbackToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// Admin identity is not self-service; failing the admin guard produces
    /// no reply at all.
    DeniedSilently,
    /// Visible rejection with no escalation: the principal is banned, or no
    /// admin is configured to escalate to.
    Denied,
    DeniedWithEscalation { prompt: EscalationPrompt },
}

pub fn require_admin(admin_id: Option<i64>, principal_id: i64) -> Verdict {
    match admin_id {
        Some(admin) if admin == principal_id => Verdict::Allowed,
        _ => Verdict::DeniedSilently,
    }
}

pub fn require_member(
    admin_id: Option<i64>,
    membership: Membership,
    principal_id: i64,
    display_name: &str,
) -> Verdict {
    if admin_id == Some(principal_id) {
        return Verdict::Allowed;
    }
    match membership {
        Membership::Authorized => Verdict::Allowed,
        Membership::Banned => Verdict::Denied,
        Membership::Unauthorized => match admin_id {
            Some(admin) => Verdict::DeniedWithEscalation {
                prompt: escalation_prompt(admin, principal_id, display_name),
            },
            None => Verdict::Denied,
        },
    }
}

fn escalation_prompt(admin_id: i64, principal_id: i64, display_name: &str) -> EscalationPrompt {
    EscalationPrompt {
        admin_id,
        text: format!("{display_name} ({principal_id}) is asking for access. Let them in?"),
        approve: admission_token(AdmissionStage::Approve, principal_id, display_name),
        decline: admission_token(AdmissionStage::Decline, principal_id, display_name),
        ban: admission_token(AdmissionStage::Ban, principal_id, display_name),
    }
}
