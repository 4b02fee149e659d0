use crate::protocol::{AdmissionStage, CallbackToken, ConfirmStage, ResourceVerb};
use crate::registry::{Resource, ResourceState, Snapshot};

/// Outcome of interpreting one callback token against a fresh snapshot.
/// Side effects (manager calls, ACL writes, notifications) are carried out by
/// the router; this decision is pure and exhaustively testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    ConfirmTransition {
        verb: ResourceVerb,
        resource: Resource,
    },
    ExecuteTransition {
        verb: ResourceVerb,
        resource: Resource,
    },
    AlreadyInState {
        name: String,
        state: ResourceState,
    },
    NotFound {
        name: String,
    },
    TransitionDeclined {
        verb: ResourceVerb,
        name: String,
    },
    RecordMembership {
        principal_id: i64,
        display_name: String,
        banned: bool,
    },
    AdmissionDeclined {
        display_name: String,
    },
}

/// The snapshot must have been refreshed within the current event's handling:
/// state embedded in an earlier prompt is never trusted. At `yes` time the
/// target must still exist, but its current state is not re-checked; once the
/// user confirms, the transition is invoked regardless.
pub fn decide(token: &CallbackToken, snapshot: &Snapshot) -> Decision {
    match token {
        CallbackToken::Resource { verb, stage, name } => match stage {
            ConfirmStage::Request => match snapshot.get(name) {
                None => Decision::NotFound { name: name.clone() },
                Some(resource) if resource.state == verb.desired_state() => {
                    Decision::AlreadyInState {
                        name: name.clone(),
                        state: resource.state,
                    }
                }
                Some(resource) => Decision::ConfirmTransition {
                    verb: *verb,
                    resource: resource.clone(),
                },
            },
            ConfirmStage::Yes => match snapshot.get(name) {
                None => Decision::NotFound { name: name.clone() },
                Some(resource) => Decision::ExecuteTransition {
                    verb: *verb,
                    resource: resource.clone(),
                },
            },
            ConfirmStage::No => Decision::TransitionDeclined {
                verb: *verb,
                name: name.clone(),
            },
        },
        CallbackToken::Admission {
            stage,
            principal_id,
            display_name,
        } => match stage {
            AdmissionStage::Approve => Decision::RecordMembership {
                principal_id: *principal_id,
                display_name: display_name.clone(),
                banned: false,
            },
            AdmissionStage::Ban => Decision::RecordMembership {
                principal_id: *principal_id,
                display_name: display_name.clone(),
                banned: true,
            },
            AdmissionStage::Decline => Decision::AdmissionDeclined {
                display_name: display_name.clone(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{admission_token, resource_token};

    fn snapshot(entries: &[(&str, ResourceState)]) -> Snapshot {
        entries
            .iter()
            .enumerate()
            .map(|(index, (name, state))| {
                (
                    name.to_string(),
                    Resource {
                        name: name.to_string(),
                        id: format!("c{index}"),
                        state: *state,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn start_request_on_running_resource_never_prompts() {
        let snap = snapshot(&[("web1", ResourceState::Running)]);
        let token = resource_token(ResourceVerb::Start, ConfirmStage::Request, "web1");
        assert_eq!(
            decide(&token, &snap),
            Decision::AlreadyInState {
                name: "web1".to_string(),
                state: ResourceState::Running,
            }
        );
    }

    #[test]
    fn stop_request_on_stopped_resource_never_prompts() {
        let snap = snapshot(&[("web1", ResourceState::NotRunning)]);
        let token = resource_token(ResourceVerb::Stop, ConfirmStage::Request, "web1");
        assert_eq!(
            decide(&token, &snap),
            Decision::AlreadyInState {
                name: "web1".to_string(),
                state: ResourceState::NotRunning,
            }
        );
    }

    #[test]
    fn request_on_transitionable_resource_asks_for_confirmation() {
        let snap = snapshot(&[("web1", ResourceState::NotRunning)]);
        let token = resource_token(ResourceVerb::Start, ConfirmStage::Request, "web1");
        match decide(&token, &snap) {
            Decision::ConfirmTransition { verb, resource } => {
                assert_eq!(verb, ResourceVerb::Start);
                assert_eq!(resource.name, "web1");
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_resource_is_not_found_at_every_stage() {
        let snap = snapshot(&[]);
        for stage in [ConfirmStage::Request, ConfirmStage::Yes] {
            let token = resource_token(ResourceVerb::Start, stage, "ghost");
            assert_eq!(
                decide(&token, &snap),
                Decision::NotFound {
                    name: "ghost".to_string()
                }
            );
        }
    }

    #[test]
    fn confirmed_transition_executes_even_when_state_already_matches() {
        // The resource reached the desired state between prompt and
        // confirmation; the action is still invoked.
        let snap = snapshot(&[("web1", ResourceState::Running)]);
        let token = resource_token(ResourceVerb::Start, ConfirmStage::Yes, "web1");
        match decide(&token, &snap) {
            Decision::ExecuteTransition { verb, resource } => {
                assert_eq!(verb, ResourceVerb::Start);
                assert_eq!(resource.name, "web1");
            }
            other => panic!("expected execution, got {other:?}"),
        }
    }

    #[test]
    fn declining_a_transition_is_terminal() {
        let snap = snapshot(&[("web1", ResourceState::NotRunning)]);
        let token = resource_token(ResourceVerb::Start, ConfirmStage::No, "web1");
        assert_eq!(
            decide(&token, &snap),
            Decision::TransitionDeclined {
                verb: ResourceVerb::Start,
                name: "web1".to_string(),
            }
        );
    }

    #[test]
    fn admission_stages_map_to_persistence_outcomes() {
        let snap = snapshot(&[]);
        assert_eq!(
            decide(&admission_token(AdmissionStage::Approve, 42, "Alice"), &snap),
            Decision::RecordMembership {
                principal_id: 42,
                display_name: "Alice".to_string(),
                banned: false,
            }
        );
        assert_eq!(
            decide(&admission_token(AdmissionStage::Ban, 42, "Alice"), &snap),
            Decision::RecordMembership {
                principal_id: 42,
                display_name: "Alice".to_string(),
                banned: true,
            }
        );
        assert_eq!(
            decide(&admission_token(AdmissionStage::Decline, 42, "Alice"), &snap),
            Decision::AdmissionDeclined {
                display_name: "Alice".to_string(),
            }
        );
    }
}
