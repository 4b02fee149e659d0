use crate::registry::ResourceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceVerb {
    Start,
    Stop,
}

impl ResourceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceVerb::Start => "start",
            ResourceVerb::Stop => "stop",
        }
    }

    pub fn desired_state(&self) -> ResourceState {
        match self {
            ResourceVerb::Start => ResourceState::Running,
            ResourceVerb::Stop => ResourceState::NotRunning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStage {
    Request,
    Yes,
    No,
}

impl ConfirmStage {
    fn as_str(&self) -> &'static str {
        match self {
            ConfirmStage::Request => "request",
            ConfirmStage::Yes => "yes",
            ConfirmStage::No => "no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    Approve,
    Decline,
    Ban,
}

impl AdmissionStage {
    fn as_str(&self) -> &'static str {
        match self {
            AdmissionStage::Approve => "yes",
            AdmissionStage::Decline => "no",
            AdmissionStage::Ban => "ban",
        }
    }
}

/// The entire state of a pending confirmation, round-tripped through the
/// client as `verb/stage/target[/extra]`. There is no server-side session:
/// whoever holds a token can advance the protocol, and replaying a token
/// re-executes its action. Tokens are untrusted client input and are parsed
/// strictly, once, at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackToken {
    Resource {
        verb: ResourceVerb,
        stage: ConfirmStage,
        name: String,
    },
    Admission {
        stage: AdmissionStage,
        principal_id: i64,
        display_name: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("callback token `{0}` has too few fields")]
    TooFewFields(String),
    #[error("unknown token verb `{0}`")]
    UnknownVerb(String),
    #[error("unknown stage `{stage}` for verb `{verb}`")]
    UnknownStage { verb: String, stage: String },
    #[error("callback token `{0}` has an empty target")]
    EmptyTarget(String),
    #[error("invalid principal id `{0}` in admission token")]
    InvalidPrincipalId(String),
}

impl CallbackToken {
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let (verb, rest) = raw
            .split_once('/')
            .ok_or_else(|| TokenError::TooFewFields(raw.to_string()))?;

        match verb {
            "start" | "stop" => {
                let (stage, name) = rest
                    .split_once('/')
                    .ok_or_else(|| TokenError::TooFewFields(raw.to_string()))?;
                let stage = match stage {
                    "request" => ConfirmStage::Request,
                    "yes" => ConfirmStage::Yes,
                    "no" => ConfirmStage::No,
                    other => {
                        return Err(TokenError::UnknownStage {
                            verb: verb.to_string(),
                            stage: other.to_string(),
                        })
                    }
                };
                if name.is_empty() {
                    return Err(TokenError::EmptyTarget(raw.to_string()));
                }
                let verb = if verb == "start" {
                    ResourceVerb::Start
                } else {
                    ResourceVerb::Stop
                };
                Ok(CallbackToken::Resource {
                    verb,
                    stage,
                    name: name.to_string(),
                })
            }
            "add" => {
                let (stage, rest) = rest
                    .split_once('/')
                    .ok_or_else(|| TokenError::TooFewFields(raw.to_string()))?;
                let stage = match stage {
                    "yes" => AdmissionStage::Approve,
                    "no" => AdmissionStage::Decline,
                    "ban" => AdmissionStage::Ban,
                    other => {
                        return Err(TokenError::UnknownStage {
                            verb: verb.to_string(),
                            stage: other.to_string(),
                        })
                    }
                };
                // The display name is the final field and may itself contain
                // slashes, so only the id is split off.
                let (id, display_name) = rest
                    .split_once('/')
                    .ok_or_else(|| TokenError::TooFewFields(raw.to_string()))?;
                if display_name.is_empty() {
                    return Err(TokenError::EmptyTarget(raw.to_string()));
                }
                let principal_id = id
                    .parse::<i64>()
                    .map_err(|_| TokenError::InvalidPrincipalId(id.to_string()))?;
                Ok(CallbackToken::Admission {
                    stage,
                    principal_id,
                    display_name: display_name.to_string(),
                })
            }
            other => Err(TokenError::UnknownVerb(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackToken::Resource { verb, stage, name } => {
                format!("{}/{}/{}", verb.as_str(), stage.as_str(), name)
            }
            CallbackToken::Admission {
                stage,
                principal_id,
                display_name,
            } => format!("add/{}/{}/{}", stage.as_str(), principal_id, display_name),
        }
    }
}

pub fn resource_token(verb: ResourceVerb, stage: ConfirmStage, name: &str) -> CallbackToken {
    CallbackToken::Resource {
        verb,
        stage,
        name: name.to_string(),
    }
}

pub fn admission_token(
    stage: AdmissionStage,
    principal_id: i64,
    display_name: &str,
) -> CallbackToken {
    CallbackToken::Admission {
        stage,
        principal_id,
        display_name: display_name.to_string(),
    }
}
