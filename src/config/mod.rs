use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_BOT_TOKEN: &str = "WORKBOT_BOT_TOKEN";
pub const ENV_ADMIN_ID: &str = "WORKBOT_ADMIN_ID";
pub const ENV_AUTHORIZED_IDS: &str = "WORKBOT_AUTHORIZED_IDS";
pub const ENV_RESET_ACL: &str = "WORKBOT_RESET_ACL";
pub const ENV_STATE_ROOT: &str = "WORKBOT_STATE_ROOT";
pub const ENV_DOCKER_HOST: &str = "WORKBOT_DOCKER_HOST";
pub const ENV_WORKLOAD_LABEL: &str = "WORKBOT_DOCKER_LABEL";
pub const ENV_TELEGRAM_API_BASE: &str = "WORKBOT_TELEGRAM_API_BASE";

pub const DEFAULT_STATE_ROOT_DIR: &str = ".workbot";
pub const DEFAULT_DOCKER_HOST: &str = "http://127.0.0.1:2375";
pub const DEFAULT_WORKLOAD_LABEL: &str = "workbot";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var `{0}`")]
    MissingEnvVar(String),
    #[error("invalid principal id `{value}` in `{key}`")]
    InvalidPrincipalId { key: String, value: String },
    #[error("failed to resolve home directory for state root")]
    HomeDirectoryUnavailable,
    #[error("failed to create state path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub bot_token: String,
    pub admin_id: Option<i64>,
    pub seeded_ids: Vec<i64>,
    pub reset_acl: bool,
    pub state_root: PathBuf,
    pub docker_host: String,
    pub workload_label: String,
    pub telegram_api_base: Option<String>,
}

impl BotConfig {
    pub fn acl_db_path(&self) -> PathBuf {
        self.state_root.join("acl/principals.db")
    }

    pub fn stop_signal_path(&self) -> PathBuf {
        self.state_root.join("stop")
    }

    pub fn is_admin(&self, principal_id: i64) -> bool {
        self.admin_id == Some(principal_id)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_principal_id(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidPrincipalId {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn default_state_root() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

/// Reads the full configuration surface from the environment. The bot token
/// is the only hard requirement; everything else has a default or disables a
/// feature when absent.
pub fn load_env_config() -> Result<BotConfig, ConfigError> {
    let bot_token = non_empty_env(ENV_BOT_TOKEN)
        .ok_or_else(|| ConfigError::MissingEnvVar(ENV_BOT_TOKEN.to_string()))?;

    let admin_id = match non_empty_env(ENV_ADMIN_ID) {
        Some(raw) => Some(parse_principal_id(ENV_ADMIN_ID, &raw)?),
        None => None,
    };

    let mut seeded_ids = Vec::new();
    if let Some(raw) = non_empty_env(ENV_AUTHORIZED_IDS) {
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            seeded_ids.push(parse_principal_id(ENV_AUTHORIZED_IDS, part)?);
        }
    }

    let reset_acl = non_empty_env(ENV_RESET_ACL)
        .map(|raw| parse_flag(&raw))
        .unwrap_or(false);

    let state_root = match non_empty_env(ENV_STATE_ROOT) {
        Some(raw) => PathBuf::from(raw),
        None => default_state_root()?,
    };

    Ok(BotConfig {
        bot_token,
        admin_id,
        seeded_ids,
        reset_acl,
        state_root,
        docker_host: non_empty_env(ENV_DOCKER_HOST)
            .unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string()),
        workload_label: non_empty_env(ENV_WORKLOAD_LABEL)
            .unwrap_or_else(|| DEFAULT_WORKLOAD_LABEL.to_string()),
        telegram_api_base: non_empty_env(ENV_TELEGRAM_API_BASE),
    })
}

pub fn bootstrap_state_root(state_root: &Path) -> Result<(), ConfigError> {
    for path in [state_root.join("logs"), state_root.join("acl")] {
        fs::create_dir_all(&path).map_err(|source| ConfigError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
