use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn event_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/workbot.log")
}

/// Appends one timestamped line to the event log. Logging must never fail the
/// request path, so io errors are swallowed.
pub fn append_event_log(state_root: &Path, level: &str, message: &str) {
    let path = event_log_path(state_root);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let _ = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| writeln!(file, "{stamp} {level} {message}"));
}
