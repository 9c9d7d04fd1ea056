use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "arcscope_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request. Empty means no auth header.
    #[serde(default)]
    pub api_key: String,

    /// Timeout for the non-streaming manual action call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect timeout for every request, streaming ones included.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reject `start` when the run configuration carries no credential.
    #[serde(default)]
    pub require_credential: bool,

    #[serde(default = "default_start_path")]
    pub start_path: String,

    /// `{handle}` is replaced by the session handle.
    #[serde(default = "default_continue_path")]
    pub continue_path: String,

    /// `{handle}` is replaced by the session handle.
    #[serde(default = "default_action_path")]
    pub action_path: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_start_path() -> String {
    "/api/runs/stream".to_string()
}

fn default_continue_path() -> String {
    "/api/runs/{handle}/continue".to_string()
}

fn default_action_path() -> String {
    "/api/runs/{handle}/action".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            require_credential: false,
            start_path: default_start_path(),
            continue_path: default_continue_path(),
            action_path: default_action_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Frames larger than this are dropped as decode errors.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Capacity of the run notice broadcast channel.
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,
}

fn default_max_frame_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_notice_capacity() -> usize {
    1024
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            notice_capacity: default_notice_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
[backend]
base_url = "https://arc.example.com"
require_credential = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://arc.example.com");
        assert!(cfg.backend.require_credential);
        assert_eq!(cfg.backend.start_path, "/api/runs/stream");
        assert_eq!(cfg.stream.max_frame_bytes, 8 * 1024 * 1024);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.backend.timeout_ms, 30_000);
        assert!(cfg.logging.console);
        assert!(!cfg.logging.file);
    }
}
