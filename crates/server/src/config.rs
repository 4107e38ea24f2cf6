//! Service settings, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;

pub const API_TITLE: &str = "Text-to-CAD API";
pub const API_VERSION: &str = "2.0.0";

const DEFAULT_AI_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_AI_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Key for the completion endpoint; `None` means template fallback only
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub ai_endpoint: String,

    pub max_models_per_user: u32,

    /// Generated STL files
    pub temp_dir: PathBuf,
    /// JSON file with user records
    pub user_data_file: PathBuf,
    pub model_ttl: Duration,

    pub analytics_url: Option<String>,

    pub enable_auth: bool,
    pub admin_api_key: Option<String>,

    /// Interpreter for the solid-modeling DSL: program followed by its args.
    /// Source arrives on stdin, the output path is appended as the last arg.
    pub dsl_command: Option<Vec<String>>,
    pub dsl_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse_or = |key: &str, default: u64| -> u64 {
            match get(key) {
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
                    default
                }),
                None => default,
            }
        };
        let flag = |key: &str| {
            get(key)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        let data_root = default_data_root();

        Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("PORT", 8000).min(u16::MAX as u64) as u16,
            ai_api_key: get("ANTHROPIC_API_KEY").or_else(|| get("AI_API_KEY")),
            ai_model: get("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.into()),
            ai_endpoint: get("AI_ENDPOINT").unwrap_or_else(|| DEFAULT_AI_ENDPOINT.into()),
            max_models_per_user: parse_or("MAX_MODELS_PER_USER", 10).max(1) as u32,
            temp_dir: get("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_root.join("temp")),
            user_data_file: get("USER_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_root.join("users.json")),
            model_ttl: Duration::from_secs(parse_or("MODEL_TTL_HOURS", 24) * 3600),
            analytics_url: get("ANALYTICS_URL").map(|u| u.trim_end_matches('/').to_string()),
            enable_auth: flag("ENABLE_AUTH"),
            admin_api_key: get("ADMIN_API_KEY"),
            dsl_command: get("DSL_COMMAND")
                .map(|c| c.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|parts| !parts.is_empty()),
            dsl_timeout: Duration::from_secs(parse_or("DSL_TIMEOUT_SECS", 30).max(1)),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_data_root() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".text-to-cad"))
        .unwrap_or_else(|| std::env::temp_dir().join("text-to-cad"))
}
