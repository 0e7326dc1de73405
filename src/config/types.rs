use std::str::FromStr;
use std::time::Duration;

use crate::completion::openai::{DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::gate::remote::DEFAULT_DECIDE_URL;
use crate::gate::rules::{
    BotCategory, DEFAULT_RATE_LIMIT_COOLDOWN, DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW,
    Mode,
};
use crate::gate::FailureMode;
use crate::middleware::DEFAULT_EXCLUDED_PREFIXES;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Maximum JSON payload size in bytes
    pub max_payload_size: usize,
    /// Log directory (None = stdout only)
    pub log_dir: Option<String>,
    /// Log level (None = info)
    pub log_level: Option<String>,
    /// Emit logs as JSON
    pub json_logs: bool,
    pub gate: GateConfig,
    pub rate_limit: RateLimitConfig,
    pub bot_detection: BotDetectionConfig,
    pub completion: CompletionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_payload_size: 4 * 1024 * 1024,
            log_dir: None,
            log_level: None,
            json_logs: false,
            gate: GateConfig::default(),
            rate_limit: RateLimitConfig::default(),
            bot_detection: BotDetectionConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

/// Where admission decisions are made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateBackend {
    /// Remote decision service, authenticated with the site key
    #[default]
    Remote,
    /// In-process rule evaluation
    Local,
}

impl FromStr for GateBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(GateBackend::Remote),
            "local" => Ok(GateBackend::Local),
            other => Err(format!("unknown gate backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub backend: GateBackend,
    /// Site key for the decision service
    pub key: Option<String>,
    /// Decision service base URL
    pub decide_url: String,
    /// Timeout for one decision request
    pub timeout: Duration,
    /// Behavior when the decision service fails
    pub failure_mode: FailureMode,
    /// How often the local backend sweeps idle clients
    pub eviction_interval: Duration,
    /// Take the client ip from `Forwarded`/`X-Forwarded-For`. Only safe
    /// behind a proxy that overwrites those headers.
    pub trust_forwarded: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            backend: GateBackend::Remote,
            key: None,
            decide_url: DEFAULT_DECIDE_URL.to_string(),
            timeout: Duration::from_millis(1000),
            failure_mode: FailureMode::Open,
            eviction_interval: Duration::from_secs(60),
            trust_forwarded: false,
        }
    }
}

/// Sliding window applied to the demo and chat endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max: u32,
    pub cooldown: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_RATE_LIMIT_WINDOW,
            max: DEFAULT_RATE_LIMIT_MAX,
            cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }
}

/// Bot rule applied by the global middleware
#[derive(Debug, Clone, PartialEq)]
pub struct BotDetectionConfig {
    pub mode: Mode,
    pub block: Vec<BotCategory>,
    /// Path prefixes the middleware never inspects
    pub excluded_paths: Vec<String>,
}

impl Default for BotDetectionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Live,
            block: vec![BotCategory::Automated],
            excluded_paths: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub connect_timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
