use std::time::Duration;

use clap::{ArgAction, Parser};
use edge_gate::config::{
    BotDetectionConfig, CompletionConfig, GateBackend, GateConfig, RateLimitConfig, ServerConfig,
};
use edge_gate::gate::FailureMode;
use edge_gate::gate::rules::{BotCategory, Mode};
use edge_gate::middleware::DEFAULT_EXCLUDED_PREFIXES;
use edge_gate::server;

#[derive(Parser, Debug)]
#[command(name = "edge-gate")]
#[command(about = "Edge Gate - Rate-limited demo endpoint and streaming chat behind a bot filter")]
#[command(long_about = r#"
Edge Gate - Rate-limited demo endpoint and streaming chat behind a bot filter

Routes:
  GET  /api/arcjet   demo endpoint, one request per window per client
  POST /api/chat     streams a chat completion as plain text
  GET  /health       liveness

Examples:
  # Remote decision service (keys read from the environment)
  ARCJET_KEY=ajkey_... OPENAI_API_KEY=sk-... edge-gate --port 3000

  # In-process rules, tighter window, no cooldown
  OPENAI_API_KEY=sk-... edge-gate --gate-backend local \
    --rate-limit-window 10s --rate-limit-max 5 --rate-limit-cooldown 0s
"#)]
struct CliArgs {
    /// Host address to bind the server
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Where admission decisions are made
    #[arg(long, default_value = "remote", value_parser = ["remote", "local"])]
    gate_backend: String,

    /// Site key for the decision service
    #[arg(long, env = "ARCJET_KEY", hide_env_values = true)]
    gate_key: Option<String>,

    /// Decision service base URL
    #[arg(long, default_value = edge_gate::gate::remote::DEFAULT_DECIDE_URL)]
    decide_url: String,

    /// Timeout in milliseconds for one decision request
    #[arg(long, default_value_t = 1000)]
    gate_timeout_ms: u64,

    /// Admit (open) or reject (closed) requests when the gate fails
    #[arg(long, default_value = "open", value_parser = ["open", "closed"])]
    gate_failure_mode: String,

    /// Interval in seconds between sweeps of idle local rate limit state
    #[arg(long, default_value_t = 60)]
    gate_eviction_interval_secs: u64,

    /// Identify clients by the Forwarded/X-Forwarded-For headers instead of
    /// the peer address. Enable only behind a trusted reverse proxy.
    #[arg(long, default_value_t = false)]
    trust_forwarded: bool,

    /// Rate limit window (e.g. 60s, 1m)
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    rate_limit_window: Duration,

    /// Requests admitted per window per client
    #[arg(long, default_value_t = 1)]
    rate_limit_max: u32,

    /// Cooldown after a client exceeds the window (e.g. 10m, 0s)
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    rate_limit_cooldown: Duration,

    /// Bot rule mode
    #[arg(long, default_value = "LIVE")]
    bot_mode: Mode,

    /// Bot categories to block (can be specified multiple times)
    #[arg(long, action = ArgAction::Append, default_values_t = [BotCategory::Automated])]
    bot_block: Vec<BotCategory>,

    /// Path prefixes the bot filter skips (can be specified multiple times)
    #[arg(long, action = ArgAction::Append)]
    bot_exclude: Vec<String>,

    /// API key for the completion provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Completion provider base URL
    #[arg(long, default_value = edge_gate::completion::openai::DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Chat model to request
    #[arg(long, default_value = edge_gate::completion::openai::DEFAULT_CHAT_MODEL)]
    model: String,

    /// Connect timeout in seconds for the completion provider
    #[arg(long, default_value_t = 10)]
    completion_connect_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    max_payload_size: usize,

    /// Directory to store log files
    #[arg(long)]
    log_dir: Option<String>,

    /// Set the logging level
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

impl CliArgs {
    /// Convert CLI arguments to ServerConfig
    fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let backend: GateBackend = self.gate_backend.parse().map_err(anyhow::Error::msg)?;
        let failure_mode: FailureMode =
            self.gate_failure_mode.parse().map_err(anyhow::Error::msg)?;

        let excluded_paths = if self.bot_exclude.is_empty() {
            DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.bot_exclude.clone()
        };

        Ok(ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_payload_size: self.max_payload_size,
            log_dir: self.log_dir.clone(),
            log_level: Some(self.log_level.clone()),
            json_logs: self.json_logs,
            gate: GateConfig {
                backend,
                key: self.gate_key.clone(),
                decide_url: self.decide_url.clone(),
                timeout: Duration::from_millis(self.gate_timeout_ms),
                failure_mode,
                eviction_interval: Duration::from_secs(self.gate_eviction_interval_secs),
                trust_forwarded: self.trust_forwarded,
            },
            rate_limit: RateLimitConfig {
                window: self.rate_limit_window,
                max: self.rate_limit_max,
                cooldown: self.rate_limit_cooldown,
            },
            bot_detection: BotDetectionConfig {
                mode: self.bot_mode,
                block: self.bot_block.clone(),
                excluded_paths,
            },
            completion: CompletionConfig {
                base_url: self.openai_base_url.clone(),
                api_key: self.openai_api_key.clone(),
                model: self.model.clone(),
                connect_timeout: Duration::from_secs(self.completion_connect_timeout_secs),
            },
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    println!("Edge Gate starting...");
    println!("Host: {}:{}", cli_args.host, cli_args.port);
    println!("Gate backend: {}", cli_args.gate_backend);

    let server_config = cli_args.to_server_config()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move { server::startup(server_config).await })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_to_server_config() {
        let args = CliArgs::parse_from(["edge-gate"]);
        let config = args.to_server_config().unwrap();
        let defaults = ServerConfig::default();

        assert_eq!(config.port, 3000);
        assert_eq!(config.rate_limit, defaults.rate_limit);
        assert_eq!(config.bot_detection, defaults.bot_detection);
        assert_eq!(config.gate.failure_mode, FailureMode::Open);
        assert!(!config.gate.trust_forwarded);
        assert_eq!(config.completion.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_local_backend_flags() {
        let args = CliArgs::parse_from([
            "edge-gate",
            "--gate-backend",
            "local",
            "--gate-failure-mode",
            "closed",
            "--rate-limit-window",
            "10s",
            "--rate-limit-max",
            "5",
            "--rate-limit-cooldown",
            "0s",
            "--bot-block",
            "AUTOMATED",
            "--bot-block",
            "LIKELY_AUTOMATED",
            "--bot-exclude",
            "/assets",
            "--trust-forwarded",
        ]);
        let config = args.to_server_config().unwrap();

        assert_eq!(config.gate.backend, GateBackend::Local);
        assert_eq!(config.gate.failure_mode, FailureMode::Closed);
        assert!(config.gate.trust_forwarded);
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert_eq!(config.rate_limit.max, 5);
        assert!(config.rate_limit.cooldown.is_zero());
        assert_eq!(
            config.bot_detection.block,
            vec![BotCategory::Automated, BotCategory::LikelyAutomated]
        );
        assert_eq!(config.bot_detection.excluded_paths, vec!["/assets"]);
    }
}
