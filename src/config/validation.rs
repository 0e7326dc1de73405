use super::*;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &ServerConfig) -> ConfigResult<()> {
        Self::validate_server_settings(config)?;
        Self::validate_gate(&config.gate)?;
        Self::validate_rate_limit(&config.rate_limit)?;
        Self::validate_bot_detection(&config.bot_detection)?;
        Self::validate_completion(&config.completion)?;
        Ok(())
    }

    fn validate_server_settings(config: &ServerConfig) -> ConfigResult<()> {
        if config.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: config.port.to_string(),
                reason: "Port must be > 0".to_string(),
            });
        }

        if config.max_payload_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_payload_size".to_string(),
                value: config.max_payload_size.to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_gate(gate: &GateConfig) -> ConfigResult<()> {
        if gate.backend == GateBackend::Remote {
            if gate.key.as_deref().is_none_or(|k| k.trim().is_empty()) {
                return Err(ConfigError::MissingRequired {
                    field: "gate key (ARCJET_KEY)".to_string(),
                });
            }
            Self::validate_url("decide_url", &gate.decide_url)?;
        }

        if gate.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "gate.timeout".to_string(),
                value: "0".to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        if gate.eviction_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "gate.eviction_interval".to_string(),
                value: "0".to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_rate_limit(rate_limit: &RateLimitConfig) -> ConfigResult<()> {
        if rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.window".to_string(),
                value: humantime::format_duration(rate_limit.window).to_string(),
                reason: "Window must be > 0".to_string(),
            });
        }

        if rate_limit.max == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.max".to_string(),
                value: "0".to_string(),
                reason: "Must admit at least one request per window".to_string(),
            });
        }

        Ok(())
    }

    fn validate_bot_detection(bot: &BotDetectionConfig) -> ConfigResult<()> {
        if bot.block.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "Bot detection needs at least one category to block".to_string(),
            });
        }

        if let Some(path) = bot.excluded_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::InvalidValue {
                field: "bot_detection.excluded_paths".to_string(),
                value: path.clone(),
                reason: "Excluded paths must start with '/'".to_string(),
            });
        }

        Ok(())
    }

    fn validate_completion(completion: &CompletionConfig) -> ConfigResult<()> {
        if completion
            .api_key
            .as_deref()
            .is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingRequired {
                field: "completion api key (OPENAI_API_KEY)".to_string(),
            });
        }

        if completion.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "completion.model".to_string(),
            });
        }

        Self::validate_url("completion.base_url", &completion.base_url)
    }

    fn validate_url(field: &str, url: &str) -> ConfigResult<()> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: url.to_string(),
                reason: "URL must start with http:// or https://".to_string(),
            });
        }
        Ok(())
    }
}
