use std::sync::Arc;

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, get, post, web};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::completion::{ChatRequest, CompletionClient, OpenAiClient, OpenAiConfig};
use crate::config::{ConfigValidator, GateBackend, GateConfig, ServerConfig};
use crate::error::ApiError;
use crate::gate::remote::RemoteGateConfig;
use crate::gate::rules::{self, Rule};
use crate::gate::{Gate, GateError, Guard, LocalGate, RemoteGate};
use crate::logging::{self, LoggingConfig};
use crate::middleware::BotGateMiddleware;

/// Shared handles injected into every handler. Each rate limited route has
/// its own guard so quotas are not shared between routes.
#[derive(Debug)]
pub struct AppState {
    pub demo_rate_limit: Guard,
    pub chat_rate_limit: Guard,
    pub completions: Arc<dyn CompletionClient>,
    pub max_payload_size: usize,
}

impl AppState {
    pub fn new(
        demo_rate_limit: Guard,
        chat_rate_limit: Guard,
        completions: Arc<dyn CompletionClient>,
        max_payload_size: usize,
    ) -> Self {
        Self {
            demo_rate_limit,
            chat_rate_limit,
            completions,
            max_payload_size,
        }
    }
}

/// Build a gate for `rules` on the configured backend. Local gates with a
/// sliding window get a background eviction task.
pub fn build_gate(config: &GateConfig, rules: Vec<Rule>) -> Result<Arc<dyn Gate>, GateError> {
    match config.backend {
        GateBackend::Local => {
            let has_window = rules
                .iter()
                .any(|rule| matches!(rule, Rule::SlidingWindow { .. }));
            let gate = Arc::new(LocalGate::new(rules));
            if has_window {
                gate.spawn_eviction(config.eviction_interval);
            }
            Ok(gate)
        }
        GateBackend::Remote => {
            let gate = RemoteGate::new(
                RemoteGateConfig {
                    base_url: config.decide_url.clone(),
                    key: config.key.clone().unwrap_or_default(),
                    timeout: config.timeout,
                },
                rules,
            )?;
            Ok(Arc::new(gate))
        }
    }
}

fn build_guard(
    name: &'static str,
    config: &GateConfig,
    rules: Vec<Rule>,
) -> Result<Guard, GateError> {
    let gate = build_gate(config, rules)?;
    Ok(Guard::new(name, gate, config.failure_mode).with_trust_forwarded(config.trust_forwarded))
}

/// Build the per-route rate limit guards, the bot guard and the completion
/// client.
pub fn build_components(
    config: &ServerConfig,
) -> Result<(AppState, Guard), Box<dyn std::error::Error + Send + Sync>> {
    let rate_limit_rules = || {
        rules::rate_limit_rules(
            config.rate_limit.window,
            config.rate_limit.max,
            config.rate_limit.cooldown,
        )
    };
    let demo_rate_limit = build_guard("demo_rate_limit", &config.gate, rate_limit_rules())?;
    let chat_rate_limit = build_guard("chat_rate_limit", &config.gate, rate_limit_rules())?;
    let bot_guard = build_guard(
        "bot_detection",
        &config.gate,
        rules::bot_rules(
            config.bot_detection.mode,
            config.bot_detection.block.clone(),
        ),
    )?;

    let completions = OpenAiClient::new(OpenAiConfig {
        base_url: config.completion.base_url.clone(),
        api_key: config.completion.api_key.clone().unwrap_or_default(),
        model: config.completion.model.clone(),
        connect_timeout: config.completion.connect_timeout,
    })?;

    let state = AppState::new(
        demo_rate_limit,
        chat_rate_limit,
        Arc::new(completions),
        config.max_payload_size,
    );
    Ok((state, bot_guard))
}

pub async fn sink_handler(_req: HttpRequest, mut payload: web::Payload) -> HttpResponse {
    // Drain the payload
    while let Some(chunk) = payload.next().await {
        if let Err(err) = chunk {
            debug!("Error while draining payload: {:?}", err);
            break;
        }
    }
    HttpResponse::NotFound().json(json!({"error": "Not Found"}))
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

#[get("/api/arcjet")]
pub async fn arcjet_demo(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let details = data.demo_rate_limit.details(&req);
    ApiError::check_admission(data.demo_rate_limit.check(&details).await)?;

    Ok(HttpResponse::Ok().json(json!({"message": "Hello world"})))
}

#[post("/api/chat")]
pub async fn chat(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let details = data.chat_rate_limit.details(&req);
    let decision = ApiError::check_admission(data.chat_rate_limit.check(&details).await)?;

    // The body is only read once the gate has admitted the request.
    let body = payload
        .to_bytes_limited(data.max_payload_size)
        .await
        .map_err(|_| ApiError::PayloadTooLarge {
            limit: data.max_payload_size,
        })?
        .map_err(|e| ApiError::BadRequest(format!("Failed to read body: {}", e)))?;

    let chat: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid chat request: {}", e)))?;

    debug!(
        decision_id = %decision.id,
        messages = chat.messages.len(),
        "Forwarding chat completion"
    );
    let stream = data.completions.stream_chat(chat.messages).await.map_err(|e| {
        warn!("Chat completion failed before streaming: {}", e);
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .streaming(stream))
}

/// Register the application routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(arcjet_demo).service(chat);
}

pub async fn startup(config: ServerConfig) -> std::io::Result<()> {
    let _log_guard = logging::init_logging(LoggingConfig::from_server_config(&config));

    ConfigValidator::validate(&config).map_err(std::io::Error::other)?;

    info!("Initializing server on {}:{}", config.host, config.port);
    info!("Gate backend: {:?}", config.gate.backend);
    info!("Gate failure mode: {:?}", config.gate.failure_mode);
    info!(
        "Rate limit: {} request(s) per {}, cooldown {}",
        config.rate_limit.max,
        humantime::format_duration(config.rate_limit.window),
        humantime::format_duration(config.rate_limit.cooldown)
    );
    info!(
        "Bot detection: mode {:?}, blocking {:?}, excluding {:?}",
        config.bot_detection.mode, config.bot_detection.block, config.bot_detection.excluded_paths
    );
    info!(
        "Completion model: {} at {}",
        config.completion.model, config.completion.base_url
    );

    let (state, bot_guard) = build_components(&config).map_err(std::io::Error::other)?;
    let app_state = web::Data::new(state);
    let excluded = config.bot_detection.excluded_paths.clone();

    info!("Serving on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(BotGateMiddleware::new(bot_guard.clone(), excluded.clone()))
            .configure(configure)
            .default_service(web::route().to(sink_handler))
    })
    .bind((config.host, config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gate::FailureMode;

    #[tokio::test]
    async fn test_build_components_local_backend() {
        let mut config = ServerConfig::default();
        config.gate.backend = GateBackend::Local;
        config.completion.api_key = Some("sk-test".to_string());

        let (state, bot_guard) = build_components(&config).unwrap();
        assert_eq!(state.demo_rate_limit.name(), "demo_rate_limit");
        assert_eq!(state.chat_rate_limit.name(), "chat_rate_limit");
        assert_eq!(bot_guard.name(), "bot_detection");
        assert_eq!(bot_guard.failure_mode(), FailureMode::Open);
    }

    #[test]
    fn test_build_remote_gate_makes_no_request() {
        let config = GateConfig {
            key: Some("ajkey_test".to_string()),
            decide_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let gate = build_gate(&config, rules::bot_rules(Default::default(), vec![])).unwrap();
        assert_eq!(gate.backend(), "remote");
    }
}
