//! Request admission gates.
//!
//! A [`Gate`] evaluates an inbound request against the rules it was built with
//! and returns a [`Decision`]. Handlers never talk to a gate directly; they go
//! through a [`Guard`], which applies the configured [`FailureMode`] when the
//! gate itself cannot answer.

pub mod bot;
pub mod decision;
pub mod local;
pub mod remote;
pub mod rules;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use actix_web::HttpRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub use decision::{Conclusion, Decision, Reason};
pub use local::LocalGate;
pub use remote::RemoteGate;
pub use rules::{BotCategory, Mode, Rule};

/// Key used for clients whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers never forwarded to a decision service.
const REDACTED_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization"];

/// Gate errors
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Decision service unreachable: {0}")]
    Network(String),

    #[error("Decision service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid decision response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GateError::InvalidResponse(err.to_string())
        } else {
            GateError::Network(err.to_string())
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;

/// The parts of an inbound request a gate needs to reach a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub ip: Option<String>,
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub user_agent: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RequestDetails {
    /// Snapshot `req`. The client ip is the socket peer unless
    /// `trust_forwarded` is set, in which case `Forwarded` and
    /// `X-Forwarded-For` take precedence. Those headers are client-controlled
    /// and only meaningful behind a proxy that overwrites them.
    pub fn from_request(req: &HttpRequest, trust_forwarded: bool) -> Self {
        let conn = req.connection_info();
        let ip = if trust_forwarded {
            conn.realip_remote_addr().map(normalize_addr)
        } else {
            req.peer_addr().map(|addr| addr.ip().to_string())
        };
        let host = conn.host().to_string();
        drop(conn);

        let user_agent = req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let headers = req
            .headers()
            .iter()
            .filter(|(name, _)| !REDACTED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            ip,
            method: req.method().as_str().to_string(),
            host,
            path: req.path().to_string(),
            query: req.query_string().to_string(),
            user_agent,
            headers,
        }
    }

    /// Identity used to key per-client state.
    pub fn client_key(&self) -> &str {
        self.ip.as_deref().unwrap_or(UNKNOWN_CLIENT)
    }
}

/// Strip the port from a peer address; leave forwarded values that are not
/// socket addresses untouched.
fn normalize_addr(addr: &str) -> String {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return sock.ip().to_string();
    }
    if let Ok(ip) = addr.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return ip.to_string();
    }
    addr.to_string()
}

/// A request admission decision service.
#[async_trait]
pub trait Gate: Send + Sync + fmt::Debug {
    /// Evaluate a request. The only suspension point of a gate check.
    async fn protect(&self, details: &RequestDetails) -> GateResult<Decision>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// What a [`Guard`] does when the gate itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Admit the request and log the failure.
    #[default]
    Open,
    /// Refuse the request with 503.
    Closed,
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            other => Err(format!("unknown failure mode '{}'", other)),
        }
    }
}

/// Outcome of a guarded gate check.
#[derive(Debug)]
pub enum Admission {
    Allowed(Decision),
    Denied(Decision),
    Unavailable(GateError),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed(_))
    }
}

/// A gate plus the policy applied when it cannot answer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Guard {
    name: &'static str,
    gate: Arc<dyn Gate>,
    failure_mode: FailureMode,
    trust_forwarded: bool,
}

impl Guard {
    pub fn new(name: &'static str, gate: Arc<dyn Gate>, failure_mode: FailureMode) -> Self {
        Self {
            name,
            gate,
            failure_mode,
            trust_forwarded: false,
        }
    }

    /// Key clients by forwarding headers instead of the socket peer.
    pub fn with_trust_forwarded(mut self, trust_forwarded: bool) -> Self {
        self.trust_forwarded = trust_forwarded;
        self
    }

    /// Request snapshot keyed the way this guard identifies clients.
    pub fn details(&self, req: &HttpRequest) -> RequestDetails {
        RequestDetails::from_request(req, self.trust_forwarded)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub async fn check(&self, details: &RequestDetails) -> Admission {
        match self.gate.protect(details).await {
            Ok(decision) if decision.is_denied() => {
                debug!(
                    guard = self.name,
                    decision_id = %decision.id,
                    client = details.client_key(),
                    path = %details.path,
                    "Request denied: {}",
                    decision.reason
                );
                Admission::Denied(decision)
            }
            Ok(decision) => {
                if decision.is_errored() {
                    warn!(
                        guard = self.name,
                        decision_id = %decision.id,
                        "Decision service reported an error, admitting: {}",
                        decision.reason
                    );
                }
                Admission::Allowed(decision)
            }
            Err(err) => match self.failure_mode {
                FailureMode::Open => {
                    warn!(
                        guard = self.name,
                        backend = self.gate.backend(),
                        "Gate check failed, failing open: {}",
                        err
                    );
                    Admission::Allowed(Decision::new(
                        Conclusion::Error,
                        Reason::Error {
                            message: err.to_string(),
                        },
                    ))
                }
                FailureMode::Closed => {
                    error!(
                        guard = self.name,
                        backend = self.gate.backend(),
                        "Gate check failed, failing closed: {}",
                        err
                    );
                    Admission::Unavailable(err)
                }
            },
        }
    }
}
