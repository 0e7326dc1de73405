use std::fmt;
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::rules::{BotCategory, duration_secs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conclusion {
    Allow,
    Deny,
    /// The decision service failed to evaluate the request. Never blocks.
    Error,
}

/// Why a decision was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    RateLimit {
        max: u32,
        remaining: u32,
        #[serde(with = "duration_secs")]
        window: Duration,
        /// Time until the client may be admitted again.
        #[serde(with = "duration_secs")]
        reset: Duration,
    },
    Bot {
        category: BotCategory,
        denied: bool,
    },
    Error {
        message: String,
    },
    None,
}

impl Reason {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Reason::RateLimit { .. })
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Reason::Bot { .. })
    }

    /// Seconds a client should wait before retrying, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Reason::RateLimit { reset, .. } if !reset.is_zero() => {
                let secs = reset.as_secs() + u64::from(reset.subsec_nanos() > 0);
                Some(secs)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::RateLimit {
                max,
                remaining,
                window,
                reset,
            } => write!(
                f,
                "rate limit: {} of {} requests remaining in a {}s window, resets in {}s",
                remaining,
                max,
                window.as_secs(),
                reset.as_secs()
            ),
            Reason::Bot { category, .. } => write!(f, "bot detection: client classified as {}", category),
            Reason::Error { message } => write!(f, "decision error: {}", message),
            Reason::None => f.write_str("no rule matched"),
        }
    }
}

/// Result of evaluating a request against a gate's rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub conclusion: Conclusion,
    pub reason: Reason,
}

impl Decision {
    pub fn new(conclusion: Conclusion, reason: Reason) -> Self {
        Self {
            id: generate_decision_id(),
            conclusion,
            reason,
        }
    }

    pub fn allow(reason: Reason) -> Self {
        Self::new(Conclusion::Allow, reason)
    }

    pub fn deny(reason: Reason) -> Self {
        Self::new(Conclusion::Deny, reason)
    }

    pub fn is_denied(&self) -> bool {
        self.conclusion == Conclusion::Deny
    }

    pub fn is_allowed(&self) -> bool {
        !self.is_denied()
    }

    pub fn is_errored(&self) -> bool {
        self.conclusion == Conclusion::Error
    }
}

/// Locally issued decision ids are prefixed `lcl_`.
fn generate_decision_id() -> String {
    let random_part: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("lcl_{}", random_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conclusions() {
        let denied = Decision::deny(Reason::None);
        assert!(denied.is_denied());
        assert!(!denied.is_allowed());

        let errored = Decision::new(
            Conclusion::Error,
            Reason::Error {
                message: "boom".to_string(),
            },
        );
        assert!(errored.is_allowed());
        assert!(errored.is_errored());
    }

    #[test]
    fn test_decision_id_format() {
        let a = Decision::allow(Reason::None);
        let b = Decision::allow(Reason::None);
        assert!(a.id.starts_with("lcl_"));
        assert_eq!(a.id.len(), 28);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let reason = Reason::RateLimit {
            max: 1,
            remaining: 0,
            window: Duration::from_secs(60),
            reset: Duration::from_millis(1500),
        };
        assert_eq!(reason.retry_after_secs(), Some(2));

        let reset_now = Reason::RateLimit {
            max: 1,
            remaining: 0,
            window: Duration::from_secs(60),
            reset: Duration::ZERO,
        };
        assert_eq!(reset_now.retry_after_secs(), None);
        assert_eq!(Reason::None.retry_after_secs(), None);
    }

    #[test]
    fn test_reason_display() {
        let reason = Reason::Bot {
            category: BotCategory::Automated,
            denied: true,
        };
        assert_eq!(
            reason.to_string(),
            "bot detection: client classified as AUTOMATED"
        );
    }
}
