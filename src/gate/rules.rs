use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Window used by the default rate limit rule.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// Requests admitted per window by the default rate limit rule.
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 1;
/// Block applied to a client after it exceeds the default rate limit.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

/// Whether a rule enforces its conclusion or only reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    Live,
    DryRun,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Mode::Live),
            "dry_run" | "dry-run" | "dryrun" => Ok(Mode::DryRun),
            other => Err(format!("unknown rule mode '{}'", other)),
        }
    }
}

/// Client classification reported by bot detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotCategory {
    Automated,
    LikelyAutomated,
    LikelyNotABot,
    VerifiedBot,
    NotAnalyzed,
}

impl BotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotCategory::Automated => "AUTOMATED",
            BotCategory::LikelyAutomated => "LIKELY_AUTOMATED",
            BotCategory::LikelyNotABot => "LIKELY_NOT_A_BOT",
            BotCategory::VerifiedBot => "VERIFIED_BOT",
            BotCategory::NotAnalyzed => "NOT_ANALYZED",
        }
    }
}

impl fmt::Display for BotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "AUTOMATED" => Ok(BotCategory::Automated),
            "LIKELY_AUTOMATED" => Ok(BotCategory::LikelyAutomated),
            "LIKELY_NOT_A_BOT" => Ok(BotCategory::LikelyNotABot),
            "VERIFIED_BOT" => Ok(BotCategory::VerifiedBot),
            "NOT_ANALYZED" => Ok(BotCategory::NotAnalyzed),
            other => Err(format!("unknown bot category '{}'", other)),
        }
    }
}

/// A declarative admission rule handed to a gate at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    /// Counts requests per client over a rolling window. Once `max` is
    /// exceeded the client is refused for `cooldown`.
    SlidingWindow {
        mode: Mode,
        #[serde(with = "duration_secs")]
        window: Duration,
        max: u32,
        #[serde(with = "duration_secs")]
        cooldown: Duration,
    },
    /// Refuses clients whose classification is listed in `block`.
    DetectBot { mode: Mode, block: Vec<BotCategory> },
}

impl Rule {
    pub fn mode(&self) -> Mode {
        match self {
            Rule::SlidingWindow { mode, .. } | Rule::DetectBot { mode, .. } => *mode,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::SlidingWindow { .. } => "sliding_window",
            Rule::DetectBot { .. } => "detect_bot",
        }
    }
}

/// Rule set guarding the demo and chat endpoints.
pub fn rate_limit_rules(window: Duration, max: u32, cooldown: Duration) -> Vec<Rule> {
    vec![Rule::SlidingWindow {
        mode: Mode::Live,
        window,
        max,
        cooldown,
    }]
}

/// Rule set used by the global bot middleware.
pub fn bot_rules(mode: Mode, block: Vec<BotCategory>) -> Vec<Rule> {
    vec![Rule::DetectBot { mode, block }]
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
