use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::bot::classify_user_agent;
use super::decision::{Decision, Reason};
use super::rules::{Mode, Rule};
use super::{Gate, GateResult, RequestDetails};

/// In-process gate.
///
/// Sliding window state is kept per (rule, client) pair. Bot rules classify
/// the client from its user agent. Rules are evaluated in order and the first
/// live denial wins; dry run denials are only logged.
#[derive(Debug)]
pub struct LocalGate {
    rules: Vec<Rule>,
    windows: DashMap<(usize, String), WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    hits: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_idle(&mut self, now: Instant, window: Duration) -> bool {
        self.prune(now, window);
        let blocked = self.blocked_until.is_some_and(|until| until > now);
        !blocked && self.hits.is_empty()
    }
}

impl LocalGate {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            windows: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of (rule, client) pairs currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    fn evaluate(&self, details: &RequestDetails, now: Instant) -> Decision {
        let mut last_reason = Reason::None;

        for (index, rule) in self.rules.iter().enumerate() {
            let (denied, reason) = match rule {
                Rule::SlidingWindow {
                    window,
                    max,
                    cooldown,
                    ..
                } => self.check_window(index, details.client_key(), *window, *max, *cooldown, now),
                Rule::DetectBot { block, .. } => {
                    let category = classify_user_agent(details.user_agent.as_deref());
                    let denied = block.contains(&category);
                    (denied, Reason::Bot { category, denied })
                }
            };

            if denied {
                match rule.mode() {
                    Mode::Live => return Decision::deny(reason),
                    Mode::DryRun => info!(
                        rule = rule.kind(),
                        client = details.client_key(),
                        "Dry run rule would deny request: {}",
                        reason
                    ),
                }
            }
            last_reason = reason;
        }

        Decision::allow(last_reason)
    }

    fn check_window(
        &self,
        index: usize,
        client: &str,
        window: Duration,
        max: u32,
        cooldown: Duration,
        now: Instant,
    ) -> (bool, Reason) {
        let mut entry = self
            .windows
            .entry((index, client.to_string()))
            .or_default();
        let state = entry.value_mut();

        if let Some(until) = state.blocked_until {
            if until > now {
                return (
                    true,
                    Reason::RateLimit {
                        max,
                        remaining: 0,
                        window,
                        reset: until.saturating_duration_since(now),
                    },
                );
            }
            state.blocked_until = None;
        }

        state.prune(now, window);

        let count = u32::try_from(state.hits.len()).unwrap_or(u32::MAX);
        if count < max {
            state.hits.push_back(now);
            let oldest = state.hits.front().copied().unwrap_or(now);
            return (
                false,
                Reason::RateLimit {
                    max,
                    remaining: max - count - 1,
                    window,
                    reset: window.saturating_sub(now.saturating_duration_since(oldest)),
                },
            );
        }

        let reset = if cooldown.is_zero() {
            let oldest = state.hits.front().copied().unwrap_or(now);
            window.saturating_sub(now.saturating_duration_since(oldest))
        } else {
            state.blocked_until = Some(now + cooldown);
            cooldown
        };
        debug!(client, max, ?reset, "Sliding window limit exceeded");

        (
            true,
            Reason::RateLimit {
                max,
                remaining: 0,
                window,
                reset,
            },
        )
    }

    /// Drop state for clients with no hits in their window and no active
    /// block. Returns how many entries were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|(index, _), state| match self.rules.get(*index) {
            Some(Rule::SlidingWindow { window, .. }) => !state.is_idle(now, *window),
            _ => false,
        });
        before.saturating_sub(self.windows.len())
    }

    /// Periodically evict idle clients until the gate is dropped.
    pub fn spawn_eviction(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let gate: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(gate) = gate.upgrade() else {
                    break;
                };
                let evicted = gate.evict_idle();
                if evicted > 0 {
                    debug!(
                        evicted,
                        remaining = gate.tracked_clients(),
                        "Evicted idle rate limit entries"
                    );
                }
            }
        })
    }
}

#[async_trait]
impl Gate for LocalGate {
    async fn protect(&self, details: &RequestDetails) -> GateResult<Decision> {
        Ok(self.evaluate(details, Instant::now()))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
