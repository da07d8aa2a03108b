//! DOM-stability wait.
//!
//! Polls the serialized HTML length and returns once the page has stayed
//! within `html_delta_threshold` characters for `quiet_window_ms`. Gives up
//! after `max_wait_ms` and proceeds with whatever is rendered. Never fails.

use super::RenderContext;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Tuning for the stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityOptions {
    pub check_interval_ms: u64,
    pub html_delta_threshold: usize,
    pub quiet_window_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            check_interval_ms: 200,
            html_delta_threshold: 200,
            quiet_window_ms: 1_500,
            max_wait_ms: 15_000,
        }
    }
}

impl StabilityOptions {
    /// Hard ceiling on how long [`wait_for_stable_dom`] can block.
    /// Saturates rather than wrapping for very large settings.
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.saturating_add(self.check_interval_ms))
    }
}

/// How the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// The quiet window was reached.
    Stable { elapsed_ms: u64 },
    /// `max_wait_ms` elapsed first.
    TimedOut { elapsed_ms: u64 },
}

impl StabilityOutcome {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityOutcome::Stable { .. })
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            StabilityOutcome::Stable { elapsed_ms }
            | StabilityOutcome::TimedOut { elapsed_ms } => *elapsed_ms,
        }
    }
}

/// Wait until the DOM stops changing, or until the ceiling.
///
/// A failed length read counts as a change, which resets the quiet window.
/// The whole loop runs under a timeout of `max_wait_ms + check_interval_ms`
/// so a slow length read cannot stretch the wait.
pub async fn wait_for_stable_dom(
    ctx: &dyn RenderContext,
    options: &StabilityOptions,
) -> StabilityOutcome {
    let start = Instant::now();
    let elapsed_ms = |start: Instant| start.elapsed().as_millis() as u64;

    let poll = async {
        let interval = Duration::from_millis(options.check_interval_ms.max(1));
        let max_wait = Duration::from_millis(options.max_wait_ms);
        let quiet_target = Duration::from_millis(options.quiet_window_ms);

        let mut last_len = ctx.html_length().await.ok();
        let mut last_poll = Instant::now();
        let mut quiet = Duration::ZERO;

        loop {
            if start.elapsed() >= max_wait {
                return StabilityOutcome::TimedOut {
                    elapsed_ms: elapsed_ms(start),
                };
            }

            tokio::time::sleep(interval).await;
            let current = ctx.html_length().await.ok();
            let now = Instant::now();

            match (last_len, current) {
                (Some(prev), Some(cur)) if prev.abs_diff(cur) <= options.html_delta_threshold => {
                    quiet += now - last_poll;
                }
                _ => quiet = Duration::ZERO,
            }
            debug!("dom poll: len={current:?} quiet={}ms", quiet.as_millis());
            last_len = current;
            last_poll = now;

            if quiet >= quiet_target {
                return StabilityOutcome::Stable {
                    elapsed_ms: elapsed_ms(start),
                };
            }
        }
    };

    match tokio::time::timeout(options.ceiling(), poll).await {
        Ok(outcome) => outcome,
        Err(_) => StabilityOutcome::TimedOut {
            elapsed_ms: elapsed_ms(start),
        },
    }
}
