//! Sliding-window request throttle, one per client.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use cambio_types::RateLimitPolicy;

use crate::log::{info, warn};

/// Outcome of one admission check.
enum Admission {
    Admitted,
    Refused { wait: Duration },
}

/// Counts request attempts over trailing minute/hour/day windows.
///
/// The window is a list of attempt instants, pruned on every call, so the
/// limiter needs no timer of its own. Refused attempts are not recorded.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter enforcing `policy`.
    #[must_use]
    pub const fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Policy this limiter enforces.
    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn lock_window(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.window.lock().unwrap_or_else(|poisoned| {
            warn!("rate limiter window mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record an attempt if every enabled ceiling still has room.
    ///
    /// Returns `false` without recording when any ceiling is already met.
    pub fn acquire(&self) -> bool {
        matches!(self.admit(Instant::now()), Admission::Admitted)
    }

    /// Suspend until an attempt is admitted and recorded.
    ///
    /// Returns the total time spent waiting (zero when admitted immediately).
    pub async fn wait_if_needed(&self) -> Duration {
        self.wait(None).await.unwrap_or(Duration::ZERO)
    }

    /// Like [`RateLimiter::wait_if_needed`], but give up once admission would
    /// land at or after `deadline`.
    ///
    /// Returns `None` without sleeping or recording anything when the next free
    /// slot is past the deadline.
    pub async fn wait_until(&self, deadline: Instant) -> Option<Duration> {
        self.wait(Some(deadline)).await
    }

    async fn wait(&self, deadline: Option<Instant>) -> Option<Duration> {
        let began = Instant::now();
        let mut waited = false;
        loop {
            let now = Instant::now();
            let wait = match self.admit(now) {
                Admission::Admitted => break,
                Admission::Refused { wait } => wait,
            };
            if let Some(deadline) = deadline
                && now.checked_add(wait).is_none_or(|free| free >= deadline)
            {
                info!(
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "rate limit wait would cross the deadline"
                );
                return None;
            }
            info!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate limit reached, waiting"
            );
            waited = true;
            tokio::time::sleep(wait).await;
        }
        Some(if waited {
            began.elapsed()
        } else {
            Duration::ZERO
        })
    }

    /// Attempts currently counted toward the longest enabled window.
    #[must_use]
    pub fn in_flight_window(&self) -> usize {
        let now = Instant::now();
        let mut window = self.lock_window();
        self.prune(&mut window, now);
        window.len()
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        let Some(longest) = self.policy.windows().iter().map(|(_, span)| *span).max() else {
            window.clear();
            return;
        };
        while window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= longest)
        {
            window.pop_front();
        }
    }

    fn admit(&self, now: Instant) -> Admission {
        let windows = self.policy.windows();
        if windows.is_empty() {
            return Admission::Admitted;
        }

        let mut window = self.lock_window();
        self.prune(&mut window, now);

        let mut wait: Option<Duration> = None;
        for (limit, span) in windows {
            let limit = limit as usize;
            // Entries are ascending, so the aged-out ones form a prefix.
            let start = window.partition_point(|t| now.saturating_duration_since(*t) >= span);
            let in_window = window.len() - start;
            if in_window >= limit {
                let blocking = window[start + in_window - limit];
                let until_free = span.saturating_sub(now.saturating_duration_since(blocking));
                wait = Some(wait.map_or(until_free, |w| w.max(until_free)));
            }
        }

        match wait {
            Some(wait) => Admission::Refused { wait },
            None => {
                window.push_back(now);
                Admission::Admitted
            }
        }
    }
}
