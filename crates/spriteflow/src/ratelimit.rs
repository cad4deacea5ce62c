use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

/// Single process-wide token bucket gating outbound calls to the remote
/// rendering API. Unlike a per-user limiter, there is exactly one bucket:
/// every [`RemoteClient`](crate::remote_client::RemoteClient) call consults
/// the same budget before it goes out over the wire.
pub struct RateLimiter {
    capacity: f64,
    rate_per_minute: f64,
    enabled: bool,
    state: Mutex<State>,
    notify: Notify,
}

struct State {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Availability {
    Tokens(i64),
    Unbounded,
}

impl RateLimiter {
    pub fn new(requests_per_minute: i64, enabled: bool) -> Arc<Self> {
        let capacity = requests_per_minute.max(0) as f64;
        Arc::new(Self {
            capacity,
            rate_per_minute: capacity,
            enabled,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            notify: Notify::new(),
        })
    }

    /// Completes immediately when disabled. Otherwise waits, in FIFO
    /// order (`tokio::sync::Mutex` grants the lock to waiters in the
    /// order they queued), until one token is available, then consumes
    /// it.
    pub async fn acquire(&self) {
        if !self.enabled || self.capacity <= 0.0 {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                self.seconds_until_next_token(&state)
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Current integer token count, or [`Availability::Unbounded`] when
    /// the limiter is disabled.
    pub async fn available(&self) -> Availability {
        if !self.enabled {
            return Availability::Unbounded;
        }
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        Availability::Tokens(state.tokens.floor() as i64)
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let refilled = elapsed * (self.rate_per_minute / 60.0);
        if refilled <= 0.0 {
            return;
        }
        state.tokens = (state.tokens + refilled).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            self.notify.notify_waiters();
        }
    }

    fn seconds_until_next_token(&self, state: &State) -> Duration {
        if self.rate_per_minute <= 0.0 {
            return Duration::from_secs(1);
        }
        let deficit = (1.0 - state.tokens).max(0.0);
        Duration::from_secs_f64((deficit / (self.rate_per_minute / 60.0)).max(0.01))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_is_immediate_while_tokens_remain() {
        let limiter = RateLimiter::new(60, true);
        tokio::time::timeout(Duration::from_millis(50), limiter.acquire())
            .await
            .expect("acquire should not block with tokens available");
    }

    #[tokio::test]
    async fn acquire_blocks_once_the_bucket_is_drained() {
        let limiter = RateLimiter::new(60, true);
        limiter.acquire().await;
        let remaining = match limiter.available().await {
            Availability::Tokens(n) => n,
            Availability::Unbounded => panic!("expected bounded availability"),
        };
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn disabled_limiter_never_blocks_and_reports_unbounded() {
        let limiter = RateLimiter::new(1, false);
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.available().await, Availability::Unbounded);
    }

    #[tokio::test]
    async fn available_reflects_full_capacity_when_idle() {
        let limiter = RateLimiter::new(120, true);
        assert_eq!(limiter.available().await, Availability::Tokens(120));
    }
}
