use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay_ms: i64,
    pub multiplier: f64,
    pub max_delay_ms: i64,
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 3_600_000,
            jitter_pct: 0.10,
        }
    }
}

impl RetryConfig {
    pub fn from_env(cfg: &crate::config::RetryEnvConfig) -> Self {
        Self {
            base_delay_ms: cfg.backoff_delay_ms,
            multiplier: cfg.backoff_multiplier,
            max_delay_ms: 3_600_000,
            jitter_pct: 0.10,
        }
    }
}

/// Computes the delay before the next attempt, following
/// `min(base * multiplier^attempt_no, max) * jitter[0.9, 1.1]`.
pub fn next_delay_ms(attempt_no: i32, cfg: &RetryConfig, rng: &mut impl Rng) -> i64 {
    let attempt_no = attempt_no.max(1) as i32;
    let exp = (attempt_no - 1) as i32;

    let growth = cfg.multiplier.powi(exp);
    let raw = cfg.base_delay_ms as f64 * growth;
    let capped = raw.min(cfg.max_delay_ms as f64);

    let jitter_low = 1.0 - cfg.jitter_pct;
    let jitter_high = 1.0 + cfg.jitter_pct;
    let factor = rng.gen_range(jitter_low..=jitter_high);

    let jittered = (capped * factor).round() as i64;
    jittered.clamp(0, cfg.max_delay_ms)
}

/// Whether a job should be retried again, given how many attempts it has
/// already made and the classified error from the most recent one.
pub fn should_retry(attempts_made: i32, max_attempts: i32, retryable: bool) -> bool {
    retryable && attempts_made < max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn delay_grows_geometrically_and_respects_cap() {
        let cfg = RetryConfig {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter_pct: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(next_delay_ms(1, &cfg, &mut rng), 1_000);
        assert_eq!(next_delay_ms(2, &cfg, &mut rng), 2_000);
        assert_eq!(next_delay_ms(3, &cfg, &mut rng), 4_000);
        assert_eq!(next_delay_ms(10, &cfg, &mut rng), 10_000);
    }

    #[test]
    fn jitter_stays_within_configured_band() {
        let cfg = RetryConfig {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 3_600_000,
            jitter_pct: 0.10,
        };
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=5 {
            let delay = next_delay_ms(attempt, &cfg, &mut rng);
            let base = cfg.base_delay_ms as f64 * cfg.multiplier.powi(attempt - 1);
            assert!((delay as f64) >= base * 0.9 - 1.0);
            assert!((delay as f64) <= base * 1.1 + 1.0);
        }
    }

    #[test]
    fn should_retry_respects_attempt_budget_and_retryability() {
        assert!(should_retry(1, 5, true));
        assert!(!should_retry(5, 5, true));
        assert!(!should_retry(1, 5, false));
    }
}
