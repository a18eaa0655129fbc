//! Reconnect backoff policy
//!
//! Exponential backoff with jitter. The deterministic term doubles per attempt
//! and is capped; the jitter term adds up to half of the capped delay on top,
//! so the total can slightly exceed the cap. Jitter keeps a fleet of clients
//! from retrying in lockstep after a server restart.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Backoff parameters; `delay_for` is a pure function of the attempt count
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic delay before jitter: `min(base * 2^(attempt-1), max)`.
    ///
    /// `attempt` is 1-based; attempt 0 is treated as 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Per-session reconnect state: attempt counter and the terminal flag.
///
/// `should_reconnect` goes false when the client is explicitly stopped or the
/// attempt budget is exhausted, and stays false until the next `reset()`.
#[derive(Debug)]
pub struct ReconnectContext {
    attempts: u32,
    should_reconnect: bool,
    rng_state: u64,
}

impl ReconnectContext {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e3779b97f4a7c15);
        Self {
            attempts: 0,
            should_reconnect: true,
            rng_state: seed | 1,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Reset the counter after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.should_reconnect = true;
    }

    /// Disable further reconnects; terminal until `reset()`
    pub fn disable(&mut self) {
        self.should_reconnect = false;
    }

    /// Consume one attempt and return the jittered delay before the next
    /// connection attempt, or `None` when the budget is exhausted (which also
    /// disables further attempts).
    pub fn next_delay(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        if !self.should_reconnect {
            return None;
        }
        if self.attempts >= policy.max_attempts {
            self.should_reconnect = false;
            return None;
        }

        self.attempts += 1;
        let delay = policy.delay_for(self.attempts);
        let jitter = delay.mul_f64(0.5 * self.next_random());
        Some(delay + jitter)
    }

    /// Fast PRNG for jitter (xorshift64)
    #[inline]
    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f64) / (u64::MAX as f64)
    }
}

impl Default for ReconnectContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let expected_secs = [1, 2, 4, 8, 16, 30, 30, 30, 30, 30];
        for (i, &secs) in expected_secs.iter().enumerate() {
            let attempt = (i + 1) as u32;
            assert_eq!(
                policy.delay_for(attempt),
                Duration::from_secs(secs),
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_delay_for_attempt_zero() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = ReconnectPolicy::default();
        for _ in 0..100 {
            let mut ctx = ReconnectContext::new();
            while let Some(total) = ctx.next_delay(&policy) {
                let base = policy.delay_for(ctx.attempts());
                assert!(total >= base, "{:?} < {:?}", total, base);
                assert!(
                    total <= base.mul_f64(1.5),
                    "{:?} > 1.5 * {:?}",
                    total,
                    base
                );
            }
        }
    }

    #[test]
    fn test_budget_exhaustion() {
        let policy = ReconnectPolicy::default();
        let mut ctx = ReconnectContext::new();
        for _ in 0..10 {
            assert!(ctx.next_delay(&policy).is_some());
        }
        assert_eq!(ctx.attempts(), 10);
        assert!(ctx.next_delay(&policy).is_none());
        assert!(!ctx.should_reconnect());
        // Terminal: still none on further calls
        assert!(ctx.next_delay(&policy).is_none());
    }

    #[test]
    fn test_reset_restores_budget() {
        let policy = ReconnectPolicy::default();
        let mut ctx = ReconnectContext::new();
        while ctx.next_delay(&policy).is_some() {}
        ctx.reset();
        assert_eq!(ctx.attempts(), 0);
        assert!(ctx.next_delay(&policy).is_some());
    }

    #[test]
    fn test_disable_is_terminal() {
        let policy = ReconnectPolicy::default();
        let mut ctx = ReconnectContext::new();
        ctx.disable();
        assert!(ctx.next_delay(&policy).is_none());
    }
}
