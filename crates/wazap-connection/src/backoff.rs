use std::time::{Duration, Instant};

/// Rolling-window exponential backoff (spec §4.G): up to `max_attempts`
/// reconnect tries within `rolling_window`, delay doubling from `base` each
/// attempt; once the window's attempt budget is exhausted, wait out the
/// remainder of the window and start a fresh one.
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    rolling_window: Duration,
    attempts: u32,
    window_start: Option<Instant>,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32, rolling_window: Duration) -> Self {
        Self {
            base,
            max_attempts,
            rolling_window,
            attempts: 0,
            window_start: None,
        }
    }

    /// Called on a successful `connection: open` — clears the attempt
    /// history so a later disconnect starts counting from zero again.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.window_start = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Computes the delay before the next reconnect attempt, advancing
    /// internal bookkeeping as a side effect.
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        match self.window_start {
            None => self.window_start = Some(now),
            Some(start) if now.duration_since(start) > self.rolling_window => {
                self.window_start = Some(now);
                self.attempts = 0;
            }
            Some(_) => {}
        }

        self.attempts += 1;

        if self.attempts > self.max_attempts {
            let start = self.window_start.expect("window_start set above");
            let elapsed = now.duration_since(start);
            let remaining = self.rolling_window.saturating_sub(elapsed);
            self.window_start = None;
            self.attempts = 0;
            remaining.max(self.base)
        } else {
            self.base * 2u32.pow(self.attempts - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_max_attempts() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3), 5, Duration::from_secs(600));
        let t0 = Instant::now();
        assert_eq!(policy.next_delay(t0), Duration::from_secs(3));
        assert_eq!(policy.next_delay(t0), Duration::from_secs(6));
        assert_eq!(policy.next_delay(t0), Duration::from_secs(12));
        assert_eq!(policy.next_delay(t0), Duration::from_secs(24));
        assert_eq!(policy.next_delay(t0), Duration::from_secs(48));
    }

    #[test]
    fn exhausting_the_budget_waits_out_the_window_then_resets() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3), 2, Duration::from_secs(60));
        let t0 = Instant::now();
        policy.next_delay(t0);
        policy.next_delay(t0);
        let sixth = policy.next_delay(t0 + Duration::from_secs(10));
        assert_eq!(sixth, Duration::from_secs(50));
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn reset_clears_attempt_history() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3), 5, Duration::from_secs(600));
        policy.next_delay(Instant::now());
        policy.reset();
        assert_eq!(policy.attempts(), 0);
    }
}
