use rand::Rng;
use tokio::time::Duration;
use tokio::time::Instant;

/// Single-shot randomized election deadline.
///
/// Only mutated while the peer's state lock is held, so "deadline passed" and
/// "heartbeat just arrived" can never interleave.
#[derive(Clone, Debug)]
pub struct ElectionTimer {
    next_deadline: Instant,
    timeout_range: (u64, u64),
}

impl ElectionTimer {
    /// @param: timeout_range: (election_timeout_min, election_timeout_max) in ms
    pub fn new(timeout_range: (u64, u64)) -> Self {
        let (min, max) = timeout_range;
        Self {
            next_deadline: Instant::now() + Self::random_duration(min, max),
            timeout_range,
        }
    }

    /// Re-arms the timer with a fresh random timeout.
    pub fn reset(&mut self) {
        let (min, max) = self.timeout_range;
        self.next_deadline = Instant::now() + Self::random_duration(min, max);
    }

    pub fn random_duration(
        min: u64,
        max: u64,
    ) -> Duration {
        if min >= max {
            return Duration::from_millis(min);
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min..max))
    }

    pub fn remaining(&self) -> Duration {
        self.next_deadline.saturating_duration_since(Instant::now())
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn is_expired(&self) -> bool {
        self.next_deadline <= Instant::now()
    }
}
