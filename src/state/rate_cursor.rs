use std::time::{Duration, Instant};

/// Tracks pacing for one rate-limit domain
///
/// The minimum delay is measured from the *end* of the previous call, so a
/// slow response never eats into the pause before the next request.
#[derive(Debug, Clone)]
pub struct RateCursor {
    /// Minimum time between the end of one call and the start of the next
    min_delay: Duration,

    /// When the previous call finished
    last_call_end: Option<Instant>,

    /// Number of requests issued through this cursor
    request_count: u32,
}

impl RateCursor {
    /// Creates a cursor with no previous call
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call_end: None,
            request_count: 0,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_call_end?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.min_delay {
            Some(self.min_delay - elapsed)
        } else {
            None
        }
    }

    /// Records that a request is being issued
    pub fn record_request(&mut self) {
        self.request_count += 1;
    }

    /// Records that a call (successful or not) has just finished
    ///
    /// Also used after a retry backoff so the baseline delay starts over.
    pub fn record_completion(&mut self, now: Instant) {
        self.last_call_end = Some(now);
    }
}
