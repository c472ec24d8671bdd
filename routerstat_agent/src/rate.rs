//! Per-second rates from monotonically increasing counters.

use std::collections::HashMap;

/// Last reading of one counter stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateState {
    pub value: u64,
    /// Monotonic seconds.
    pub at: f64,
}

/// Keeps one baseline per stream id (e.g. "eth0-tx").
///
/// `update` returns `None` when no rate can be given: first sample of a
/// stream, no time elapsed, or the counter went backwards (interface restart
/// or wrap). In each case the new reading becomes the baseline.
#[derive(Debug, Default)]
pub struct RateSampler {
    streams: HashMap<String, RateState>,
}

impl RateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, stream: &str, value: u64, at: f64) -> Option<f64> {
        let next = RateState { value, at };
        let Some(prev) = self.streams.get_mut(stream) else {
            self.streams.insert(stream.to_string(), next);
            return None;
        };
        let rate = rate_between(*prev, next);
        *prev = next;
        rate
    }

    pub fn last(&self, stream: &str) -> Option<RateState> {
        self.streams.get(stream).copied()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

// Subtract in u64 before converting so large counters keep their precision.
fn rate_between(prev: RateState, next: RateState) -> Option<f64> {
    let dt = next.at - prev.at;
    if dt.is_nan() || dt <= 0.0 {
        return None;
    }
    let delta = next.value.checked_sub(prev.value)?;
    Some(delta as f64 / dt)
}
