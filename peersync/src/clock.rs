//! Monotonic node clock and synchronization offset arithmetic

use std::time::Instant;

/// Millisecond clock counting from node start, backed by a monotonic
/// source. This is the "natural" clock; the synchronized clock is
/// derived from it by subtracting the negotiated offset.
#[derive(Debug, Clone, Copy)]
pub struct NaturalClock {
    start: Instant,
}

impl NaturalClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Builds a clock with an explicit start point (used by tests to
    /// fabricate elapsed time).
    #[allow(dead_code)]
    pub fn starting_at(start: Instant) -> Self {
        Self { start }
    }

    /// Milliseconds elapsed since node start.
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for NaturalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset from one four-timestamp exchange:
/// `((T2 - T1) + (T3 - T4)) / 2`, all in signed milliseconds.
pub fn compute_offset(t1: u64, t2: u64, t3: u64, t4: u64) -> i64 {
    ((t2 as i64 - t1 as i64) + (t3 as i64 - t4 as i64)) / 2
}

/// Applies the offset to a natural timestamp, clamping underflow to 0.
pub fn apply_offset(natural_ms: u64, offset_ms: i64) -> u64 {
    let adjusted = natural_ms as i64 - offset_ms;
    if adjusted < 0 {
        0
    } else {
        adjusted as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_offset_from_symmetric_exchange_is_zero() {
        // T1=1000 sent, T2=1005 received, T3=1006 request, T4=1011 response
        assert_eq!(compute_offset(1000, 1005, 1006, 1011), 0);
    }

    #[test]
    fn test_offset_signs() {
        // Follower clock 100ms ahead of upstream
        assert_eq!(compute_offset(1000, 1105, 1106, 1011), 100);
        // Follower clock 100ms behind
        assert_eq!(compute_offset(1000, 905, 906, 1011), -100);
    }

    #[test]
    fn test_apply_offset_clamps_underflow() {
        assert_eq!(apply_offset(50, 100), 0);
        assert_eq!(apply_offset(100, 100), 0);
        assert_eq!(apply_offset(150, 100), 50);
        assert_eq!(apply_offset(100, -50), 150);
    }

    #[test]
    fn test_natural_clock_counts_from_start() {
        let clock = NaturalClock::starting_at(Instant::now() - Duration::from_millis(250));
        let now = clock.now_ms();
        assert!(now >= 250);
        assert!(now < 5000);
    }
}
