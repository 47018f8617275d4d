//! Time management utilities
//!
//! [`FrameClock`] is the deterministic clock the render pipeline uses for
//! render-target LRU timestamps. It only moves when the embedding layer
//! reports a frame tick.

/// Accumulated simulation time driven by per-frame deltas
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    elapsed: f64,
    frame_count: u64,
}

impl FrameClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `delta_time` seconds
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, delta_time: f32) {
        if delta_time.is_finite() && delta_time > 0.0 {
            self.elapsed += f64::from(delta_time);
        }
    }

    /// Count one rendered frame
    pub fn tick_frame(&mut self) {
        self.frame_count += 1;
    }

    /// Seconds accumulated since creation
    pub const fn now(&self) -> f64 {
        self.elapsed
    }

    /// Number of frames rendered
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_ignores_invalid_deltas() {
        let mut clock = FrameClock::new();
        clock.advance(0.5);
        clock.advance(-1.0);
        clock.advance(f32::NAN);
        clock.advance(0.25);
        assert!((clock.now() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_frame_clock_counts_frames() {
        let mut clock = FrameClock::new();
        clock.tick_frame();
        clock.tick_frame();
        assert_eq!(clock.frame_count(), 2);
    }
}
