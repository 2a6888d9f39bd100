use std::time::Instant;

/// How effect clocks advance.
///
/// Each mounted effect owns its own clock so elapsed time is always measured
/// from that effect's mount, not from process start.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ClockPolicy {
    /// Follow the monotonic wall clock.
    #[default]
    Animate,
    /// Report the same timestamp every frame (useful for stills and tests).
    Frozen {
        /// Timestamp handed to every frame, in seconds.
        time: f32,
    },
}

impl ClockPolicy {
    pub fn time_source(&self) -> BoxedTimeSource {
        match *self {
            ClockPolicy::Animate => Box::new(SystemTimeSource::new()),
            ClockPolicy::Frozen { time } => Box::new(FixedTimeSource::new(time)),
        }
    }
}

/// Snapshot of the clock handed to an effect's `tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds since the effect mounted (or the frozen timestamp).
    pub seconds: f32,
    /// Frames ticked since mount.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Restarts the clock at zero.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let elapsed = self.origin.elapsed();
        let sample = TimeSample::new(elapsed.as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_clock_repeats_its_timestamp() {
        let mut source = ClockPolicy::Frozen { time: 2.5 }.time_source();
        let first = source.sample();
        let second = source.sample();
        assert_eq!(first.seconds, 2.5);
        assert_eq!(second.seconds, 2.5);
        assert_eq!(second.frame_index, 1);
        source.reset();
        assert_eq!(source.sample().frame_index, 0);
    }

    #[test]
    fn system_clock_is_monotonic_and_resets() {
        let mut source = SystemTimeSource::new();
        let first = source.sample();
        let second = source.sample();
        assert!(second.seconds >= first.seconds);
        source.reset();
        let after = source.sample();
        assert_eq!(after.frame_index, 0);
    }
}
