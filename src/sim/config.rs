use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sim::Time;

/// Scheduler configuration.
///
/// All options default to "off": no end time, no step cap, no frame pacing,
/// and a 150 ms cooperative-yield interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    end_time: Option<Time>,
    max_time_step: Option<Time>,
    frame_delay: Duration,
    yield_every: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            end_time: None,
            max_time_step: None,
            frame_delay: Duration::ZERO,
            yield_every: Duration::from_millis(150),
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time at which the run terminates. Without an end time the run
    /// lasts until the FEC holds no more timed waits.
    pub fn with_end_time(self, end_time: Time) -> Self {
        Self {
            end_time: Some(end_time),
            ..self
        }
    }

    /// Caps how far the clock may jump in a single advance. A pacing aid for
    /// animation hosts; zero disables the cap.
    pub fn with_max_time_step(self, step: Time) -> Self {
        Self {
            max_time_step: (step > 0.0).then_some(step),
            ..self
        }
    }

    /// Real-time pause after each clock advance. Zero disables pacing.
    pub fn with_frame_delay(self, delay: Duration) -> Self {
        Self {
            frame_delay: delay,
            ..self
        }
    }

    /// How much wall-clock work the scheduler performs before yielding to the
    /// host runtime.
    pub fn with_yield_every(self, interval: Duration) -> Self {
        Self {
            yield_every: interval,
            ..self
        }
    }

    pub fn end_time(&self) -> Option<Time> {
        self.end_time
    }

    pub fn max_time_step(&self) -> Option<Time> {
        self.max_time_step
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    pub fn yield_every(&self) -> Duration {
        self.yield_every
    }
}
