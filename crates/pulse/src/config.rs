//! Frame clock configuration.

use crate::error::{Error, Result};
use std::time::Duration;

/// Configuration for the tokio frame clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameClockConfig {
    /// Time between two frame batches.
    pub frame_interval: Duration,
}

impl Default for FrameClockConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
        }
    }
}

impl FrameClockConfig {
    /// Create a config ticking every `frame_interval`.
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }

    /// Set the frame interval.
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    /// Set the frame interval from a refresh rate in hertz.
    ///
    /// A rate of zero yields a zero interval, which [`validate`](Self::validate) rejects.
    pub fn with_refresh_rate(mut self, hz: u32) -> Self {
        self.frame_interval = if hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / hz
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_interval.is_zero() {
            return Err(Error::ZeroFrameInterval);
        }
        Ok(())
    }
}
