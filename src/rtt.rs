//! Smoothed round-trip-time estimator.
//!
//! Jacobson/Karels EWMA, same shape as RFC 6298: variance updates before the
//! mean does, using the pre-update smoothed value.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SRTT smoothing factor (α = 1/8).
const ALPHA_NUM: u32 = 1;
const ALPHA_DEN: u32 = 8;
/// Variance smoothing factor (β = 1/4).
const BETA_NUM: u32 = 1;
const BETA_DEN: u32 = 4;

/// Initial smoothed RTT before any sample has been recorded.
pub const DEFAULT_INITIAL_SRTT: Duration = Duration::from_millis(500);
/// Initial RTT variance before any sample has been recorded.
pub const DEFAULT_INITIAL_VARIANCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RttEstimate {
    pub smoothed_rtt: Duration,
    pub rtt_variance: Duration,
    pub sample_count: u64,
}

impl Default for RttEstimate {
    fn default() -> Self {
        Self {
            smoothed_rtt: DEFAULT_INITIAL_SRTT,
            rtt_variance: DEFAULT_INITIAL_VARIANCE,
            sample_count: 0,
        }
    }
}

impl RttEstimate {
    pub fn new(initial_srtt: Duration, initial_variance: Duration) -> Self {
        Self {
            smoothed_rtt: initial_srtt,
            rtt_variance: initial_variance,
            sample_count: 0,
        }
    }

    /// Fold a new sample into the estimate.
    ///
    /// Variance first (using the *pre-update* SRTT), then SRTT — reversing
    /// the order biases the variance toward zero on every sample.
    pub fn record_sample(&mut self, sample: Duration) {
        let diff = abs_diff(sample, self.smoothed_rtt);
        self.rtt_variance = scale(self.rtt_variance, BETA_DEN - BETA_NUM, BETA_DEN)
            + scale(diff, BETA_NUM, BETA_DEN);
        self.smoothed_rtt = scale(self.smoothed_rtt, ALPHA_DEN - ALPHA_NUM, ALPHA_DEN)
            + scale(sample, ALPHA_NUM, ALPHA_DEN);
        self.sample_count += 1;
    }

    /// `clamp(srtt + 4·var, min, max)`.
    pub fn suggested_timeout(&self, min: Duration, max: Duration) -> Duration {
        let raw = self.smoothed_rtt + self.rtt_variance * 4;
        raw.clamp(min, max)
    }

    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// `d * num / den` computed in nanoseconds to avoid truncating small
/// durations to zero before the multiply.
fn scale(d: Duration, num: u32, den: u32) -> Duration {
    let nanos = d.as_nanos() as u64;
    Duration::from_nanos(nanos.saturating_mul(num as u64) / den as u64)
}

/// Single-writer RTT tracker shared globally across all peers (as opposed to
/// the per-peer [`RttEstimate`] held on each `Peer`). If shared across
/// threads, guard reads and the subsequent write as one critical section so
/// a sample is never observed half-applied.
#[derive(Debug, Clone)]
pub struct RttTracker {
    estimate: RttEstimate,
}

impl RttTracker {
    pub fn new() -> Self {
        Self {
            estimate: RttEstimate::default(),
        }
    }

    pub fn with_initial(initial_srtt: Duration, initial_variance: Duration) -> Self {
        Self {
            estimate: RttEstimate::new(initial_srtt, initial_variance),
        }
    }

    pub fn record_sample(&mut self, sample: Duration) {
        self.estimate.record_sample(sample);
    }

    pub fn suggested_timeout(&self, min: Duration, max: Duration) -> Duration {
        self.estimate.suggested_timeout(min, max)
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.estimate.smoothed_rtt
    }

    pub fn sample_count(&self) -> u64 {
        self.estimate.sample_count
    }

    pub fn has_samples(&self) -> bool {
        self.estimate.has_samples()
    }

    pub fn estimate(&self) -> RttEstimate {
        self.estimate
    }
}

impl Default for RttTracker {
    fn default() -> Self {
        Self::new()
    }
}
