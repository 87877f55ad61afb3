//! Physical units with type safety.
//!
//! These newtypes keep sample intervals, bit times and frequencies from
//! being mixed up when they cross the AMI boundary as bare `f64`s.

use serde::{Deserialize, Serialize};
use std::ops::{Div, Mul};

/// Time duration in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_ps(ps: f64) -> Self {
        Self(ps * 1e-12)
    }

    #[inline]
    pub fn as_ps(&self) -> f64 {
        self.0 * 1e12
    }

    /// Convert to frequency (reciprocal).
    #[inline]
    pub fn to_frequency(&self) -> Hertz {
        Hertz(1.0 / self.0)
    }

    /// True for a finite, strictly positive duration.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

impl Mul<f64> for Seconds {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<f64> for Seconds {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        Self(self.0 / rhs)
    }
}

impl Div<Seconds> for Seconds {
    type Output = f64;
    fn div(self, rhs: Seconds) -> f64 {
        self.0 / rhs.0
    }
}

/// Frequency in Hertz.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Hertz(pub f64);

impl Hertz {
    #[inline]
    pub fn from_ghz(ghz: f64) -> Self {
        Self(ghz * 1e9)
    }

    #[inline]
    pub fn as_ghz(&self) -> f64 {
        self.0 * 1e-9
    }

    /// Convert to period (reciprocal).
    #[inline]
    pub fn to_period(&self) -> Seconds {
        Seconds(1.0 / self.0)
    }

    /// Angular frequency (omega = 2 * pi * f).
    #[inline]
    pub fn angular(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.0
    }
}

/// Data rate in bits per second.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct BitsPerSecond(pub f64);

impl BitsPerSecond {
    #[inline]
    pub fn from_gbps(gbps: f64) -> Self {
        Self(gbps * 1e9)
    }

    /// Unit interval (bit period).
    #[inline]
    pub fn ui(&self) -> Seconds {
        Seconds(1.0 / self.0)
    }

    /// Fundamental frequency (half the data rate for NRZ).
    #[inline]
    pub fn nyquist(&self) -> Hertz {
        Hertz(self.0 / 2.0)
    }
}

/// Resolve how many samples make up one unit interval.
///
/// Returns `None` unless `bit_time` is a positive integer multiple of
/// `sample_interval` within `tolerance` (expressed as a fraction of one
/// sample).
pub fn samples_per_ui(bit_time: Seconds, sample_interval: Seconds, tolerance: f64) -> Option<usize> {
    if !bit_time.is_positive() || !sample_interval.is_positive() {
        return None;
    }
    let ratio = bit_time / sample_interval;
    let rounded = ratio.round();
    if rounded < 1.0 || (ratio - rounded).abs() > tolerance {
        return None;
    }
    Some(rounded as usize)
}
