use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FAN_CURVE_TERMS: usize = 6;

/// Cubic fit of (sensor delta, runtime) samples (1,5) (2,15) (5,25) (6,30) (7,40) (8,55).
pub const DEFAULT_FAN_FACTORS: [f64; 4] = [0.43651, -5.99206, 29.9206, -19.3651];

#[derive(Debug, Error, PartialEq)]
pub enum FanCurveError {
    #[error("fan curve takes at most 6 coefficients, got {0}")]
    TooManyCoefficients(usize),
    #[error("fan curve coefficient {0} is not finite")]
    NotFinite(usize),
}

/// A sensor-delta threshold and the runtime that applies beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FanBand {
    pub delta_f: f64,
    pub minutes: u32,
}

/// Degree-5 polynomial, highest degree first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanCurve([f64; FAN_CURVE_TERMS]);

impl FanCurve {
    /// Left-pads lower-degree fits with zeros, so `[a, b, c, d]` is the cubic
    /// `a*x^3 + b*x^2 + c*x + d`.
    pub fn from_factors(factors: &[f64]) -> Result<Self, FanCurveError> {
        if factors.len() > FAN_CURVE_TERMS {
            return Err(FanCurveError::TooManyCoefficients(factors.len()));
        }
        if let Some(index) = factors.iter().position(|value| !value.is_finite()) {
            return Err(FanCurveError::NotFinite(index));
        }

        let mut coefficients = [0.0; FAN_CURVE_TERMS];
        coefficients[FAN_CURVE_TERMS - factors.len()..].copy_from_slice(factors);
        Ok(Self(coefficients))
    }

    pub fn coefficients(&self) -> &[f64; FAN_CURVE_TERMS] {
        &self.0
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.0.iter().fold(0.0, |acc, coefficient| acc * x + coefficient)
    }
}

impl Default for FanCurve {
    fn default() -> Self {
        let mut coefficients = [0.0; FAN_CURVE_TERMS];
        coefficients[FAN_CURVE_TERMS - DEFAULT_FAN_FACTORS.len()..]
            .copy_from_slice(&DEFAULT_FAN_FACTORS);
        Self(coefficients)
    }
}

/// Spread between the warmest and coldest sensor. Zero with fewer than two readings.
pub fn sensor_delta(sensor_temps: &BTreeMap<String, f64>) -> f64 {
    let mut values = sensor_temps.values().copied();
    let Some(first) = values.next() else {
        return 0.0;
    };
    let (min, max) = values.fold((first, first), |(min, max), value| {
        (min.min(value), max.max(value))
    });
    max - min
}

/// Evaluated curve before rounding, or `None` when a band short-circuits it.
pub fn raw_fan_runtime(
    delta: f64,
    curve: &FanCurve,
    min_band: FanBand,
    max_band: FanBand,
) -> Option<f64> {
    if delta >= max_band.delta_f || delta <= min_band.delta_f {
        None
    } else {
        Some(curve.evaluate(delta))
    }
}

pub fn fan_runtime_minutes(
    sensor_temps: &BTreeMap<String, f64>,
    curve: &FanCurve,
    min_band: FanBand,
    max_band: FanBand,
) -> u32 {
    let delta = sensor_delta(sensor_temps);
    if delta >= max_band.delta_f {
        return max_band.minutes;
    }
    if delta <= min_band.delta_f {
        return min_band.minutes;
    }

    let runtime = curve.evaluate(delta);
    let rounded = (runtime / 5.0).round_ties_even() * 5.0;
    let floor = f64::from(min_band.minutes);
    let ceiling = f64::from(max_band.minutes);
    rounded.clamp(floor, ceiling) as u32
}

/// `None` when the device already runs the fan for the wanted time.
pub fn fan_mode_decision(
    occupied: bool,
    occupied_minutes: u32,
    away_minutes: u32,
    current_minutes: u32,
) -> Option<u32> {
    let wanted = if occupied {
        occupied_minutes
    } else {
        away_minutes
    };
    (wanted != current_minutes).then_some(wanted)
}
