use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub reference_time: DateTime<Utc>,
    pub temperature_f: f64,
}

/// Forecast samples further than this from the wanted time are not used.
pub fn default_forecast_window() -> Duration {
    Duration::hours(2)
}

/// Point closest to `target`; on a tie the earlier entry in `points` wins.
pub fn nearest_forecast(
    points: &[ForecastPoint],
    target: DateTime<Utc>,
    window: Duration,
) -> Option<&ForecastPoint> {
    let mut best: Option<(&ForecastPoint, Duration)> = None;
    for point in points {
        let distance = (point.reference_time - target).abs();
        if distance >= window {
            continue;
        }
        if best.map(|(_, current)| distance < current).unwrap_or(true) {
            best = Some((point, distance));
        }
    }
    best.map(|(point, _)| point)
}
