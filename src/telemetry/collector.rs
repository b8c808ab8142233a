use std::time::Duration;

use super::producer::SourceFrame;
use super::{LapsRemaining, Snapshot};

/// Assemble one [`Snapshot`] from a frozen source frame.
///
/// Missing and not-yet-populated fields degrade to unset rather than error:
/// a zero or negative lap time means the driver has no valid lap yet, and a
/// laps-remaining count at the sim's sentinel becomes the unlimited marker.
pub fn collect(frame: &SourceFrame) -> Snapshot {
    Snapshot {
        position: frame.position.filter(|p| *p > 0),
        field_size: frame.cars_in_field.filter(|n| *n > 0),
        laps_completed: frame.laps_completed.filter(|laps| *laps >= 0),
        laps_remaining: frame
            .laps_remaining_raw
            .map(LapsRemaining::from_raw)
            .unwrap_or_default(),
        last_lap_time: lap_time(frame.last_lap_time_s),
        best_lap_time: lap_time(frame.best_lap_time_s),
        fuel_remaining: frame.fuel_level_l.filter(|l| *l >= 0.),
        time_remaining: frame
            .session_time_remain_s
            .filter(|s| s.is_finite() && *s >= 0.)
            .map(Duration::from_secs_f64),
        flags: frame.session_flags,
        track_temperature: frame.track_temp_c,
    }
}

fn lap_time(seconds: Option<f32>) -> Option<Duration> {
    seconds
        .filter(|s| s.is_finite() && *s > 0.)
        .map(Duration::from_secs_f32)
}
