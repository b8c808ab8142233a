pub mod collector;
pub mod producer;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw laps-remaining values at or above this are the sim's own convention
/// for "session has no lap limit".
pub const UNLIMITED_LAPS_THRESHOLD: i32 = 32_000;

/// Laps left in the session. The sim reports sessions without a lap limit
/// as a large sentinel count, never show that number to the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LapsRemaining {
    #[default]
    Unlimited,
    Count(i32),
}

impl LapsRemaining {
    pub fn from_raw(raw: i32) -> Self {
        if raw >= UNLIMITED_LAPS_THRESHOLD {
            LapsRemaining::Unlimited
        } else {
            LapsRemaining::Count(raw)
        }
    }
}

impl fmt::Display for LapsRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LapsRemaining::Unlimited => write!(f, "∞"),
            LapsRemaining::Count(n) => write!(f, "{}", n),
        }
    }
}

/// Identity and rating info for the local driver, populated once per
/// connection from the session roster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub car_index: i32,
    pub name: String,
    pub customer_id: i64,
    pub i_rating: i32,
    /// Single letter, R/D/C/B/A/P ordered novice to pro
    pub license_class: String,
    pub safety_rating: f32,
}

impl Driver {
    /// License frame text, e.g. "A 4.11"
    pub fn lic_string(&self) -> String {
        format!("{} {:.2}", self.license_class, self.safety_rating)
    }

    /// Split an "A 4.11" style roster string into class and rating.
    pub fn parse_lic_string(lic: &str) -> (String, f32) {
        let mut parts = lic.split_whitespace();
        let class = parts.next().unwrap_or("R").to_string();
        let rating = parts
            .next()
            .and_then(|r| r.parse::<f32>().ok())
            .unwrap_or(0.);
        (class, rating)
    }
}

/// One polled sample of telemetry state, assembled fresh each cycle and
/// read-only once constructed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Rank in the running order, 1 is the leader
    pub position: Option<i32>,
    /// Cars in the session, for the "3 / 20" rendering
    pub field_size: Option<i32>,
    pub laps_completed: Option<i32>,
    pub laps_remaining: LapsRemaining,
    pub last_lap_time: Option<Duration>,
    /// Unset until the driver has completed a valid lap
    pub best_lap_time: Option<Duration>,
    pub fuel_remaining: Option<f32>,
    pub time_remaining: Option<Duration>,
    /// Race-control flag bitmask, multiple bits may be set at once
    pub flags: u32,
    pub track_temperature: Option<f32>,
}

impl Snapshot {
    /// Formatted "rank / field-size" when the position is known.
    pub fn position_text(&self) -> Option<String> {
        let position = self.position?;
        Some(match self.field_size {
            Some(field_size) => format!("{} / {}", position, field_size),
            None => format!("{}", position),
        })
    }

    pub fn laps_text(&self) -> Option<String> {
        let completed = self.laps_completed?;
        Some(format!("{} / {}", completed, self.laps_remaining))
    }
}

/// Render a lap time as `minutes:seconds.milliseconds`, seconds zero-padded
/// to two digits: 63.4s -> "1:03.400", 9.05s -> "0:09.050".
pub fn format_lap_time(time: Duration) -> String {
    let total_ms = (time.as_secs_f64() * 1000.).round() as u64;
    let minutes = total_ms / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{}:{:02}.{:03}", minutes, seconds, millis)
}

/// Render session time remaining as a clock: "29:45", or "1:02:10" once
/// more than an hour is left.
pub fn format_session_time(remaining: Duration) -> String {
    let total_secs = remaining.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Thousands-separated rating, "5429" -> "5,429".
pub fn format_irating(rating: i32) -> String {
    let digits = rating.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i).is_multiple_of(3) {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rating < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
