// src/transform/time.rs

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Calendar fields derived from an epoch-millisecond event timestamp, in
/// UTC. Weekday follows the Monday=0 convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub start_time: i64,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub weekday: u32,
}

impl TimeParts {
    /// Returns `None` for timestamps chrono cannot represent.
    pub fn from_epoch_ms(ms: i64) -> Option<Self> {
        let dt: DateTime<Utc> = DateTime::from_timestamp_millis(ms)?;
        Some(TimeParts {
            start_time: ms,
            hour: dt.hour(),
            day: dt.day(),
            week: dt.iso_week().week(),
            month: dt.month(),
            weekday: dt.weekday().num_days_from_monday(),
        })
    }
}
