//! Recurrence of the scan timer.
//!
//! Intervals under an hour tick every N minutes; longer intervals are
//! rounded to whole hours.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    EveryMinutes { minutes: u32 },
    EveryHours { hours: u32 },
}

impl Schedule {
    /// Builds the schedule for a configured interval. Zero counts as one minute.
    pub fn from_interval(minutes: u32) -> Self {
        let minutes = minutes.max(1);
        if minutes < 60 {
            Schedule::EveryMinutes { minutes }
        } else {
            let hours = (f64::from(minutes) / 60.0).round() as u32;
            Schedule::EveryHours { hours: hours.max(1) }
        }
    }

    /// Five-field cron rendering, as shown to users.
    pub fn to_cron(&self) -> String {
        match self {
            Schedule::EveryMinutes { minutes } => format!("*/{minutes} * * * *"),
            Schedule::EveryHours { hours } => format!("0 */{hours} * * *"),
        }
    }

    pub fn period(&self) -> Duration {
        match self {
            Schedule::EveryMinutes { minutes } => Duration::from_secs(u64::from(*minutes) * 60),
            Schedule::EveryHours { hours } => Duration::from_secs(u64::from(*hours) * 3600),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::EveryMinutes { minutes } => write!(f, "every {minutes}m"),
            Schedule::EveryHours { hours } => write!(f, "every {hours}h"),
        }
    }
}
