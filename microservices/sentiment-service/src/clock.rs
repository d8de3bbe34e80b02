//! Time source

use chrono::{DateTime, Duration, DurationRound, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Start of the hour containing `time`
pub fn top_of_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::hours(1)).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_top_of_hour() {
        let time = Utc.with_ymd_and_hms(2021, 7, 7, 10, 30, 15).unwrap();
        assert_eq!(
            top_of_hour(time),
            Utc.with_ymd_and_hms(2021, 7, 7, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_fixed_clock() {
        let time = Utc.with_ymd_and_hms(2021, 7, 7, 10, 30, 0).unwrap();
        let clock = FixedClock(time);
        assert_eq!(clock.now(), time);
        assert_eq!(clock.now_ms(), 1_625_653_800_000);
    }
}
