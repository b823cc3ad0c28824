use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Inclusive range of report dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

/// The single report day before `today`.
pub fn yesterday(today: NaiveDate) -> DateRange {
    let day = today - Duration::days(1);
    DateRange::new(day, day)
}

/// The `days` full report days ending yesterday.
pub fn trailing_window(today: NaiveDate, days: i64) -> DateRange {
    let to = today - Duration::days(1);
    let from = today - Duration::days(days.max(1));
    DateRange::new(from, to)
}

/// Holiday window excluded from budget history: Dec 5-25 of the prior year,
/// only while the run date falls in the first quarter.
pub fn q1_blackout(today: NaiveDate) -> Option<DateRange> {
    if today.month() > 3 {
        return None;
    }
    let year = today.year() - 1;
    let from = NaiveDate::from_ymd_opt(year, 12, 5)?;
    let to = NaiveDate::from_ymd_opt(year, 12, 25)?;
    Some(DateRange::new(from, to))
}

/// Epoch milliseconds before which a platform update counts as cooled down.
pub fn cooldown_cutoff_ms(now: DateTime<Utc>, cooldown_hours: i64) -> i64 {
    (now - Duration::hours(cooldown_hours)).timestamp_millis()
}
