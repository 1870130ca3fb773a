//! # Minimal Cron Evaluator
//!
//! No crate in this stack's dependency table offers real five-field cron
//! parsing, so this is hand-rolled: each field is either `*`, a bare
//! number, a `*/step`, or a comma-separated list of those. `next_after`
//! then just walks the clock minute by minute, which is simple to get
//! right and cheap enough at one evaluation per tick.

use chrono::{DateTime, Duration, Timelike, Utc};
use regex::Regex;
use std::sync::LazyLock;

static FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\*|\d+)(?:/(\d+))?$").unwrap());

#[derive(Debug, Clone)]
struct Field {
    values: Vec<u32>,
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32) -> Result<Self, String> {
        let mut values = Vec::new();
        for part in raw.split(',') {
            let caps = FIELD
                .captures(part)
                .ok_or_else(|| format!("cron field {part:?} is not `*`, a number, or a `*/step`"))?;
            let step: u32 = caps.get(1).map(|m| m.as_str().parse().unwrap_or(1)).unwrap_or(1);
            if step == 0 {
                return Err(format!("cron field {part:?} has a zero step"));
            }
            if part.starts_with('*') {
                values.extend((min..=max).step_by(step as usize));
            } else {
                let value: u32 = part.split('/').next().unwrap().parse().map_err(|e| format!("cron field {part:?}: {e}"))?;
                if value < min || value > max {
                    return Err(format!("cron field {part:?} out of range [{min}, {max}]"));
                }
                if caps.get(1).is_some() {
                    values.extend((value..=max).step_by(step as usize));
                } else {
                    values.push(value);
                }
            }
        }
        values.sort_unstable();
        values.dedup();
        Ok(Self { values })
    }

    fn contains(&self, value: u32) -> bool {
        self.values.contains(&value)
    }
}

/// A parsed `minute hour day-of-month month day-of-week` expression,
/// evaluated in UTC.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(format!("cron expression {expr:?} must have exactly 5 fields, found {}", fields.len()));
        };
        Ok(Self {
            minute: Field::parse(minute, 0, 59)?,
            hour: Field::parse(hour, 0, 23)?,
            day_of_month: Field::parse(dom, 1, 31)?,
            month: Field::parse(month, 1, 12)?,
            day_of_week: Field::parse(dow, 0, 6)?,
        })
    }

    fn matches(&self, at: &DateTime<Utc>) -> bool {
        self.minute.contains(at.minute())
            && self.hour.contains(at.hour())
            && self.day_of_month.contains(at.day())
            && self.month.contains(at.month())
            && self.day_of_week.contains(at.weekday().num_days_from_sunday())
    }

    /// The next minute-aligned instant strictly after `now` that this
    /// schedule matches. Gives up after scanning four years so a malformed
    /// day-of-month/month combination (`31 2 *`) cannot spin forever.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (now + Duration::minutes(1))
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))?;
        let limit = now + Duration::days(4 * 366);
        while candidate < limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_minute_matches_every_minute() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap();
        assert_eq!(schedule.next_after(now), Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 31, 0).unwrap()));
    }

    #[test]
    fn hourly_at_zero_minutes_skips_to_next_hour() {
        let schedule = CronSchedule::parse("0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 15, 0).unwrap();
        assert_eq!(schedule.next_after(now), Some(Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap()));
    }

    #[test]
    fn step_field_is_honoured() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 16, 0).unwrap();
        assert_eq!(schedule.next_after(now), Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap()));
    }

    #[test]
    fn offset_step_field_repeats_from_the_offset() {
        let schedule = CronSchedule::parse("10/15 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 16, 0).unwrap();
        assert_eq!(schedule.next_after(now), Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 25, 0).unwrap()));
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 40, 0).unwrap();
        assert_eq!(schedule.next_after(now), Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 55, 0).unwrap()));
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(CronSchedule::parse("* * *").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }
}
