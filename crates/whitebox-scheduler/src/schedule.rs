use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::error::{Result, SchedulerError};

/// How far ahead `next_after` searches before giving up. Covers leap-day
/// schedules; anything rarer (e.g. `0 0 30 2 *`) never fires.
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    /// Aliases for `min`, `min + 1`, …
    names: &'static [&'static str],
}

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
};
const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
};
const DAY_OF_MONTH: Field = Field {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
};
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: MONTH_NAMES,
};
// 7 is accepted as a second Sunday and folded onto 0.
const DAY_OF_WEEK: Field = Field {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: WEEKDAY_NAMES,
};

/// A parsed 5-field crontab: minute, hour, day-of-month, month, day-of-week.
///
/// Evaluated in UTC. When both day fields are restricted a day matches if
/// *either* does, following Vixie cron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_any: bool,
    dow_any: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let expanded = expand_macro(expression.trim()).map_err(invalid)?;
        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK).map_err(invalid)?;
        if days_of_week & (1u64 << 7) != 0 {
            days_of_week = (days_of_week & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            expression: expression.trim().to_string(),
            minutes: parse_field(fields[0], &MINUTE).map_err(invalid)?,
            hours: parse_field(fields[1], &HOUR).map_err(invalid)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH).map_err(invalid)?,
            months: parse_field(fields[3], &MONTH).map_err(invalid)?,
            days_of_week,
            dom_any: fields[2].starts_with('*'),
            dow_any: fields[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `from`.
    ///
    /// Returns `None` when nothing matches within the search horizon.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = from.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = from + Duration::days(SEARCH_HORIZON_DAYS);

        while t <= horizon {
            if !has(self.months, t.month()) {
                let (y, m) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(&t) {
                t = (t.date_naive() + Duration::days(1))
                    .and_hms_opt(0, 0, 0)?
                    .and_utc();
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom = has(self.days_of_month, t.day());
        let dow = has(self.days_of_week, t.weekday().num_days_from_sunday());
        if self.dom_any || self.dow_any {
            dom && dow
        } else {
            dom || dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

fn has(bits: u64, value: u32) -> bool {
    bits & (1u64 << value) != 0
}

fn expand_macro(expression: &str) -> std::result::Result<&str, String> {
    if !expression.starts_with('@') {
        return Ok(expression);
    }
    match expression {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        other => Err(format!("unknown macro {other}")),
    }
}

/// Parse one field into a bitset of allowed values.
fn parse_field(text: &str, field: &Field) -> std::result::Result<u64, String> {
    let mut bits = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("{}: bad step {step:?}", field.name))?;
                if step == 0 {
                    return Err(format!("{}: step must be positive", field.name));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, field)?, parse_value(b, field)?)
        } else {
            let v = parse_value(range, field)?;
            // "5/15" means "5-max/15"
            (v, if step.is_some() { field.max } else { v })
        };
        if lo > hi {
            return Err(format!("{}: range {lo}-{hi} is reversed", field.name));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (lo..=hi).step_by(step) {
            bits |= 1u64 << v;
        }
    }
    Ok(bits)
}

fn parse_value(text: &str, field: &Field) -> std::result::Result<u32, String> {
    let lower = text.to_ascii_lowercase();
    let value = match field.names.iter().position(|n| *n == lower) {
        Some(idx) => field.min + idx as u32,
        None => text
            .parse()
            .map_err(|_| format!("{}: bad value {text:?}", field.name))?,
    };
    if value < field.min || value > field.max {
        return Err(format!(
            "{}: {value} outside {}-{}",
            field.name, field.min, field.max
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn next(expr: &str, from: DateTime<Utc>) -> DateTime<Utc> {
        CronSchedule::parse(expr).unwrap().next_after(from).unwrap()
    }

    #[test]
    fn daily_noon_fires_today_then_tomorrow() {
        assert_eq!(
            next("0 12 * * *", at(2024, 5, 1, 11, 59, 30)),
            at(2024, 5, 1, 12, 0, 0)
        );
        // strictly after: exactly at the boundary moves to the next day
        assert_eq!(
            next("0 12 * * *", at(2024, 5, 1, 12, 0, 0)),
            at(2024, 5, 2, 12, 0, 0)
        );
        assert_eq!(
            next("0 12 * * *", at(2024, 12, 31, 12, 0, 1)),
            at(2025, 1, 1, 12, 0, 0)
        );
    }

    #[test]
    fn steps_lists_and_ranges() {
        assert_eq!(
            next("*/15 * * * *", at(2024, 5, 1, 10, 16, 0)),
            at(2024, 5, 1, 10, 30, 0)
        );
        assert_eq!(
            next("5,35 9-17 * * *", at(2024, 5, 1, 17, 40, 0)),
            at(2024, 5, 2, 9, 5, 0)
        );
        assert_eq!(
            next("10/20 * * * *", at(2024, 5, 1, 10, 31, 0)),
            at(2024, 5, 1, 10, 50, 0)
        );
    }

    #[test]
    fn weekday_names_and_seven_as_sunday() {
        // 2024-05-01 is a Wednesday
        assert_eq!(
            next("30 6 * * mon", at(2024, 5, 1, 0, 0, 0)),
            at(2024, 5, 6, 6, 30, 0)
        );
        assert_eq!(
            next("0 0 * * 7", at(2024, 5, 1, 0, 0, 0)),
            at(2024, 5, 5, 0, 0, 0)
        );
        assert_eq!(
            next("0 0 1 Feb *", at(2024, 5, 1, 0, 0, 0)),
            at(2025, 2, 1, 0, 0, 0)
        );
    }

    #[test]
    fn restricted_day_fields_are_ored() {
        // the 15th, or any Monday
        let s = CronSchedule::parse("0 0 15 * 1").unwrap();
        assert_eq!(s.next_after(at(2024, 5, 1, 0, 0, 0)), Some(at(2024, 5, 6, 0, 0, 0)));
        assert_eq!(s.next_after(at(2024, 5, 13, 0, 0, 0)), Some(at(2024, 5, 15, 0, 0, 0)));
    }

    #[test]
    fn leap_day_is_found() {
        assert_eq!(
            next("0 0 29 2 *", at(2024, 3, 1, 0, 0, 0)),
            at(2028, 2, 29, 0, 0, 0)
        );
    }

    #[test]
    fn impossible_date_never_fires() {
        let s = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert_eq!(s.next_after(at(2024, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn macros_expand() {
        assert_eq!(
            next("@daily", at(2024, 5, 1, 8, 0, 0)),
            at(2024, 5, 2, 0, 0, 0)
        );
        assert_eq!(
            next("@hourly", at(2024, 5, 1, 8, 0, 0)),
            at(2024, 5, 1, 9, 0, 0)
        );
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        for expr in [
            "",
            "0 12 * *",
            "0 12 * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "*/0 * * * *",
            "5-1 * * * *",
            "@fortnightly",
            "a b c d e",
        ] {
            let err = CronSchedule::parse(expr).unwrap_err();
            assert!(
                matches!(err, SchedulerError::InvalidCron { .. }),
                "{expr:?} should be invalid"
            );
        }
    }

    #[test]
    fn display_keeps_original_text() {
        let s: CronSchedule = " 0 12 * * * ".parse().unwrap();
        assert_eq!(s.to_string(), "0 12 * * *");
    }
}
