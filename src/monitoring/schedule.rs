//! Standard five-field cron expressions evaluated in an IANA timezone.
//!
//! `MIN HOUR DOM MON DOW` with `*`, `?`, lists, ranges, steps and month/weekday names,
//! plus the `@hourly`-style descriptors. An optional `CRON_TZ=<zone>` (or `TZ=<zone>`)
//! prefix overrides the timezone passed by the caller.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// How far ahead `next_after` searches before giving up.
const SEARCH_YEARS: i32 = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("empty cron expression")]
    Empty,
    #[error("expected exactly 5 fields, found {count}: {expression:?}")]
    FieldCount { count: usize, expression: String },
    #[error("unrecognized descriptor: {0}")]
    UnknownDescriptor(String),
    #[error("invalid {field} field {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("unknown time zone {0:?}")]
    UnknownTimezone(String),
    #[error("no matching time within 5 years")]
    NoMatch,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    // Value of names[0].
    names_offset: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_offset: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_offset: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    names_offset: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"],
    names_offset: 1,
};
// 7 is accepted as Sunday and folded onto 0.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
    names_offset: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    bits: u64,
    // Set when the field was a bare `*` or `?`.
    star: bool,
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
    timezone: Option<Tz>,
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let mut spec = expression.trim();
        if spec.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let mut timezone = None;
        if let Some(rest) = spec.strip_prefix("CRON_TZ=").or_else(|| spec.strip_prefix("TZ=")) {
            let (name, remainder) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            timezone = Some(
                name.parse::<Tz>()
                    .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))?,
            );
            spec = remainder.trim();
        }

        if spec.starts_with('@') {
            spec = expand_descriptor(spec)?;
        }

        let fields: Vec<&str> = spec.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount {
                count: fields.len(),
                expression: expression.to_string(),
            });
        }

        let mut day_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if day_of_week.matches(7) {
            day_of_week.bits = (day_of_week.bits & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            minute: parse_field(fields[0], &MINUTE)?,
            hour: parse_field(fields[1], &HOUR)?,
            day_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            month: parse_field(fields[3], &MONTH)?,
            day_of_week,
            timezone,
        })
    }
}

fn expand_descriptor(descriptor: &str) -> Result<&'static str, ScheduleError> {
    match descriptor.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(ScheduleError::UnknownDescriptor(descriptor.to_string())),
    }
}

fn parse_field(expression: &str, spec: &FieldSpec) -> Result<Field, ScheduleError> {
    let mut field = Field { bits: 0, star: false };
    for part in expression.split(',') {
        let (bits, star) = parse_part(part, spec).map_err(|reason| ScheduleError::InvalidField {
            field: spec.name,
            value: expression.to_string(),
            reason,
        })?;
        field.bits |= bits;
        field.star |= star;
    }
    Ok(field)
}

fn parse_part(part: &str, spec: &FieldSpec) -> Result<(u64, bool), String> {
    if part.is_empty() {
        return Err("empty list item".to_string());
    }

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid step {step:?}"))?;
            if step == 0 {
                return Err("step must be positive".to_string());
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (start, end, star) = if range == "*" || range == "?" {
        (spec.min, spec.max, true)
    } else if let Some((low, high)) = range.split_once('-') {
        (parse_value(low, spec)?, parse_value(high, spec)?, false)
    } else {
        let value = parse_value(range, spec)?;
        (value, if step.is_some() { spec.max } else { value }, false)
    };

    if start < spec.min || end > spec.max {
        return Err(format!(
            "{start}-{end} is outside {}-{}",
            spec.min, spec.max
        ));
    }
    if start > end {
        return Err(format!("range start {start} is after end {end}"));
    }

    let step = step.unwrap_or(1);
    let bits = (start..=end)
        .step_by(step as usize)
        .fold(0u64, |bits, value| bits | (1u64 << value));
    Ok((bits, star && step == 1))
}

fn parse_value(raw: &str, spec: &FieldSpec) -> Result<u32, String> {
    if let Ok(value) = raw.parse::<u32>() {
        return Ok(value);
    }
    let lowered = raw.to_ascii_lowercase();
    spec.names
        .iter()
        .position(|name| *name == lowered)
        .map(|index| index as u32 + spec.names_offset)
        .ok_or_else(|| format!("invalid value {raw:?}"))
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        expression.parse()
    }

    /// First matching minute strictly after `after`, evaluated on the wall clock of `tz`
    /// (or of the expression's own `CRON_TZ`). Local times that do not exist are skipped;
    /// ambiguous ones resolve to the earliest instant still after `after`.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, ScheduleError> {
        let tz = self.timezone.unwrap_or(tz);
        let local = after.with_timezone(&tz).naive_local();
        let mut candidate = truncate_to_minute(local)
            .checked_add_signed(TimeDelta::minutes(1))
            .ok_or(ScheduleError::NoMatch)?;
        let year_limit = candidate.year() + SEARCH_YEARS;

        while candidate.year() <= year_limit {
            if !self.month.matches(candidate.month()) {
                candidate = start_of_next_month(candidate).ok_or(ScheduleError::NoMatch)?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = start_of_next_day(candidate).ok_or(ScheduleError::NoMatch)?;
                continue;
            }
            if !self.hour.matches(candidate.hour()) {
                candidate = start_of_next_hour(candidate).ok_or(ScheduleError::NoMatch)?;
                continue;
            }
            if self.minute.matches(candidate.minute()) {
                let resolved = tz.from_local_datetime(&candidate);
                for instant in [resolved.earliest(), resolved.latest()].into_iter().flatten() {
                    let instant = instant.with_timezone(&Utc);
                    if instant > after {
                        return Ok(instant);
                    }
                }
            }
            candidate = candidate
                .checked_add_signed(TimeDelta::minutes(1))
                .ok_or(ScheduleError::NoMatch)?;
        }

        Err(ScheduleError::NoMatch)
    }

    /// When either day field is a bare wildcard both must match, otherwise either may.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.day_of_month.matches(date.day());
        let dow = self
            .day_of_week
            .matches(date.weekday().num_days_from_sunday());
        if self.day_of_month.star || self.day_of_week.star {
            dom && dow
        } else {
            dom || dow
        }
    }
}

fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(value)
}

fn start_of_next_month(value: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if value.month() == 12 {
        (value.year() + 1, 1)
    } else {
        (value.year(), value.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn start_of_next_day(value: NaiveDateTime) -> Option<NaiveDateTime> {
    value.date().succ_opt()?.and_hms_opt(0, 0, 0)
}

fn start_of_next_hour(value: NaiveDateTime) -> Option<NaiveDateTime> {
    value
        .date()
        .and_hms_opt(value.hour(), 0, 0)?
        .checked_add_signed(TimeDelta::hours(1))
}

/// Parses `expression` and returns its next run strictly after `after`.
pub fn next_run(expression: &str, after: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, ScheduleError> {
    CronSchedule::parse(expression)?.next_after(after, tz)
}

/// Resolves the timezone cron expressions are evaluated in. A blank name yields
/// `fallback`; an unknown name is logged and yields UTC.
pub fn resolve_timezone(name: Option<&str>, fallback: &str) -> Tz {
    let configured = name.map(str::trim).filter(|name| !name.is_empty());
    let name = configured.unwrap_or_else(|| fallback.trim());
    if name.is_empty() {
        return Tz::UTC;
    }
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = name, "Invalid cron timezone, falling back to UTC.");
            Tz::UTC
        }
    }
}

/// A target scheduled at or before process start is a catch-up run.
pub fn is_startup_catch_up(next_run_at: Option<DateTime<Utc>>, startup_at: Option<DateTime<Utc>>) -> bool {
    match (next_run_at, startup_at) {
        (Some(next_run_at), Some(startup_at)) => next_run_at <= startup_at,
        _ => false,
    }
}
