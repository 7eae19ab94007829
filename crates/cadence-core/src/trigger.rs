//! Trigger model: when a job fires and how often.
//!
//! A [`Trigger`] is pure data. The only behaviour it carries is
//! [`Trigger::next_fire_after`], which the store calls once when a job is
//! registered and again after every fire.
//!
//! # Cron expressions
//!
//! Cron triggers use the seconds-first grammar of the `cron` crate:
//! `second minute hour day_of_month month day_of_week [year]`, with `?`
//! accepted as "no specific value". A classic five-field Unix expression
//! (`minute hour day_of_month month day_of_week`) is accepted as well and
//! fires at second zero. Its numeric days of week use Unix numbering
//! (`0` or `7` is Sunday, `1` is Monday) and are translated to the crate's
//! numbering (`1` is Sunday); day names mean the same in both forms.
//!
//! - `"0 * * * * ?"` - top of every minute
//! - `"0 0/5 * * * ?"` - every 5 minutes
//! - `"0 0 9 * * MON-FRI"` - 9 AM on weekdays
//! - `"30 4 1 * *"` - 4:30 AM on the 1st of each month (five-field form)
//! - `"0 9 * * 1-5"` - 9 AM on weekdays (five-field form)

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SchedulerError, SchedulerResult};

/// `repeat_count` value meaning "repeat until deleted".
pub const REPEAT_INDEFINITELY: i32 = -1;

/// Rule deciding when a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire exactly once at `start_at`.
    OneShot { start_at: DateTime<Utc> },

    /// Fire at `start_at`, then every `interval`, `repeat_count` more times
    /// ([`REPEAT_INDEFINITELY`] for no limit).
    Repeating {
        start_at: DateTime<Utc>,
        interval: Duration,
        repeat_count: i32,
    },

    /// Fire whenever the cron expression matches.
    Cron { expression: String },
}

impl Trigger {
    /// One-shot trigger.
    pub fn once(start_at: DateTime<Utc>) -> Self {
        Trigger::OneShot { start_at }
    }

    /// Repeating trigger firing `repeat_count + 1` times in total.
    pub fn repeating(start_at: DateTime<Utc>, interval: Duration, repeat_count: i32) -> Self {
        Trigger::Repeating {
            start_at,
            interval,
            repeat_count,
        }
    }

    /// Repeating trigger without a repeat limit.
    pub fn repeat_forever(start_at: DateTime<Utc>, interval: Duration) -> Self {
        Self::repeating(start_at, interval, REPEAT_INDEFINITELY)
    }

    /// Cron trigger.
    pub fn cron(expression: impl Into<String>) -> Self {
        Trigger::Cron {
            expression: expression.into(),
        }
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::OneShot { .. } => "one_shot",
            Trigger::Repeating { .. } => "repeating",
            Trigger::Cron { .. } => "cron",
        }
    }

    /// Explicit start time. Cron triggers have none.
    pub fn start_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Trigger::OneShot { start_at } | Trigger::Repeating { start_at, .. } => Some(*start_at),
            Trigger::Cron { .. } => None,
        }
    }

    /// Reject triggers that can never fire correctly.
    pub fn validate(&self, now: DateTime<Utc>) -> SchedulerResult<()> {
        match self {
            Trigger::OneShot { .. } => Ok(()),
            Trigger::Repeating {
                interval,
                repeat_count,
                ..
            } => {
                if interval.is_zero() {
                    return Err(SchedulerError::InvalidTrigger(
                        "repeat interval must be positive".to_string(),
                    ));
                }
                if chrono::Duration::from_std(*interval).is_err() {
                    return Err(SchedulerError::InvalidTrigger(format!(
                        "repeat interval {:?} is out of range",
                        interval
                    )));
                }
                if *repeat_count < REPEAT_INDEFINITELY {
                    return Err(SchedulerError::InvalidTrigger(format!(
                        "repeat count {} is below {}",
                        repeat_count, REPEAT_INDEFINITELY
                    )));
                }
                Ok(())
            }
            Trigger::Cron { expression } => {
                let schedule = parse_cron(expression)?;
                if schedule.after(&now).next().is_none() {
                    return Err(SchedulerError::InvalidTrigger(format!(
                        "cron expression '{}' never fires after {}",
                        expression,
                        now.to_rfc3339()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Next fire time, or `None` when the trigger is exhausted or malformed.
    ///
    /// `previous_fire` is the last recorded fire and `times_fired` the number
    /// of fires already produced. A returned instant may lie in the past
    /// (one-shot or first fire of a late registration); the dispatch loop
    /// treats that as a misfire and fires immediately.
    pub fn next_fire_after(
        &self,
        now: DateTime<Utc>,
        previous_fire: Option<DateTime<Utc>>,
        times_fired: u32,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::OneShot { start_at } => match previous_fire {
                None => Some(*start_at),
                Some(_) => None,
            },

            Trigger::Repeating {
                start_at,
                interval,
                repeat_count,
            } => {
                let Some(previous) = previous_fire else {
                    return Some(*start_at);
                };
                if *repeat_count >= 0 && i64::from(times_fired) > i64::from(*repeat_count) {
                    return None;
                }
                let step = chrono::Duration::from_std(*interval).ok()?;
                previous.checked_add_signed(step)
            }

            Trigger::Cron { expression } => {
                let schedule = match parse_cron(expression) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(%expression, "cron trigger cannot compute next fire: {}", e);
                        return None;
                    }
                };
                let after = previous_fire.map_or(now, |p| p.max(now));
                schedule.after(&after).next()
            }
        }
    }

    /// The next `count` fire times starting from `from`, assuming every fire
    /// happens on time.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut previous = None;
        let mut fired = 0u32;
        while times.len() < count {
            let Some(next) = self.next_fire_after(from, previous, fired) else {
                break;
            };
            times.push(next);
            previous = Some(next);
            fired += 1;
        }
        times
    }
}

/// Rewrite a five-field Unix cron expression into the seconds-first form.
fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, day_of_month, month, day_of_week] => format!(
            "0 {} {} {} {} {}",
            minute,
            hour,
            day_of_month,
            month,
            unix_day_of_week(day_of_week)
        ),
        _ => trimmed.to_string(),
    }
}

/// Translate a Unix day-of-week field (0-7, Sunday = 0 or 7) into the
/// `cron` crate's numbering (1-7, Sunday = 1).
///
/// Numeric items, ranges and steps are expanded into an explicit list so
/// wrap-around at Sunday stays correct. Names and anything unrecognised
/// pass through for the parser to judge.
fn unix_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(unix_day_of_week_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn unix_day_of_week_item(item: &str) -> String {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => match step.parse::<usize>() {
            Ok(step) if step > 0 => (base, Some(step)),
            _ => return item.to_string(),
        },
        None => (item, None),
    };

    let bounds = match base {
        "*" | "?" if step.is_some() => Some((0, 6)),
        "*" | "?" => None,
        _ => match base.split_once('-') {
            Some((first, last)) => first.parse::<u32>().ok().zip(last.parse::<u32>().ok()),
            None => base
                .parse::<u32>()
                .ok()
                .map(|day| (day, if step.is_some() { 6 } else { day })),
        },
    };
    let Some((first, last)) = bounds else {
        return item.to_string();
    };
    if first > last || last > 7 {
        return item.to_string();
    }

    let mut days: Vec<u32> = (first..=last)
        .step_by(step.unwrap_or(1))
        .map(|day| day % 7 + 1)
        .collect();
    days.sort_unstable();
    days.dedup();
    days.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a cron expression, accepting five, six or seven fields.
pub fn parse_cron(expression: &str) -> SchedulerResult<Schedule> {
    if expression.trim().is_empty() {
        return Err(SchedulerError::InvalidTrigger(
            "cron expression is empty".to_string(),
        ));
    }
    Schedule::from_str(&normalize_cron(expression)).map_err(|e| {
        SchedulerError::InvalidTrigger(format!("invalid cron expression '{}': {}", expression, e))
    })
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
