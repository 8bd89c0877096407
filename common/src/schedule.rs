// Schedule occurrence calculation
//
// Computes the next start time for every schedule kind (Cron, Weekly, OneTime)
// and the group-level lookahead rules built on top of it.

use crate::errors::ScheduleError;
use crate::models::{Group, Schedule, ScheduleKind};
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// NextOccurrence trait defines the interface for calculating upcoming start times
pub trait NextOccurrence {
    /// Next start strictly after `now`, `None` when the schedule has no more occurrences
    fn next_start_time(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError>;

    /// Like [`NextOccurrence::next_start_time`], but a malformed schedule counts as having
    /// no upcoming occurrence
    fn next_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.next_start_time(now) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(error = %e, "Schedule cannot produce a next start time");
                None
            }
        }
    }
}

impl NextOccurrence for Schedule {
    fn next_start_time(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        self.kind.next_start_time(now)
    }
}

impl NextOccurrence for ScheduleKind {
    fn next_start_time(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        match self {
            ScheduleKind::Cron {
                expression,
                timezone,
                end_date,
            } => calculate_cron_next_start(expression, *timezone, *end_date, now),

            ScheduleKind::Weekly {
                day_of_week,
                time_of_day,
                timezone,
            } => calculate_weekly_next_start(*day_of_week, time_of_day, *timezone, now),

            ScheduleKind::OneTime { start_at } => Ok((*start_at > now).then_some(*start_at)),
        }
    }
}

/// Parse and validate a cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a local `HH:MM` (or `HH:MM:SS`) meeting time
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ScheduleError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ScheduleError::InvalidTimeOfDay(value.to_string()))
}

/// Calculate next start for cron schedules, evaluated in the schedule's timezone
fn calculate_cron_next_start(
    expression: &str,
    timezone: Tz,
    end_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let schedule = parse_cron_expression(expression)?;

    let reference_in_tz = now.with_timezone(&timezone);

    let next_utc = match schedule.after(&reference_in_tz).next() {
        Some(next_in_tz) => next_in_tz.with_timezone(&Utc),
        None => return Ok(None),
    };

    if let Some(end) = end_date {
        if next_utc > end {
            return Ok(None);
        }
    }

    Ok(Some(next_utc))
}

/// Calculate next start for a weekly meeting at a local wall-clock time
fn calculate_weekly_next_start(
    day_of_week: Weekday,
    time_of_day: &str,
    timezone: Tz,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let time = parse_time_of_day(time_of_day)?;
    let today = now.with_timezone(&timezone).date_naive();

    // Two weeks covers a skipped wall-clock time on a DST transition day
    for offset in 0..15 {
        let date = today + Duration::days(offset);
        if date.weekday() != day_of_week {
            continue;
        }
        let candidate = match timezone.from_local_datetime(&date.and_time(time)).earliest() {
            Some(local) => local.with_timezone(&Utc),
            None => continue,
        };
        if candidate > now {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Soonest next start across a group's location schedules
pub fn location_next_start(group: &Group, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    group
        .locations
        .iter()
        .flat_map(|gl| gl.schedules.iter())
        .filter_map(|s| s.next_start(now))
        .min()
}

/// Effective next occurrence of a group.
///
/// The group's own schedule wins when it has an upcoming start; otherwise, when
/// location schedules are considered, the earliest location schedule start.
pub fn effective_next_occurrence(
    group: &Group,
    include_location_schedules: bool,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let own = group.schedule.as_ref().and_then(|s| s.next_start(now));
    if !include_location_schedules {
        return own;
    }
    match (own, location_next_start(group, now)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Whether a group meets before `cutoff`
pub fn is_due_before(
    group: &Group,
    cutoff: DateTime<Utc>,
    include_location_schedules: bool,
    now: DateTime<Utc>,
) -> bool {
    effective_next_occurrence(group, include_location_schedules, now)
        .map(|next| next < cutoff)
        .unwrap_or(false)
}

/// Schedule shown to members in a reminder.
///
/// Prefers the group's own schedule, otherwise the location schedule with the
/// soonest next start. Location schedules without a next start sort last.
pub fn representative_schedule(group: &Group, now: DateTime<Utc>) -> Option<&Schedule> {
    if let Some(schedule) = group.schedule.as_ref() {
        return Some(schedule);
    }
    group
        .locations
        .iter()
        .flat_map(|gl| gl.schedules.iter())
        .min_by_key(|s| {
            let next = s.next_start(now);
            (next.is_none(), next)
        })
}
