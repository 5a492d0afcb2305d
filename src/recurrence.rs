//! Decides whether a routine fires on a given calendar date.
//!
//! Evaluation is pure: it reads the routine and the date and never fails.
//! The order of the checks matters: inactive routines, dates outside the
//! validity window and dates already generated are rejected before the
//! repeat pattern is looked at.

use crate::routine::{RepeatKind, RepeatRule, Routine};
use chrono::{Datelike, Duration, Local, NaiveDate};

/// How far ahead [`upcoming`] is willing to scan.
const PREVIEW_HORIZON_DAYS: i64 = 366 * 10;

/// Today's date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Whether `routine` should generate tasks on `target` (today when `None`).
pub fn should_fire(routine: &Routine, target: Option<NaiveDate>) -> bool {
    if !routine.active {
        return false;
    }
    let target = target.unwrap_or_else(today);
    if !within_window(routine, target) {
        return false;
    }
    if let Some(last) = routine.last_generated {
        if last.date_naive() == target {
            return false;
        }
    }
    matches_pattern(&routine.rule, routine.start_date, target)
}

fn within_window(routine: &Routine, target: NaiveDate) -> bool {
    if target < routine.start_date {
        return false;
    }
    match routine.end_date {
        Some(end) => target <= end,
        None => true,
    }
}

fn months_between(start: NaiveDate, target: NaiveDate) -> i64 {
    (target.year() as i64 - start.year() as i64) * 12 + (target.month() as i64 - start.month() as i64)
}

/// Checks the repeat pattern alone, ignoring activity, window and history.
///
/// A monthly rule anchored on a day a month lacks (say the 31st) never
/// matches in that month.
pub fn matches_pattern(rule: &RepeatRule, start: NaiveDate, target: NaiveDate) -> bool {
    let interval = i64::from(rule.interval.max(1));
    let days_since_start = (target - start).num_days();
    let weekday = target.weekday();

    match rule.kind {
        RepeatKind::Daily => days_since_start.rem_euclid(interval) == 0,
        RepeatKind::Weekly => {
            days_since_start.div_euclid(7).rem_euclid(interval) == 0 && weekday == start.weekday()
        }
        RepeatKind::Monthly => {
            target.day() == start.day() && months_between(start, target).rem_euclid(interval) == 0
        }
        RepeatKind::Weekdays => weekday.num_days_from_monday() < 5,
        RepeatKind::Weekends => weekday.num_days_from_monday() >= 5,
        RepeatKind::Custom => rule.custom_days.contains(weekday),
    }
}

/// The next `limit` dates on or after `from` where the routine's pattern
/// matches inside its validity window. Past generations are not taken into
/// account.
pub fn upcoming(routine: &Routine, from: NaiveDate, limit: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(limit);
    if !routine.active || limit == 0 {
        return dates;
    }
    let first = from.max(routine.start_date);
    for offset in 0..PREVIEW_HORIZON_DAYS {
        let day = match first.checked_add_signed(Duration::days(offset)) {
            Some(day) => day,
            None => break,
        };
        if !within_window(routine, day) {
            break;
        }
        if matches_pattern(&routine.rule, routine.start_date, day) {
            dates.push(day);
            if dates.len() == limit {
                break;
            }
        }
    }
    dates
}
