//! Weekly checks over a Monday-Sunday calendar week: worked-day count,
//! weekly rest span, and the weekly work-hours cap.

use chrono::{Duration, NaiveDate};

use super::super::domain::{ActivitySpan, Business, DayPartition};
use super::super::registry::{
    CheckRegistry, CheckVariables, RegistryError, RegulationCheckType,
};
use super::{
    sanction, AlertExtra, CheckOutcome, CheckResult, WeeklyRestExtra, WeeklyWorkExtra,
    WorkedDaysExtra,
};

/// Inputs for one calendar week: the resolved activity spans overlapping it
/// and the threshold registry. Outcomes are keyed by the week's Monday.
pub struct WeekContext<'a> {
    pub monday: NaiveDate,
    pub business: Business,
    pub spans: &'a [ActivitySpan],
    pub partition: &'a DayPartition,
    pub registry: &'a CheckRegistry,
}

pub fn evaluate_week(ctx: &WeekContext<'_>) -> Result<Vec<CheckOutcome>, RegistryError> {
    Ok(vec![
        maximum_worked_days(ctx)?,
        minimum_weekly_rest(ctx)?,
        maximum_week_work(ctx)?,
    ])
}

fn maximum_worked_days(ctx: &WeekContext<'_>) -> Result<CheckOutcome, RegistryError> {
    let row = ctx.registry.resolve(
        RegulationCheckType::MaximumWorkedDaysInWeek,
        ctx.business,
        ctx.monday,
    )?;
    let max_worked_days = match &row.variables {
        CheckVariables::WorkedDays { max_worked_days } => *max_worked_days,
        _ => {
            return Err(RegistryError::VariableShape(
                RegulationCheckType::MaximumWorkedDaysInWeek,
            ))
        }
    };

    let mut worked_days = 0u32;
    for offset in 0..7 {
        let day = ctx.monday + Duration::days(offset);
        let day_start = ctx.partition.day_start(day);
        let day_end = ctx.partition.day_end(day);
        let worked = ctx
            .spans
            .iter()
            .any(|span| span.start < day_end && span.end > day_start);
        if worked {
            worked_days += 1;
        }
    }

    let result = if worked_days <= max_worked_days {
        CheckResult::Pass
    } else {
        CheckResult::Fail(AlertExtra::WorkedDays(WorkedDaysExtra {
            worked_days,
            max_worked_days,
            sanction_code: sanction::MAXIMUM_WORKED_DAYS_IN_WEEK.to_string(),
        }))
    };

    Ok(CheckOutcome {
        check_type: RegulationCheckType::MaximumWorkedDaysInWeek,
        day: ctx.monday,
        result,
    })
}

fn minimum_weekly_rest(ctx: &WeekContext<'_>) -> Result<CheckOutcome, RegistryError> {
    let row = ctx.registry.resolve(
        RegulationCheckType::MinimumWeeklyRest,
        ctx.business,
        ctx.monday,
    )?;
    let min_weekly_rest_hours = match &row.variables {
        CheckVariables::WeeklyRest {
            min_weekly_rest_hours,
        } => *min_weekly_rest_hours,
        _ => {
            return Err(RegistryError::VariableShape(
                RegulationCheckType::MinimumWeeklyRest,
            ))
        }
    };

    let week_start = ctx.partition.day_start(ctx.monday);
    let week_end = ctx.partition.day_start(ctx.monday + Duration::days(7));

    // Walk the busy intervals clipped to the week; the outer break is the
    // widest idle gap, counting fully idle days toward their neighbours.
    let mut intervals: Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> = ctx
        .spans
        .iter()
        .filter(|span| span.start < week_end && span.end > week_start)
        .map(|span| (span.start.max(week_start), span.end.min(week_end)))
        .collect();
    intervals.sort();

    let mut longest_rest = Duration::zero();
    let mut cursor = week_start;
    for (start, end) in intervals {
        if start > cursor {
            longest_rest = longest_rest.max(start - cursor);
        }
        cursor = cursor.max(end);
    }
    if week_end > cursor {
        longest_rest = longest_rest.max(week_end - cursor);
    }

    let result = if longest_rest >= Duration::hours(min_weekly_rest_hours as i64) {
        CheckResult::Pass
    } else {
        CheckResult::Fail(AlertExtra::WeeklyRest(WeeklyRestExtra {
            rest_duration_s: longest_rest.num_seconds(),
            min_weekly_rest_hours,
            sanction_code: sanction::MINIMUM_WEEKLY_REST.to_string(),
        }))
    };

    Ok(CheckOutcome {
        check_type: RegulationCheckType::MinimumWeeklyRest,
        day: ctx.monday,
        result,
    })
}

fn maximum_week_work(ctx: &WeekContext<'_>) -> Result<CheckOutcome, RegistryError> {
    let row = ctx.registry.resolve(
        RegulationCheckType::MaximumWorkInCalendarWeek,
        ctx.business,
        ctx.monday,
    )?;
    let (max_week_hours, tolerance_hours) = match &row.variables {
        CheckVariables::WeeklyWork {
            max_week_hours,
            tolerance_hours,
        } => (*max_week_hours, *tolerance_hours),
        _ => {
            return Err(RegistryError::VariableShape(
                RegulationCheckType::MaximumWorkInCalendarWeek,
            ))
        }
    };

    let week_start = ctx.partition.day_start(ctx.monday);
    let week_end = ctx.partition.day_start(ctx.monday + Duration::days(7));
    let total_work = ctx
        .spans
        .iter()
        .filter(|span| span.activity_type.counts_as_work())
        .fold(Duration::zero(), |acc, span| {
            acc + span.overlap(week_start, week_end)
        });

    let allowed = Duration::hours((max_week_hours + tolerance_hours) as i64);
    let result = if total_work <= allowed {
        CheckResult::Pass
    } else {
        CheckResult::Fail(AlertExtra::WeeklyWork(WeeklyWorkExtra {
            work_duration_s: total_work.num_seconds(),
            max_week_hours,
            sanction_code: sanction::MAXIMUM_WORK_IN_CALENDAR_WEEK.to_string(),
        }))
    };

    Ok(CheckOutcome {
        check_type: RegulationCheckType::MaximumWorkInCalendarWeek,
        day: ctx.monday,
        result,
    })
}
