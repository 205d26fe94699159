//! Daily checks: minimum rest, work-day time cap with long-break resets,
//! break sufficiency, and the controller-side no-LIC check.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::super::domain::{ActivitySpan, ActivityType, Business, DayPartition, TransportKind};
use super::super::registry::{
    CheckRegistry, CheckVariables, RegistryError, RegulationCheckType,
};
use super::super::windows::WorkWindow;
use super::{
    sanction, AlertExtra, CheckOutcome, CheckResult, DailyRestExtra, EnoughBreakExtra,
    NoLicInfraction, WorkDayTimeExtra,
};

/// Everything a daily evaluation needs: the target day, the windows built
/// over the surrounding three-day range, and the threshold registry.
pub struct DayContext<'a> {
    pub day: NaiveDate,
    pub business: Business,
    pub windows: &'a [WorkWindow],
    pub partition: &'a DayPartition,
    pub registry: &'a CheckRegistry,
}

/// Run every persisted daily check over the context. Checks are evaluated
/// independently; only registry misconfiguration aborts.
pub fn evaluate_day(ctx: &DayContext<'_>) -> Result<Vec<CheckOutcome>, RegistryError> {
    Ok(vec![
        minimum_daily_rest(ctx)?,
        maximum_work_day_time(ctx)?,
        enough_break(ctx)?,
    ])
}

/// A run of activity uninterrupted by a qualifying long rest. Work performed
/// before a long break never sums with work performed after it.
#[derive(Debug, Clone)]
struct WorkBout {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    spans: Vec<ActivitySpan>,
    total_work: Duration,
    night_work: Duration,
}

impl WorkBout {
    fn amplitude(&self) -> Duration {
        self.end - self.start
    }

    fn touches(&self, day: NaiveDate, partition: &DayPartition) -> bool {
        self.start < partition.day_end(day) && self.end > partition.day_start(day)
    }

    fn from_spans(spans: Vec<ActivitySpan>, partition: &DayPartition) -> Option<Self> {
        let start = spans.first()?.start;
        let end = spans.iter().map(|span| span.end).max()?;
        let mut total_work = Duration::zero();
        let mut night_work = Duration::zero();
        for span in &spans {
            if span.activity_type.counts_as_work() {
                total_work = total_work + span.duration();
                night_work = night_work + partition.night_overlap(span.start, span.end);
            }
        }
        Some(Self {
            start,
            end,
            spans,
            total_work,
            night_work,
        })
    }
}

/// Split the chronological span sequence wherever the gap since the last
/// work activity reaches `min_rest` (the long-break reset).
fn long_break_bouts(
    windows: &[WorkWindow],
    min_rest: Duration,
    partition: &DayPartition,
) -> Vec<WorkBout> {
    let mut spans: Vec<ActivitySpan> = windows
        .iter()
        .flat_map(|window| window.spans.iter().copied())
        .collect();
    spans.sort_by_key(|span| (span.start, span.activity_id));

    let mut bouts = Vec::new();
    let mut current: Vec<ActivitySpan> = Vec::new();
    let mut last_work_end: Option<DateTime<Utc>> = None;

    for span in spans {
        if let Some(end) = last_work_end {
            if span.start - end >= min_rest {
                if let Some(bout) = WorkBout::from_spans(std::mem::take(&mut current), partition) {
                    bouts.push(bout);
                }
                last_work_end = None;
            }
        }
        if span.activity_type.counts_as_work() {
            last_work_end = Some(last_work_end.map(|end| end.max(span.end)).unwrap_or(span.end));
        }
        current.push(span);
    }
    if let Some(bout) = WorkBout::from_spans(current, partition) {
        bouts.push(bout);
    }
    bouts
}

fn daily_rest_hours(ctx: &DayContext<'_>) -> Result<u32, RegistryError> {
    let row = ctx
        .registry
        .resolve(RegulationCheckType::MinimumDailyRest, ctx.business, ctx.day)?;
    match &row.variables {
        CheckVariables::DailyRest {
            min_daily_break_hours,
        } => Ok(*min_daily_break_hours),
        _ => Err(RegistryError::VariableShape(RegulationCheckType::MinimumDailyRest)),
    }
}

fn minimum_daily_rest(ctx: &DayContext<'_>) -> Result<CheckOutcome, RegistryError> {
    let min_daily_break_hours = daily_rest_hours(ctx)?;
    let min_rest = Duration::hours(min_daily_break_hours as i64);
    let allowed = Duration::hours(24) - min_rest;

    let mut result = CheckResult::Pass;
    for bout in long_break_bouts(ctx.windows, min_rest, ctx.partition) {
        if !bout.touches(ctx.day, ctx.partition) {
            continue;
        }
        if bout.total_work > allowed {
            result = CheckResult::Fail(AlertExtra::DailyRest(DailyRestExtra {
                breach_start: bout.start,
                breach_end: bout.end,
                total_work_s: bout.total_work.num_seconds(),
                min_daily_break_hours,
                sanction_code: sanction::MINIMUM_DAILY_REST.to_string(),
            }));
            break;
        }
    }

    Ok(CheckOutcome {
        check_type: RegulationCheckType::MinimumDailyRest,
        day: ctx.day,
        result,
    })
}

fn maximum_work_day_time(ctx: &DayContext<'_>) -> Result<CheckOutcome, RegistryError> {
    let row = ctx
        .registry
        .resolve(RegulationCheckType::MaximumWorkDayTime, ctx.business, ctx.day)?;
    let (max_day_hours, max_night_hours, amplitude_buckets) = match &row.variables {
        CheckVariables::WorkDayTime {
            max_day_hours,
            max_night_hours,
            amplitude_buckets,
        } => (*max_day_hours, *max_night_hours, amplitude_buckets.as_slice()),
        _ => {
            return Err(RegistryError::VariableShape(
                RegulationCheckType::MaximumWorkDayTime,
            ))
        }
    };
    let min_rest = Duration::hours(daily_rest_hours(ctx)? as i64);

    let mut result = CheckResult::Pass;
    for bout in long_break_bouts(ctx.windows, min_rest, ctx.partition) {
        if !bout.touches(ctx.day, ctx.partition) {
            continue;
        }

        let night_work = bout.night_work > Duration::zero();
        let mut max_hours = if night_work { max_night_hours } else { max_day_hours };
        if ctx.business.is_t3p() {
            let bucket_cap = amplitude_buckets
                .iter()
                .filter(|bucket| {
                    bout.amplitude() > Duration::hours(bucket.amplitude_above_hours as i64)
                })
                .map(|bucket| bucket.max_work_hours)
                .min();
            if let Some(cap) = bucket_cap {
                max_hours = max_hours.min(cap);
            }
        }

        if bout.total_work > Duration::hours(max_hours as i64) {
            result = CheckResult::Fail(AlertExtra::WorkDayTime(WorkDayTimeExtra {
                breach_start: bout.start,
                breach_end: bout.end,
                work_duration_s: bout.total_work.num_seconds(),
                night_work,
                max_work_day_hours: max_hours,
                sanction_code: if night_work {
                    sanction::MAXIMUM_WORK_NIGHT_TIME.to_string()
                } else {
                    sanction::MAXIMUM_WORK_DAY_TIME.to_string()
                },
            }));
            break;
        }
    }

    Ok(CheckOutcome {
        check_type: RegulationCheckType::MaximumWorkDayTime,
        day: ctx.day,
        result,
    })
}

/// Cumulative qualifying break and longest uninterrupted work run within one
/// bout. Transfer time neither counts as break nor interrupts a run.
fn break_profile(bout: &WorkBout, qualifying: Duration) -> (Duration, Duration) {
    let work_spans: Vec<&ActivitySpan> = bout
        .spans
        .iter()
        .filter(|span| span.activity_type.counts_as_work())
        .collect();
    let transfers: Vec<&ActivitySpan> = bout
        .spans
        .iter()
        .filter(|span| span.activity_type == ActivityType::Transfer)
        .collect();

    let mut total_break = Duration::zero();
    let mut longest_run = Duration::zero();
    let mut run = Duration::zero();
    let mut previous_end: Option<DateTime<Utc>> = None;

    for span in work_spans {
        if let Some(end) = previous_end {
            let raw_gap = (span.start - end).max(Duration::zero());
            let transfer_cover = transfers
                .iter()
                .fold(Duration::zero(), |acc, transfer| acc + transfer.overlap(end, span.start));
            let effective_gap = (raw_gap - transfer_cover).max(Duration::zero());
            if effective_gap >= qualifying {
                total_break = total_break + effective_gap;
                run = Duration::zero();
            }
        }
        run = run + span.duration();
        longest_run = longest_run.max(run);
        previous_end = Some(previous_end.map(|end| end.max(span.end)).unwrap_or(span.end));
    }

    (total_break, longest_run)
}

fn enough_break(ctx: &DayContext<'_>) -> Result<CheckOutcome, RegistryError> {
    let row = ctx
        .registry
        .resolve(RegulationCheckType::EnoughBreak, ctx.business, ctx.day)?;
    let (tiers, qualifying_minutes, max_uninterrupted_hours) = match &row.variables {
        CheckVariables::EnoughBreak {
            tiers,
            min_qualifying_break_minutes,
            max_uninterrupted_hours,
        } => (tiers.as_slice(), *min_qualifying_break_minutes, *max_uninterrupted_hours),
        _ => return Err(RegistryError::VariableShape(RegulationCheckType::EnoughBreak)),
    };
    let min_rest = Duration::hours(daily_rest_hours(ctx)? as i64);
    let qualifying = Duration::minutes(qualifying_minutes as i64);
    let max_uninterrupted = Duration::hours(max_uninterrupted_hours as i64);

    let mut result = CheckResult::Pass;
    for bout in long_break_bouts(ctx.windows, min_rest, ctx.partition) {
        if !bout.touches(ctx.day, ctx.partition) {
            continue;
        }

        let (total_break, longest_run) = break_profile(&bout, qualifying);
        let required_break_min = tiers
            .iter()
            .filter(|tier| bout.total_work > Duration::hours(tier.work_above_hours as i64))
            .map(|tier| tier.required_break_minutes)
            .max()
            .unwrap_or(0);

        let not_enough_break = required_break_min > 0
            && total_break < Duration::minutes(required_break_min as i64);
        let too_much_uninterrupted_work_time = longest_run > max_uninterrupted;

        if not_enough_break || too_much_uninterrupted_work_time {
            result = CheckResult::Fail(AlertExtra::EnoughBreak(EnoughBreakExtra {
                not_enough_break,
                too_much_uninterrupted_work_time,
                total_work_s: bout.total_work.num_seconds(),
                total_break_s: total_break.num_seconds(),
                required_break_min,
                longest_uninterrupted_s: longest_run.num_seconds(),
                max_uninterrupted_hours,
                sanction_code: sanction::ENOUGH_BREAK.to_string(),
            }));
            break;
        }
    }

    Ok(CheckOutcome {
        check_type: RegulationCheckType::EnoughBreak,
        day: ctx.day,
        result,
    })
}

/// Controller-side check: the expected day carries no logged activity for
/// the worker's business. Informational only, never persisted.
pub fn check_no_lic(business: Business, day: NaiveDate, has_activity: bool) -> Option<NoLicInfraction> {
    if has_activity {
        return None;
    }
    let sanction_code = match business.transport() {
        TransportKind::Freight => sanction::NO_LIC_FREIGHT,
        TransportKind::Passenger => sanction::NO_LIC_PASSENGER,
    };
    Some(NoLicInfraction {
        day,
        sanction_code: sanction_code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::domain::{
        Activity, ActivityId, MissionId, Submitter, SubmitterType, UserId,
    };
    use crate::engine::windows::build_windows;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, day, h, m, 0).single().expect("valid instant")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, d).expect("valid date")
    }

    fn activity(
        id: i64,
        activity_type: ActivityType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Activity {
        Activity::new(
            ActivityId(id),
            MissionId(1),
            UserId(1),
            activity_type,
            Submitter {
                id: UserId(1),
                kind: SubmitterType::Employee,
            },
            start,
            Some(end),
        )
    }

    fn context<'a>(
        windows: &'a [WorkWindow],
        partition: &'a DayPartition,
        registry: &'a CheckRegistry,
        target: NaiveDate,
        business: Business,
    ) -> DayContext<'a> {
        DayContext {
            day: target,
            business,
            windows,
            partition,
            registry,
        }
    }

    fn evaluate(
        activities: &[Activity],
        target: NaiveDate,
        business: Business,
        reference: DateTime<Utc>,
    ) -> Vec<CheckOutcome> {
        let partition = DayPartition::utc();
        let registry = CheckRegistry::with_defaults();
        let windows = build_windows(activities, target, &partition, reference);
        let ctx = context(&windows, &partition, &registry, target, business);
        evaluate_day(&ctx).expect("default registry resolves")
    }

    fn outcome_for(outcomes: &[CheckOutcome], check_type: RegulationCheckType) -> &CheckOutcome {
        outcomes
            .iter()
            .find(|outcome| outcome.check_type == check_type)
            .expect("outcome present")
    }

    #[test]
    fn compliant_day_passes_all_checks() {
        let activities = vec![
            activity(1, ActivityType::Drive, at(5, 8, 0), at(5, 11, 0)),
            activity(2, ActivityType::Break, at(5, 11, 0), at(5, 11, 45)),
            activity(3, ActivityType::Work, at(5, 11, 45), at(5, 15, 0)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        assert!(outcomes.iter().all(|outcome| !outcome.is_failure()));
    }

    #[test]
    fn fifteen_hours_of_work_breaches_daily_rest() {
        let activities = vec![activity(1, ActivityType::Drive, at(5, 4, 0), at(5, 19, 0))];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::MinimumDailyRest);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::DailyRest(extra)) => {
                assert_eq!(extra.total_work_s, 15 * 3600);
                assert_eq!(extra.min_daily_break_hours, 10);
                assert_eq!(extra.breach_start, at(5, 4, 0));
            }
            other => panic!("expected daily rest breach, got {other:?}"),
        }
    }

    #[test]
    fn long_break_resets_the_work_day_counter() {
        // 7h of work, then a 14h gap, then 7h more. Neither bout alone
        // exceeds the 12h day cap, and the qualifying rest keeps them apart.
        let activities = vec![
            activity(1, ActivityType::Drive, at(5, 4, 0), at(5, 11, 0)),
            activity(2, ActivityType::Drive, at(6, 1, 0), at(6, 8, 0)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(7, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::MaximumWorkDayTime);
        assert!(!outcome.is_failure());
    }

    #[test]
    fn short_gap_still_sums_work_across_midnight() {
        // 8h, a 4h gap, then 6h more: 14h in one bout, above the 12h cap.
        let activities = vec![
            activity(1, ActivityType::Work, at(5, 6, 0), at(5, 14, 0)),
            activity(2, ActivityType::Work, at(5, 18, 0), at(6, 0, 0)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(7, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::MaximumWorkDayTime);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::WorkDayTime(extra)) => {
                assert_eq!(extra.work_duration_s, 14 * 3600);
                assert!(extra.night_work);
                assert_eq!(extra.max_work_day_hours, 10);
                assert_eq!(extra.sanction_code, "NATINF 32083");
            }
            other => panic!("expected work day time breach, got {other:?}"),
        }
    }

    #[test]
    fn day_work_breach_uses_day_sanction_code() {
        let activities = vec![activity(1, ActivityType::Work, at(5, 6, 0), at(5, 19, 0))];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::MaximumWorkDayTime);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::WorkDayTime(extra)) => {
                assert!(!extra.night_work);
                assert_eq!(extra.sanction_code, "NATINF 11292");
            }
            other => panic!("expected work day time breach, got {other:?}"),
        }
    }

    #[test]
    fn t3p_amplitude_bucket_tightens_the_cap() {
        // 10h30 of work spread over a 16h amplitude: under the generic 12h
        // cap but above the 9h cap of the widest taxi amplitude bucket.
        let activities = vec![
            activity(1, ActivityType::Drive, at(5, 5, 0), at(5, 10, 30)),
            activity(2, ActivityType::Drive, at(5, 16, 0), at(5, 21, 0)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::Taxi, at(6, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::MaximumWorkDayTime);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::WorkDayTime(extra)) => {
                assert_eq!(extra.max_work_day_hours, 9);
            }
            other => panic!("expected amplitude-capped breach, got {other:?}"),
        }

        // The same hours are compliant for a freight business.
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        assert!(!outcome_for(&outcomes, RegulationCheckType::MaximumWorkDayTime).is_failure());
    }

    #[test]
    fn insufficient_break_raises_only_the_break_flag() {
        // 6h30 of work with a single 15-minute break: the 6h tier requires
        // 30 minutes.
        let activities = vec![
            activity(1, ActivityType::Work, at(5, 8, 0), at(5, 11, 30)),
            activity(2, ActivityType::Break, at(5, 11, 30), at(5, 11, 45)),
            activity(3, ActivityType::Work, at(5, 11, 45), at(5, 14, 45)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::EnoughBreak);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::EnoughBreak(extra)) => {
                assert!(extra.not_enough_break);
                assert!(!extra.too_much_uninterrupted_work_time);
                assert_eq!(extra.required_break_min, 30);
                assert_eq!(extra.total_break_s, 15 * 60);
            }
            other => panic!("expected enough break failure, got {other:?}"),
        }
    }

    #[test]
    fn sub_fifteen_minute_gaps_do_not_count_as_break() {
        // Three 10-minute pauses never accumulate into qualifying break
        // time, and the work on either side stays one uninterrupted run.
        let activities = vec![
            activity(1, ActivityType::Work, at(5, 8, 0), at(5, 10, 0)),
            activity(2, ActivityType::Work, at(5, 10, 10), at(5, 12, 10)),
            activity(3, ActivityType::Work, at(5, 12, 20), at(5, 14, 20)),
            activity(4, ActivityType::Work, at(5, 14, 30), at(5, 15, 30)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::EnoughBreak);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::EnoughBreak(extra)) => {
                assert!(extra.not_enough_break);
                assert!(extra.too_much_uninterrupted_work_time);
                assert_eq!(extra.total_break_s, 0);
                assert_eq!(extra.longest_uninterrupted_s, 7 * 3600);
            }
            other => panic!("expected both break flags, got {other:?}"),
        }
    }

    #[test]
    fn transfer_neither_breaks_a_run_nor_counts_as_break() {
        // 3h work, 1h transfer, 3h30 work: the run is 6h30 of work with no
        // qualifying break.
        let activities = vec![
            activity(1, ActivityType::Work, at(5, 8, 0), at(5, 11, 0)),
            activity(2, ActivityType::Transfer, at(5, 11, 0), at(5, 12, 0)),
            activity(3, ActivityType::Work, at(5, 12, 0), at(5, 15, 30)),
        ];
        let outcomes = evaluate(&activities, day(5), Business::LongHaulFreight, at(6, 0, 0));
        let outcome = outcome_for(&outcomes, RegulationCheckType::EnoughBreak);
        match &outcome.result {
            CheckResult::Fail(AlertExtra::EnoughBreak(extra)) => {
                assert!(extra.too_much_uninterrupted_work_time);
                assert_eq!(extra.longest_uninterrupted_s, 6 * 3600 + 30 * 60);
                assert_eq!(extra.total_break_s, 0);
            }
            other => panic!("expected uninterrupted work failure, got {other:?}"),
        }
    }

    #[test]
    fn no_lic_codes_follow_transport_kind() {
        let freight = check_no_lic(Business::ShortDistanceFreight, day(5), false)
            .expect("infraction raised");
        assert_eq!(freight.sanction_code, "NATINF 25666");

        let passenger = check_no_lic(Business::Vtc, day(5), false).expect("infraction raised");
        assert_eq!(passenger.sanction_code, "NATINF 23103");

        assert!(check_no_lic(Business::Vtc, day(5), true).is_none());
    }
}
