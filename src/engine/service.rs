//! Recompute orchestration: given a period or a set of touched days, re-run
//! the daily and weekly evaluators and reconcile stored alerts and
//! computation markers with the fresh results.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info};

use super::checks::daily::{self, DayContext};
use super::checks::weekly::{self, WeekContext};
use super::checks::{CheckOutcome, CheckResult, NoLicInfraction};
use super::domain::{Activity, ActivitySpan, Business, DayPartition, SubmitterType, UserId};
use super::registry::{CheckRegistry, RegistryError};
use super::store::{
    AlertKey, RegulationComputation, RegulationStore, RegulatoryAlert, StoreError,
};
use super::windows::build_windows;

/// Failures reading the activity timeline.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("activity source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the validated activity timeline for one view of a worker.
/// Which activities belong to the employee or admin view is the logging
/// subsystem's concern; the engine only reads the result.
pub trait ActivitySource: Send + Sync {
    fn activities_between(
        &self,
        user_id: UserId,
        view: SubmitterType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>, SourceError>;
}

/// Error raised by the regulation service. Only misconfiguration and
/// infrastructure failures surface here; violations are data.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Counters describing one recomputation run, for logs and CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputationReport {
    pub days_evaluated: u32,
    pub weeks_evaluated: u32,
    pub alerts_recorded: u32,
    pub alerts_cleared: u32,
}

impl ComputationReport {
    fn absorb(&mut self, other: ComputationReport) {
        self.days_evaluated += other.days_evaluated;
        self.weeks_evaluated += other.weeks_evaluated;
        self.alerts_recorded += other.alerts_recorded;
        self.alerts_cleared += other.alerts_cleared;
    }
}

/// Service composing the activity source, threshold registry, and alert
/// store behind the `compute_regulations` entry point.
pub struct RegulationService<S, A> {
    store: Arc<S>,
    source: Arc<A>,
    registry: Arc<CheckRegistry>,
    partition: DayPartition,
}

impl<S, A> RegulationService<S, A>
where
    S: RegulationStore + 'static,
    A: ActivitySource + 'static,
{
    pub fn new(
        store: Arc<S>,
        source: Arc<A>,
        registry: Arc<CheckRegistry>,
        partition: DayPartition,
    ) -> Self {
        Self {
            store,
            source,
            registry,
            partition,
        }
    }

    pub fn partition(&self) -> &DayPartition {
        &self.partition
    }

    /// Evaluate every day in `[period_start - 1, period_end + 1]` and every
    /// calendar week overlapping that range for one timeline view,
    /// reconciling stored alerts with the fresh results.
    pub fn compute_regulations(
        &self,
        user_id: UserId,
        business: Business,
        period_start: NaiveDate,
        period_end: NaiveDate,
        submitter_type: SubmitterType,
        reference: DateTime<Utc>,
    ) -> Result<ComputationReport, EngineError> {
        let start = period_start - Duration::days(1);
        let end = period_end + Duration::days(1);
        let mut report = ComputationReport::default();

        let mut day = start;
        while day <= end {
            let outcomes = self.evaluate_one_day(user_id, business, day, submitter_type, reference)?;
            let (recorded, cleared) = self.reconcile(user_id, submitter_type, &outcomes)?;
            self.store.upsert_computation(RegulationComputation {
                user_id,
                day,
                submitter_type,
                computed_at: reference,
            })?;
            report.days_evaluated += 1;
            report.alerts_recorded += recorded;
            report.alerts_cleared += cleared;
            debug!(
                user = user_id.0,
                day = %day,
                view = submitter_type.label(),
                recorded,
                cleared,
                "daily regulation checks reconciled"
            );
            day = day + Duration::days(1);
        }

        let mut monday = self.partition.week_monday(start);
        while monday <= end {
            let outcomes =
                self.evaluate_one_week(user_id, business, monday, submitter_type, reference)?;
            let (recorded, cleared) = self.reconcile(user_id, submitter_type, &outcomes)?;
            self.store.upsert_computation(RegulationComputation {
                user_id,
                day: monday,
                submitter_type,
                computed_at: reference,
            })?;
            report.weeks_evaluated += 1;
            report.alerts_recorded += recorded;
            report.alerts_cleared += cleared;
            monday = monday + Duration::days(7);
        }

        info!(
            user = user_id.0,
            view = submitter_type.label(),
            from = %start,
            until = %end,
            days = report.days_evaluated,
            weeks = report.weeks_evaluated,
            recorded = report.alerts_recorded,
            cleared = report.alerts_cleared,
            "regulation recomputation finished"
        );

        Ok(report)
    }

    /// Recompute the minimal range affected by a mutation: the touched days
    /// themselves, widened by one day on each side, for both timeline views.
    pub fn recompute_for_mutation(
        &self,
        user_id: UserId,
        business: Business,
        touched_days: &[NaiveDate],
        reference: DateTime<Utc>,
    ) -> Result<ComputationReport, EngineError> {
        let (Some(&first), Some(&last)) = (touched_days.iter().min(), touched_days.iter().max())
        else {
            return Ok(ComputationReport::default());
        };

        let mut report = ComputationReport::default();
        for submitter_type in SubmitterType::ALL {
            report.absorb(self.compute_regulations(
                user_id,
                business,
                first,
                last,
                submitter_type,
                reference,
            )?);
        }
        Ok(report)
    }

    /// Controller-side no-LIC check for the expected day.
    pub fn check_no_lic(
        &self,
        user_id: UserId,
        business: Business,
        day: NaiveDate,
        view: SubmitterType,
        reference: DateTime<Utc>,
    ) -> Result<Option<NoLicInfraction>, EngineError> {
        let day_start = self.partition.day_start(day);
        let day_end = self.partition.day_end(day);
        let activities = self
            .source
            .activities_between(user_id, view, day_start, day_end)?;
        let has_activity = activities
            .iter()
            .filter_map(|activity| activity.span_at(reference))
            .any(|span| span.start < day_end && span.end > day_start);
        Ok(daily::check_no_lic(business, day, has_activity))
    }

    fn evaluate_one_day(
        &self,
        user_id: UserId,
        business: Business,
        day: NaiveDate,
        view: SubmitterType,
        reference: DateTime<Utc>,
    ) -> Result<Vec<CheckOutcome>, EngineError> {
        let fetch_start = self.partition.day_start(day - Duration::days(1));
        let fetch_end = self.partition.day_start(day + Duration::days(2));
        let activities = self
            .source
            .activities_between(user_id, view, fetch_start, fetch_end)?;
        let windows = build_windows(&activities, day, &self.partition, reference);
        let ctx = DayContext {
            day,
            business,
            windows: &windows,
            partition: &self.partition,
            registry: &self.registry,
        };
        Ok(daily::evaluate_day(&ctx)?)
    }

    fn evaluate_one_week(
        &self,
        user_id: UserId,
        business: Business,
        monday: NaiveDate,
        view: SubmitterType,
        reference: DateTime<Utc>,
    ) -> Result<Vec<CheckOutcome>, EngineError> {
        let week_start = self.partition.day_start(monday);
        let week_end = self.partition.day_start(monday + Duration::days(7));
        let activities = self
            .source
            .activities_between(user_id, view, week_start, week_end)?;
        let spans: Vec<ActivitySpan> = activities
            .iter()
            .filter_map(|activity| activity.span_at(reference))
            .filter(|span| span.start < week_end && span.end > week_start)
            .collect();
        let ctx = WeekContext {
            monday,
            business,
            spans: &spans,
            partition: &self.partition,
            registry: &self.registry,
        };
        Ok(weekly::evaluate_week(&ctx)?)
    }

    /// Apply the reconciliation policy: a fresh failure upserts the alert,
    /// a fresh pass deletes any stale one.
    fn reconcile(
        &self,
        user_id: UserId,
        submitter_type: SubmitterType,
        outcomes: &[CheckOutcome],
    ) -> Result<(u32, u32), EngineError> {
        let mut recorded = 0;
        let mut cleared = 0;
        for outcome in outcomes {
            let key = AlertKey {
                user_id,
                day: outcome.day,
                check_type: outcome.check_type,
                submitter_type,
            };
            match &outcome.result {
                CheckResult::Fail(extra) => {
                    self.store.upsert_alert(RegulatoryAlert {
                        user_id,
                        day: outcome.day,
                        check_type: outcome.check_type,
                        submitter_type,
                        extra: extra.clone(),
                    })?;
                    recorded += 1;
                }
                CheckResult::Pass => {
                    if self.store.alert(&key)?.is_some() {
                        self.store.delete_alert(&key)?;
                        cleared += 1;
                    }
                }
            }
        }
        Ok((recorded, cleared))
    }
}

/// Activity timeline held in memory, tagged per view, so the engine can be
/// driven from tests and the CLI without the logging subsystem.
#[derive(Default, Clone)]
pub struct InMemoryActivityLog {
    entries: Arc<Mutex<BTreeMap<(UserId, SubmitterType), Vec<Activity>>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an activity into the given timeline views.
    pub fn log(&self, views: &[SubmitterType], activity: Activity) {
        if let Ok(mut guard) = self.entries.lock() {
            for view in views {
                guard
                    .entry((activity.user_id, *view))
                    .or_default()
                    .push(activity.clone());
            }
        }
    }

    /// Dismiss an activity in one view only, as an admin correction does.
    pub fn dismiss_in_view(
        &self,
        view: SubmitterType,
        user_id: UserId,
        activity_id: super::domain::ActivityId,
        dismissed_by: super::domain::Submitter,
        reason: &str,
        dismissed_at: DateTime<Utc>,
    ) {
        if let Ok(mut guard) = self.entries.lock() {
            if let Some(activities) = guard.get_mut(&(user_id, view)) {
                for activity in activities.iter_mut() {
                    if activity.id == activity_id {
                        activity.dismiss(dismissed_by, reason, dismissed_at);
                    }
                }
            }
        }
    }

    /// Append a revised time range to an activity in one view.
    pub fn revise_in_view(
        &self,
        view: SubmitterType,
        user_id: UserId,
        activity_id: super::domain::ActivityId,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        recorded_at: DateTime<Utc>,
    ) {
        if let Ok(mut guard) = self.entries.lock() {
            if let Some(activities) = guard.get_mut(&(user_id, view)) {
                for activity in activities.iter_mut() {
                    if activity.id == activity_id {
                        activity.revise(start_time, end_time, recorded_at);
                    }
                }
            }
        }
    }
}

impl ActivitySource for InMemoryActivityLog {
    fn activities_between(
        &self,
        user_id: UserId,
        view: SubmitterType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>, SourceError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| SourceError::Unavailable("activity log mutex poisoned".to_string()))?;
        Ok(guard
            .get(&(user_id, view))
            .map(|activities| {
                activities
                    .iter()
                    .filter(|activity| {
                        activity
                            .span_at(end)
                            .map(|span| span.start < end && span.end > start)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::domain::{ActivityId, ActivityType, MissionId, Submitter};
    use crate::engine::store::InMemoryRegulationStore;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, day, h, m, 0).single().expect("valid instant")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, d).expect("valid date")
    }

    fn service() -> (
        RegulationService<InMemoryRegulationStore, InMemoryActivityLog>,
        Arc<InMemoryRegulationStore>,
        Arc<InMemoryActivityLog>,
    ) {
        let store = Arc::new(InMemoryRegulationStore::new());
        let log = Arc::new(InMemoryActivityLog::new());
        let service = RegulationService::new(
            store.clone(),
            log.clone(),
            Arc::new(CheckRegistry::with_defaults()),
            DayPartition::utc(),
        );
        (service, store, log)
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

    #[test]
    fn empty_mutation_set_is_a_noop() {
        let (service, store, _) = service();
        let report = service
            .recompute_for_mutation(UserId(1), Business::LongHaulFreight, &[], at(10, 0, 0))
            .expect("recompute");
        assert_eq!(report, ComputationReport::default());
        assert_eq!(store.alert_count(), 0);
    }

    #[test]
    fn computation_markers_cover_the_widened_range() {
        let (service, store, log) = service();
        log.log(
            &[SubmitterType::Employee],
            activity(1, ActivityType::Work, at(5, 8, 0), at(5, 12, 0)),
        );

        service
            .compute_regulations(
                UserId(1),
                Business::LongHaulFreight,
                day(5),
                day(5),
                SubmitterType::Employee,
                at(10, 0, 0),
            )
            .expect("compute");

        let computations = store
            .computations_between(UserId(1), day(1), day(12))
            .expect("query");
        let days: Vec<NaiveDate> = computations.iter().map(|c| c.day).collect();
        // Days 4 through 6; the Monday 2024-08-05 weekly marker shares the
        // day-5 key, and the 2024-07-29 one falls outside the query window.
        assert_eq!(days, vec![day(4), day(5), day(6)]);
    }

    #[test]
    fn no_lic_is_raised_only_for_empty_days() {
        let (service, _, log) = service();
        log.log(
            &[SubmitterType::Employee],
            activity(1, ActivityType::Drive, at(5, 8, 0), at(5, 12, 0)),
        );

        let quiet_day = service
            .check_no_lic(
                UserId(1),
                Business::LongHaulFreight,
                day(6),
                SubmitterType::Employee,
                at(10, 0, 0),
            )
            .expect("check");
        assert!(quiet_day.is_some());

        let logged_day = service
            .check_no_lic(
                UserId(1),
                Business::LongHaulFreight,
                day(5),
                SubmitterType::Employee,
                at(10, 0, 0),
            )
            .expect("check");
        assert!(logged_day.is_none());
    }
}
