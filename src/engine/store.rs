//! Durable record of evaluations and violations: computation markers prove a
//! key was evaluated, alerts record the failures still standing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::checks::AlertExtra;
use super::domain::{SubmitterType, UserId};
use super::registry::RegulationCheckType;

/// Unique key of a computation marker: one per user, day, and timeline view.
/// Weekly evaluations use the week's Monday as their day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComputationKey {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub submitter_type: SubmitterType,
}

/// Marker that a (user, day, view) key was evaluated, compliant or not, so
/// "evaluated but clean" is distinguishable from "never evaluated".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulationComputation {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub submitter_type: SubmitterType,
    pub computed_at: DateTime<Utc>,
}

impl RegulationComputation {
    pub fn key(&self) -> ComputationKey {
        ComputationKey {
            user_id: self.user_id,
            day: self.day,
            submitter_type: self.submitter_type,
        }
    }
}

/// Unique key of an alert: at most one per user, day, check, and view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub check_type: RegulationCheckType,
    pub submitter_type: SubmitterType,
}

/// One recorded violation with its typed diagnostic payload. Replaced or
/// deleted by reconciliation, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryAlert {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub check_type: RegulationCheckType,
    pub submitter_type: SubmitterType,
    pub extra: AlertExtra,
}

impl RegulatoryAlert {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            user_id: self.user_id,
            day: self.day,
            check_type: self.check_type,
            submitter_type: self.submitter_type,
        }
    }

    /// The open JSON form of the diagnostic payload, for API consumers.
    pub fn extra_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.extra).unwrap_or(serde_json::Value::Null)
    }
}

/// Storage failures surfaced by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for computation markers and alerts, with
/// upsert-on-conflict semantics on their unique keys.
pub trait RegulationStore: Send + Sync {
    fn upsert_computation(&self, computation: RegulationComputation) -> Result<(), StoreError>;
    fn upsert_alert(&self, alert: RegulatoryAlert) -> Result<(), StoreError>;
    /// Deleting an absent alert is a no-op.
    fn delete_alert(&self, key: &AlertKey) -> Result<(), StoreError>;
    fn computation_exists(&self, key: &ComputationKey) -> Result<bool, StoreError>;
    fn computations_between(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RegulationComputation>, StoreError>;
    fn alert(&self, key: &AlertKey) -> Result<Option<RegulatoryAlert>, StoreError>;
    /// Alerts standing on one day key, across both timeline views.
    fn alerts_for_day(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<Vec<RegulatoryAlert>, StoreError>;
    fn alerts_for_user(
        &self,
        user_id: UserId,
        submitter_type: SubmitterType,
    ) -> Result<Vec<RegulatoryAlert>, StoreError>;
}

/// Per-month violation counts across a set of alerts. A break alert with
/// both sub-flags raised counts twice.
pub fn monthly_alert_summary(alerts: &[RegulatoryAlert]) -> BTreeMap<(i32, u32), u32> {
    let mut summary = BTreeMap::new();
    for alert in alerts {
        let month = (alert.day.year(), alert.day.month());
        *summary.entry(month).or_insert(0) += alert.extra.violation_count();
    }
    summary
}

/// Mutex-guarded maps keyed by the unique constraints, so the engine can be
/// exercised without a database.
#[derive(Default, Clone)]
pub struct InMemoryRegulationStore {
    computations: Arc<Mutex<BTreeMap<ComputationKey, RegulationComputation>>>,
    alerts: Arc<Mutex<BTreeMap<AlertKey, RegulatoryAlert>>>,
}

impl InMemoryRegulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

fn poisoned(which: &str) -> StoreError {
    StoreError::Unavailable(format!("{which} mutex poisoned"))
}

impl RegulationStore for InMemoryRegulationStore {
    fn upsert_computation(&self, computation: RegulationComputation) -> Result<(), StoreError> {
        let mut guard = self
            .computations
            .lock()
            .map_err(|_| poisoned("computation"))?;
        guard.insert(computation.key(), computation);
        Ok(())
    }

    fn upsert_alert(&self, alert: RegulatoryAlert) -> Result<(), StoreError> {
        let mut guard = self.alerts.lock().map_err(|_| poisoned("alert"))?;
        guard.insert(alert.key(), alert);
        Ok(())
    }

    fn delete_alert(&self, key: &AlertKey) -> Result<(), StoreError> {
        let mut guard = self.alerts.lock().map_err(|_| poisoned("alert"))?;
        guard.remove(key);
        Ok(())
    }

    fn computation_exists(&self, key: &ComputationKey) -> Result<bool, StoreError> {
        let guard = self
            .computations
            .lock()
            .map_err(|_| poisoned("computation"))?;
        Ok(guard.contains_key(key))
    }

    fn computations_between(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RegulationComputation>, StoreError> {
        let guard = self
            .computations
            .lock()
            .map_err(|_| poisoned("computation"))?;
        Ok(guard
            .values()
            .filter(|computation| computation.user_id == user_id)
            .filter(|computation| computation.day >= start && computation.day <= end)
            .cloned()
            .collect())
    }

    fn alert(&self, key: &AlertKey) -> Result<Option<RegulatoryAlert>, StoreError> {
        let guard = self.alerts.lock().map_err(|_| poisoned("alert"))?;
        Ok(guard.get(key).cloned())
    }

    fn alerts_for_day(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<Vec<RegulatoryAlert>, StoreError> {
        let guard = self.alerts.lock().map_err(|_| poisoned("alert"))?;
        Ok(guard
            .values()
            .filter(|alert| alert.user_id == user_id && alert.day == day)
            .cloned()
            .collect())
    }

    fn alerts_for_user(
        &self,
        user_id: UserId,
        submitter_type: SubmitterType,
    ) -> Result<Vec<RegulatoryAlert>, StoreError> {
        let guard = self.alerts.lock().map_err(|_| poisoned("alert"))?;
        Ok(guard
            .values()
            .filter(|alert| alert.user_id == user_id && alert.submitter_type == submitter_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::checks::{sanction, EnoughBreakExtra, WorkedDaysExtra};
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, d).expect("valid date")
    }

    fn computation(d: u32, submitter_type: SubmitterType) -> RegulationComputation {
        RegulationComputation {
            user_id: UserId(1),
            day: date(d),
            submitter_type,
            computed_at: Utc.with_ymd_and_hms(2024, 8, d, 12, 0, 0).single().expect("valid"),
        }
    }

    fn break_alert(d: u32, both_flags: bool) -> RegulatoryAlert {
        RegulatoryAlert {
            user_id: UserId(1),
            day: date(d),
            check_type: RegulationCheckType::EnoughBreak,
            submitter_type: SubmitterType::Employee,
            extra: AlertExtra::EnoughBreak(EnoughBreakExtra {
                not_enough_break: true,
                too_much_uninterrupted_work_time: both_flags,
                total_work_s: 7 * 3600,
                total_break_s: 900,
                required_break_min: 30,
                longest_uninterrupted_s: 7 * 3600,
                max_uninterrupted_hours: 6,
                sanction_code: sanction::ENOUGH_BREAK.to_string(),
            }),
        }
    }

    #[test]
    fn computation_upsert_is_idempotent() {
        let store = InMemoryRegulationStore::new();
        store
            .upsert_computation(computation(5, SubmitterType::Employee))
            .expect("upsert");
        store
            .upsert_computation(computation(5, SubmitterType::Employee))
            .expect("second upsert");

        let rows = store
            .computations_between(UserId(1), date(1), date(31))
            .expect("query");
        assert_eq!(rows.len(), 1);

        // The admin view is a distinct key.
        store
            .upsert_computation(computation(5, SubmitterType::Admin))
            .expect("admin upsert");
        assert_eq!(
            store
                .computations_between(UserId(1), date(1), date(31))
                .expect("query")
                .len(),
            2
        );
    }

    #[test]
    fn alert_upsert_replaces_payload_for_same_key() {
        let store = InMemoryRegulationStore::new();
        store.upsert_alert(break_alert(5, false)).expect("upsert");
        store.upsert_alert(break_alert(5, true)).expect("replace");

        assert_eq!(store.alert_count(), 1);
        let stored = store
            .alert(&break_alert(5, true).key())
            .expect("query")
            .expect("present");
        match stored.extra {
            AlertExtra::EnoughBreak(extra) => assert!(extra.too_much_uninterrupted_work_time),
            other => panic!("unexpected payload {other:?}"),
        }

        assert_eq!(store.alerts_for_day(UserId(1), date(5)).expect("query").len(), 1);
        assert!(store.alerts_for_day(UserId(1), date(6)).expect("query").is_empty());
    }

    #[test]
    fn delete_missing_alert_is_a_noop() {
        let store = InMemoryRegulationStore::new();
        store
            .delete_alert(&break_alert(5, false).key())
            .expect("delete succeeds");
    }

    #[test]
    fn monthly_summary_double_counts_dual_break_flags() {
        let july_alert = RegulatoryAlert {
            user_id: UserId(1),
            day: NaiveDate::from_ymd_opt(2024, 7, 29).expect("valid"),
            check_type: RegulationCheckType::MaximumWorkedDaysInWeek,
            submitter_type: SubmitterType::Employee,
            extra: AlertExtra::WorkedDays(WorkedDaysExtra {
                worked_days: 7,
                max_worked_days: 6,
                sanction_code: sanction::MAXIMUM_WORKED_DAYS_IN_WEEK.to_string(),
            }),
        };

        let summary = monthly_alert_summary(&[
            break_alert(5, true),
            break_alert(12, false),
            july_alert,
        ]);
        assert_eq!(summary.get(&(2024, 8)), Some(&3));
        assert_eq!(summary.get(&(2024, 7)), Some(&1));
    }
}
