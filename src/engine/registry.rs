//! Threshold resolution: which variable set applies for a check type,
//! business, and target date. Rows are seeded externally; the registry is an
//! explicit value passed into every evaluation, never ambient state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::Business;

/// Named regulatory check. Each type evaluates at a fixed granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationCheckType {
    MinimumDailyRest,
    MaximumWorkDayTime,
    EnoughBreak,
    NoLic,
    MaximumWorkedDaysInWeek,
    MinimumWeeklyRest,
    MaximumWorkInCalendarWeek,
}

/// Granularity a check evaluates and records alerts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckUnit {
    Day,
    Week,
}

impl RegulationCheckType {
    pub const fn unit(self) -> CheckUnit {
        match self {
            RegulationCheckType::MinimumDailyRest
            | RegulationCheckType::MaximumWorkDayTime
            | RegulationCheckType::EnoughBreak
            | RegulationCheckType::NoLic => CheckUnit::Day,
            RegulationCheckType::MaximumWorkedDaysInWeek
            | RegulationCheckType::MinimumWeeklyRest
            | RegulationCheckType::MaximumWorkInCalendarWeek => CheckUnit::Week,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            RegulationCheckType::MinimumDailyRest => "minimum_daily_rest",
            RegulationCheckType::MaximumWorkDayTime => "maximum_work_day_time",
            RegulationCheckType::EnoughBreak => "enough_break",
            RegulationCheckType::NoLic => "no_lic",
            RegulationCheckType::MaximumWorkedDaysInWeek => "maximum_worked_days_in_week",
            RegulationCheckType::MinimumWeeklyRest => "minimum_weekly_rest",
            RegulationCheckType::MaximumWorkInCalendarWeek => "maximum_work_in_calendar_week",
        }
    }

    /// Daily checks the reconciler persists alerts for. `NoLic` is
    /// controller-side only and deliberately absent.
    pub const DAILY_PERSISTED: [RegulationCheckType; 3] = [
        RegulationCheckType::MinimumDailyRest,
        RegulationCheckType::MaximumWorkDayTime,
        RegulationCheckType::EnoughBreak,
    ];

    pub const WEEKLY: [RegulationCheckType; 3] = [
        RegulationCheckType::MaximumWorkedDaysInWeek,
        RegulationCheckType::MinimumWeeklyRest,
        RegulationCheckType::MaximumWorkInCalendarWeek,
    ];
}

/// Work-day threshold override keyed by shift amplitude, used by taxi/VTC
/// businesses: the tightest bucket whose floor the amplitude exceeds wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmplitudeBucket {
    pub amplitude_above_hours: u32,
    pub max_work_hours: u32,
}

/// Break requirement tier: total work beyond the floor requires at least the
/// given cumulative break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakTier {
    pub work_above_hours: u32,
    pub required_break_minutes: u32,
}

/// Typed threshold set for one check row. Serializes to an open JSON payload
/// at the storage boundary while keeping each shape statically known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum CheckVariables {
    DailyRest {
        min_daily_break_hours: u32,
    },
    WorkDayTime {
        max_day_hours: u32,
        max_night_hours: u32,
        amplitude_buckets: Vec<AmplitudeBucket>,
    },
    EnoughBreak {
        tiers: Vec<BreakTier>,
        min_qualifying_break_minutes: u32,
        max_uninterrupted_hours: u32,
    },
    NoLic,
    WorkedDays {
        max_worked_days: u32,
    },
    WeeklyRest {
        min_weekly_rest_hours: u32,
    },
    WeeklyWork {
        max_week_hours: u32,
        tolerance_hours: u32,
    },
}

/// One seeded threshold row. Multiple rows may exist per check type; the
/// latest applicable row for a target date is authoritative, with
/// business-scoped rows preferred over generic ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulationCheck {
    pub check_type: RegulationCheckType,
    pub date_application_start: NaiveDate,
    pub date_application_end: Option<NaiveDate>,
    pub business_scope: Option<Business>,
    pub variables: CheckVariables,
}

impl RegulationCheck {
    fn applies_on(&self, target_date: NaiveDate) -> bool {
        self.date_application_start <= target_date
            && self
                .date_application_end
                .map(|end| end > target_date)
                .unwrap_or(true)
    }

    fn scoped_to(&self, business: Business) -> bool {
        self.business_scope.map(|scope| scope == business).unwrap_or(true)
    }
}

/// Missing or malformed threshold configuration. Always fatal: a missing
/// threshold must never read as "compliant".
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no applicable {0:?} threshold row for {1}")]
    MissingCheck(RegulationCheckType, NaiveDate),
    #[error("threshold row for {0:?} carries variables of the wrong shape")]
    VariableShape(RegulationCheckType),
}

/// In-memory view of the seeded regulation-check rows.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    rows: Vec<RegulationCheck>,
}

impl CheckRegistry {
    pub fn new(rows: Vec<RegulationCheck>) -> Self {
        Self { rows }
    }

    pub fn insert(&mut self, row: RegulationCheck) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[RegulationCheck] {
        &self.rows
    }

    /// The authoritative row for a check type, business, and target date:
    /// among applicable rows, business-scoped ones win over generic ones,
    /// then the latest `date_application_start` wins.
    pub fn resolve(
        &self,
        check_type: RegulationCheckType,
        business: Business,
        target_date: NaiveDate,
    ) -> Result<&RegulationCheck, RegistryError> {
        self.rows
            .iter()
            .filter(|row| row.check_type == check_type)
            .filter(|row| row.applies_on(target_date))
            .filter(|row| row.scoped_to(business))
            .max_by_key(|row| (row.business_scope.is_some(), row.date_application_start))
            .ok_or(RegistryError::MissingCheck(check_type, target_date))
    }

    /// Registry seeded with the documented default thresholds, applicable
    /// from the epoch of the regulation data set.
    pub fn with_defaults() -> Self {
        let start = NaiveDate::from_ymd_opt(2019, 11, 1).unwrap_or(NaiveDate::MIN);
        let open = |check_type, business_scope, variables| RegulationCheck {
            check_type,
            date_application_start: start,
            date_application_end: None,
            business_scope,
            variables,
        };

        let mut rows = vec![
            open(
                RegulationCheckType::MinimumDailyRest,
                None,
                CheckVariables::DailyRest {
                    min_daily_break_hours: 10,
                },
            ),
            open(
                RegulationCheckType::MaximumWorkDayTime,
                None,
                CheckVariables::WorkDayTime {
                    max_day_hours: 12,
                    max_night_hours: 10,
                    amplitude_buckets: Vec::new(),
                },
            ),
            open(
                RegulationCheckType::EnoughBreak,
                None,
                CheckVariables::EnoughBreak {
                    tiers: vec![
                        BreakTier {
                            work_above_hours: 6,
                            required_break_minutes: 30,
                        },
                        BreakTier {
                            work_above_hours: 9,
                            required_break_minutes: 45,
                        },
                    ],
                    min_qualifying_break_minutes: 15,
                    max_uninterrupted_hours: 6,
                },
            ),
            open(RegulationCheckType::NoLic, None, CheckVariables::NoLic),
            open(
                RegulationCheckType::MaximumWorkedDaysInWeek,
                None,
                CheckVariables::WorkedDays { max_worked_days: 6 },
            ),
            open(
                RegulationCheckType::MinimumWeeklyRest,
                None,
                CheckVariables::WeeklyRest {
                    min_weekly_rest_hours: 34,
                },
            ),
            open(
                RegulationCheckType::MaximumWorkInCalendarWeek,
                None,
                CheckVariables::WeeklyWork {
                    max_week_hours: 48,
                    tolerance_hours: 0,
                },
            ),
            open(
                RegulationCheckType::MaximumWorkInCalendarWeek,
                Some(Business::ShortDistanceFreight),
                CheckVariables::WeeklyWork {
                    max_week_hours: 52,
                    tolerance_hours: 0,
                },
            ),
        ];

        for business in [Business::Taxi, Business::Vtc] {
            rows.push(open(
                RegulationCheckType::MaximumWorkDayTime,
                Some(business),
                CheckVariables::WorkDayTime {
                    max_day_hours: 12,
                    max_night_hours: 10,
                    amplitude_buckets: vec![
                        AmplitudeBucket {
                            amplitude_above_hours: 12,
                            max_work_hours: 10,
                        },
                        AmplitudeBucket {
                            amplitude_above_hours: 15,
                            max_work_hours: 9,
                        },
                    ],
                },
            ));
        }

        Self::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn defaults_resolve_for_every_check_type() {
        let registry = CheckRegistry::with_defaults();
        let target = date(2024, 8, 5);
        for check_type in [
            RegulationCheckType::MinimumDailyRest,
            RegulationCheckType::MaximumWorkDayTime,
            RegulationCheckType::EnoughBreak,
            RegulationCheckType::NoLic,
            RegulationCheckType::MaximumWorkedDaysInWeek,
            RegulationCheckType::MinimumWeeklyRest,
            RegulationCheckType::MaximumWorkInCalendarWeek,
        ] {
            registry
                .resolve(check_type, Business::LongHaulFreight, target)
                .expect("default row resolves");
        }
    }

    #[test]
    fn business_scoped_row_wins_over_generic() {
        let registry = CheckRegistry::with_defaults();
        let row = registry
            .resolve(
                RegulationCheckType::MaximumWorkInCalendarWeek,
                Business::ShortDistanceFreight,
                date(2024, 8, 5),
            )
            .expect("row resolves");
        assert!(matches!(
            row.variables,
            CheckVariables::WeeklyWork {
                max_week_hours: 52,
                ..
            }
        ));

        let generic = registry
            .resolve(
                RegulationCheckType::MaximumWorkInCalendarWeek,
                Business::LongHaulFreight,
                date(2024, 8, 5),
            )
            .expect("row resolves");
        assert!(matches!(
            generic.variables,
            CheckVariables::WeeklyWork {
                max_week_hours: 48,
                ..
            }
        ));
    }

    #[test]
    fn latest_applicable_row_is_authoritative() {
        let mut registry = CheckRegistry::with_defaults();
        registry.insert(RegulationCheck {
            check_type: RegulationCheckType::MinimumDailyRest,
            date_application_start: date(2023, 1, 1),
            date_application_end: None,
            business_scope: None,
            variables: CheckVariables::DailyRest {
                min_daily_break_hours: 11,
            },
        });

        let row = registry
            .resolve(
                RegulationCheckType::MinimumDailyRest,
                Business::LongHaulFreight,
                date(2024, 8, 5),
            )
            .expect("row resolves");
        assert!(matches!(
            row.variables,
            CheckVariables::DailyRest {
                min_daily_break_hours: 11
            }
        ));

        // Before the newer row's application window the older row still wins.
        let older = registry
            .resolve(
                RegulationCheckType::MinimumDailyRest,
                Business::LongHaulFreight,
                date(2022, 6, 1),
            )
            .expect("row resolves");
        assert!(matches!(
            older.variables,
            CheckVariables::DailyRest {
                min_daily_break_hours: 10
            }
        ));
    }

    #[test]
    fn closed_application_window_is_excluded() {
        let mut registry = CheckRegistry::default();
        registry.insert(RegulationCheck {
            check_type: RegulationCheckType::MinimumDailyRest,
            date_application_start: date(2020, 1, 1),
            date_application_end: Some(date(2021, 1, 1)),
            business_scope: None,
            variables: CheckVariables::DailyRest {
                min_daily_break_hours: 10,
            },
        });

        assert!(matches!(
            registry.resolve(
                RegulationCheckType::MinimumDailyRest,
                Business::Taxi,
                date(2024, 8, 5),
            ),
            Err(RegistryError::MissingCheck(..))
        ));
    }
}
