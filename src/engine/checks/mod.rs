//! Regulatory checks: shared outcome types, tagged diagnostic payloads, and
//! the daily/weekly evaluators.

pub mod daily;
pub mod weekly;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::registry::RegulationCheckType;

/// Stable legal-citation reference attached to a violation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SanctionCode(pub &'static str);

impl std::fmt::Display for SanctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

pub mod sanction {
    use super::SanctionCode;

    pub const MINIMUM_DAILY_REST: SanctionCode = SanctionCode("NATINF 20525");
    pub const MAXIMUM_WORK_DAY_TIME: SanctionCode = SanctionCode("NATINF 11292");
    pub const MAXIMUM_WORK_NIGHT_TIME: SanctionCode = SanctionCode("NATINF 32083");
    pub const ENOUGH_BREAK: SanctionCode = SanctionCode("NATINF 11227");
    pub const MAXIMUM_WORKED_DAYS_IN_WEEK: SanctionCode = SanctionCode("NATINF 13152");
    pub const MINIMUM_WEEKLY_REST: SanctionCode = SanctionCode("NATINF 13153");
    pub const MAXIMUM_WORK_IN_CALENDAR_WEEK: SanctionCode = SanctionCode("NATINF 13155");
    pub const NO_LIC_FREIGHT: SanctionCode = SanctionCode("NATINF 25666");
    pub const NO_LIC_PASSENGER: SanctionCode = SanctionCode("NATINF 23103");
}

/// Diagnostic payload of a minimum-daily-rest breach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRestExtra {
    pub breach_start: DateTime<Utc>,
    pub breach_end: DateTime<Utc>,
    pub total_work_s: i64,
    pub min_daily_break_hours: u32,
    pub sanction_code: String,
}

/// Diagnostic payload of a max-work-day-time breach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDayTimeExtra {
    pub breach_start: DateTime<Utc>,
    pub breach_end: DateTime<Utc>,
    pub work_duration_s: i64,
    pub night_work: bool,
    pub max_work_day_hours: u32,
    pub sanction_code: String,
}

/// Diagnostic payload of the combined break check. Both sub-flags may be
/// true at once; summaries count them as two violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnoughBreakExtra {
    pub not_enough_break: bool,
    pub too_much_uninterrupted_work_time: bool,
    pub total_work_s: i64,
    pub total_break_s: i64,
    pub required_break_min: u32,
    pub longest_uninterrupted_s: i64,
    pub max_uninterrupted_hours: u32,
    pub sanction_code: String,
}

/// Diagnostic payload of a max-worked-days breach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkedDaysExtra {
    pub worked_days: u32,
    pub max_worked_days: u32,
    pub sanction_code: String,
}

/// Diagnostic payload of a weekly-rest breach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRestExtra {
    pub rest_duration_s: i64,
    pub min_weekly_rest_hours: u32,
    pub sanction_code: String,
}

/// Diagnostic payload of a weekly work-hours breach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyWorkExtra {
    pub work_duration_s: i64,
    pub max_week_hours: u32,
    pub sanction_code: String,
}

/// Tagged diagnostic payload carried on a stored alert. Each check's shape
/// is statically known; the store serializes the whole enum to JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AlertExtra {
    DailyRest(DailyRestExtra),
    WorkDayTime(WorkDayTimeExtra),
    EnoughBreak(EnoughBreakExtra),
    WorkedDays(WorkedDaysExtra),
    WeeklyRest(WeeklyRestExtra),
    WeeklyWork(WeeklyWorkExtra),
}

impl AlertExtra {
    pub fn check_type(&self) -> RegulationCheckType {
        match self {
            AlertExtra::DailyRest(_) => RegulationCheckType::MinimumDailyRest,
            AlertExtra::WorkDayTime(_) => RegulationCheckType::MaximumWorkDayTime,
            AlertExtra::EnoughBreak(_) => RegulationCheckType::EnoughBreak,
            AlertExtra::WorkedDays(_) => RegulationCheckType::MaximumWorkedDaysInWeek,
            AlertExtra::WeeklyRest(_) => RegulationCheckType::MinimumWeeklyRest,
            AlertExtra::WeeklyWork(_) => RegulationCheckType::MaximumWorkInCalendarWeek,
        }
    }

    /// How many violations the alert counts as in summary aggregations: the
    /// break check counts each raised sub-flag separately.
    pub fn violation_count(&self) -> u32 {
        match self {
            AlertExtra::EnoughBreak(extra) => {
                u32::from(extra.not_enough_break)
                    + u32::from(extra.too_much_uninterrupted_work_time)
            }
            _ => 1,
        }
    }
}

/// Result of one check over one day or week. Weekly outcomes carry the
/// week's Monday as their day key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub check_type: RegulationCheckType,
    pub day: NaiveDate,
    pub result: CheckResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Pass,
    Fail(AlertExtra),
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.result, CheckResult::Fail(_))
    }
}

/// Controller-side infraction raised when the expected day carries no logged
/// activity. Reported at control time, never stored as a regulatory alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoLicInfraction {
    pub day: NaiveDate,
    pub sanction_code: String,
}
