//! Regulation computation engine: work-window construction, daily and
//! weekly checks, threshold resolution, and recompute orchestration over the
//! alert/computation store.

pub mod checks;
pub mod domain;
pub mod registry;
pub mod service;
pub mod store;
pub mod windows;

pub use checks::{
    daily::{check_no_lic, evaluate_day, DayContext},
    weekly::{evaluate_week, WeekContext},
    AlertExtra, CheckOutcome, CheckResult, DailyRestExtra, EnoughBreakExtra, NoLicInfraction,
    SanctionCode, WeeklyRestExtra, WeeklyWorkExtra, WorkDayTimeExtra, WorkedDaysExtra,
};
pub use domain::{
    Activity, ActivityId, ActivitySpan, ActivityType, ActivityVersion, Business, DayPartition,
    Dismissal, MissionId, Submitter, SubmitterType, TransportKind, UserId,
};
pub use registry::{
    AmplitudeBucket, BreakTier, CheckRegistry, CheckUnit, CheckVariables, RegistryError,
    RegulationCheck, RegulationCheckType,
};
pub use service::{
    ActivitySource, ComputationReport, EngineError, InMemoryActivityLog, RegulationService,
    SourceError,
};
pub use store::{
    monthly_alert_summary, AlertKey, ComputationKey, InMemoryRegulationStore,
    RegulationComputation, RegulationStore, RegulatoryAlert, StoreError,
};
pub use windows::{build_windows, WorkWindow};
