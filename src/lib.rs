//! haulcheck evaluates a mobile worker's chronological activity log against
//! labor-regulation thresholds and maintains an idempotent, queryable record
//! of compliance results and violations per day and calendar week, computed
//! separately for the employee-submitted and admin-validated timelines.

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod telemetry;
