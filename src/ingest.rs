//! CSV ingestion of activity logs for the audit CLI. Each row is one
//! activity; the `view` column routes it into the employee timeline, the
//! admin timeline, or both.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::engine::{
    Activity, ActivityId, ActivityType, MissionId, Submitter, SubmitterType, UserId,
};

/// One parsed activity with the timeline views it belongs to.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub views: Vec<SubmitterType>,
    pub activity: Activity,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: unknown activity type '{value}'")]
    UnknownActivityType { row: usize, value: String },
    #[error("row {row}: unknown submitter type '{value}'")]
    UnknownSubmitterType { row: usize, value: String },
    #[error("row {row}: unknown view '{value}' (expected employee, admin, or both)")]
    UnknownView { row: usize, value: String },
    #[error("row {row}: invalid timestamp '{value}' (expected RFC 3339)")]
    InvalidTimestamp { row: usize, value: String },
}

pub fn parse_activities<R: Read>(reader: R) -> Result<Vec<ActivityEntry>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (index, record) in csv_reader.deserialize::<ActivityRow>().enumerate() {
        let row_number = index + 2; // header occupies the first line
        let row = record?;
        entries.push(row.into_entry(row_number)?);
    }
    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct ActivityRow {
    activity_id: i64,
    mission_id: i64,
    user_id: i64,
    #[serde(rename = "type")]
    activity_type: String,
    submitter_id: i64,
    submitter_kind: String,
    start: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    end: Option<String>,
    #[serde(default)]
    view: Option<String>,
}

impl ActivityRow {
    fn into_entry(self, row: usize) -> Result<ActivityEntry, IngestError> {
        let activity_type = parse_activity_type(&self.activity_type)
            .ok_or_else(|| IngestError::UnknownActivityType {
                row,
                value: self.activity_type.clone(),
            })?;
        let submitter_kind = parse_submitter_type(&self.submitter_kind)
            .ok_or_else(|| IngestError::UnknownSubmitterType {
                row,
                value: self.submitter_kind.clone(),
            })?;
        let views = parse_views(self.view.as_deref(), row)?;

        let start = parse_instant(&self.start).ok_or_else(|| IngestError::InvalidTimestamp {
            row,
            value: self.start.clone(),
        })?;
        let end = match self.end.as_deref() {
            Some(raw) => Some(parse_instant(raw).ok_or_else(|| IngestError::InvalidTimestamp {
                row,
                value: raw.to_string(),
            })?),
            None => None,
        };

        Ok(ActivityEntry {
            views,
            activity: Activity::new(
                ActivityId(self.activity_id),
                MissionId(self.mission_id),
                UserId(self.user_id),
                activity_type,
                Submitter {
                    id: UserId(self.submitter_id),
                    kind: submitter_kind,
                },
                start,
                end,
            ),
        })
    }
}

fn parse_activity_type(value: &str) -> Option<ActivityType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "drive" => Some(ActivityType::Drive),
        "work" => Some(ActivityType::Work),
        "support" => Some(ActivityType::Support),
        "break" => Some(ActivityType::Break),
        "transfer" => Some(ActivityType::Transfer),
        "rest" => Some(ActivityType::Rest),
        _ => None,
    }
}

fn parse_submitter_type(value: &str) -> Option<SubmitterType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "employee" => Some(SubmitterType::Employee),
        "admin" => Some(SubmitterType::Admin),
        _ => None,
    }
}

fn parse_views(value: Option<&str>, row: usize) -> Result<Vec<SubmitterType>, IngestError> {
    match value.map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(SubmitterType::ALL.to_vec()),
        Some(raw) if raw.is_empty() || raw == "both" => Ok(SubmitterType::ALL.to_vec()),
        Some(raw) if raw == "employee" => Ok(vec![SubmitterType::Employee]),
        Some(raw) if raw == "admin" => Ok(vec![SubmitterType::Admin]),
        Some(raw) => Err(IngestError::UnknownView { row, value: raw }),
    }
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|instant| instant.with_timezone(&Utc))
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
