use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for the worker whose timeline is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Identifier wrapper for a single logged activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub i64);

/// Identifier wrapper for the mission an activity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MissionId(pub i64);

/// Kind of logged activity. Drive, work, and support count toward work time;
/// transfer spans a window without counting as work; rest closes a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Drive,
    Work,
    Support,
    Break,
    Transfer,
    Rest,
}

impl ActivityType {
    /// Whether the activity accrues work duration.
    pub const fn counts_as_work(self) -> bool {
        matches!(self, ActivityType::Drive | ActivityType::Work | ActivityType::Support)
    }

    pub const fn label(self) -> &'static str {
        match self {
            ActivityType::Drive => "drive",
            ActivityType::Work => "work",
            ActivityType::Support => "support",
            ActivityType::Break => "break",
            ActivityType::Transfer => "transfer",
            ActivityType::Rest => "rest",
        }
    }
}

/// Which actor's validated timeline is being evaluated. The employee and
/// admin views of the same worker are computed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitterType {
    Employee,
    Admin,
}

impl SubmitterType {
    pub const fn label(self) -> &'static str {
        match self {
            SubmitterType::Employee => "employee",
            SubmitterType::Admin => "admin",
        }
    }

    pub const ALL: [SubmitterType; 2] = [SubmitterType::Employee, SubmitterType::Admin];
}

/// The actor who recorded or validated an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub id: UserId,
    pub kind: SubmitterType,
}

/// Transport-activity classification driving threshold selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Business {
    LongHaulFreight,
    ShortDistanceFreight,
    PassengerFrequent,
    PassengerOccasional,
    Taxi,
    Vtc,
}

/// Broad transport family, used where sanction codes differ by cargo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Freight,
    Passenger,
}

impl Business {
    pub const fn transport(self) -> TransportKind {
        match self {
            Business::LongHaulFreight | Business::ShortDistanceFreight => TransportKind::Freight,
            Business::PassengerFrequent
            | Business::PassengerOccasional
            | Business::Taxi
            | Business::Vtc => TransportKind::Passenger,
        }
    }

    /// Taxi and chauffeured-transport businesses carry amplitude-dependent
    /// work-day thresholds.
    pub const fn is_t3p(self) -> bool {
        matches!(self, Business::Taxi | Business::Vtc)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Business::LongHaulFreight => "long_haul_freight",
            Business::ShortDistanceFreight => "short_distance_freight",
            Business::PassengerFrequent => "passenger_frequent",
            Business::PassengerOccasional => "passenger_occasional",
            Business::Taxi => "taxi",
            Business::Vtc => "vtc",
        }
    }
}

/// One recorded state of an activity's time range. Activities are never
/// edited in place; a correction appends a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityVersion {
    pub start_time: DateTime<Utc>,
    /// `None` while the activity is still open.
    pub end_time: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

/// Reason attached when an activity is struck from a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dismissal {
    pub dismissed_at: DateTime<Utc>,
    pub dismissed_by: Submitter,
    pub reason: String,
}

/// A worker's logged activity with its full version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub mission_id: MissionId,
    pub user_id: UserId,
    pub activity_type: ActivityType,
    pub submitter: Submitter,
    /// Ordered by `recorded_at`, never empty.
    pub versions: Vec<ActivityVersion>,
    pub dismissal: Option<Dismissal>,
}

impl Activity {
    pub fn new(
        id: ActivityId,
        mission_id: MissionId,
        user_id: UserId,
        activity_type: ActivityType,
        submitter: Submitter,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            mission_id,
            user_id,
            activity_type,
            submitter,
            versions: vec![ActivityVersion {
                start_time,
                end_time,
                recorded_at: start_time,
            }],
            dismissal: None,
        }
    }

    /// Append a corrected time range, superseding earlier versions from
    /// `recorded_at` onward.
    pub fn revise(
        &mut self,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        recorded_at: DateTime<Utc>,
    ) {
        self.versions.push(ActivityVersion {
            start_time,
            end_time,
            recorded_at,
        });
        self.versions.sort_by_key(|version| version.recorded_at);
    }

    pub fn dismiss(&mut self, dismissed_by: Submitter, reason: &str, dismissed_at: DateTime<Utc>) {
        self.dismissal = Some(Dismissal {
            dismissed_at,
            dismissed_by,
            reason: reason.to_string(),
        });
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissal.is_some()
    }

    /// The version in force at `at`: the latest one recorded at or before it.
    /// `None` when the activity had not been recorded yet.
    pub fn effective_version_at(&self, at: DateTime<Utc>) -> Option<&ActivityVersion> {
        self.versions
            .iter()
            .filter(|version| version.recorded_at <= at)
            .max_by_key(|version| version.recorded_at)
    }

    pub fn current_version(&self) -> &ActivityVersion {
        self.versions
            .last()
            .unwrap_or_else(|| unreachable!("activity version history is never empty"))
    }

    /// Concrete `[start, end)` span at `reference`, treating an open end as
    /// running until `reference`. `None` for dismissed or not-yet-recorded
    /// activities, or when the span would be empty.
    pub fn span_at(&self, reference: DateTime<Utc>) -> Option<ActivitySpan> {
        if self.is_dismissed() {
            return None;
        }
        let version = self.effective_version_at(reference)?;
        let end = version.end_time.unwrap_or(reference).min(reference);
        if end <= version.start_time {
            return None;
        }
        Some(ActivitySpan {
            activity_id: self.id,
            activity_type: self.activity_type,
            submitter: self.submitter,
            start: version.start_time,
            end,
        })
    }
}

/// Resolved, closed time span of one activity, the unit the window builder
/// and the duration checks walk over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySpan {
    pub activity_id: ActivityId,
    pub activity_type: ActivityType,
    pub submitter: Submitter,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActivitySpan {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Portion of the span inside `[from, until)`.
    pub fn overlap(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Duration {
        let start = self.start.max(from);
        let end = self.end.min(until);
        if end > start {
            end - start
        } else {
            Duration::zero()
        }
    }
}

/// Timezone-aware calendar partitioning: which local day an instant belongs
/// to, day and week boundaries, and the local night window used for
/// night-work clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPartition {
    offset: FixedOffset,
    night_start: NaiveTime,
    night_end: NaiveTime,
}

impl DayPartition {
    pub fn new(offset: FixedOffset, night_start: NaiveTime, night_end: NaiveTime) -> Self {
        Self {
            offset,
            night_start,
            night_end,
        }
    }

    /// UTC with the default 21:00-05:00 night window.
    pub fn utc() -> Self {
        Self::with_offset(Utc.fix())
    }

    /// Fixed local offset with the default 21:00-05:00 night window.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset,
            night_start: NaiveTime::MIN + Duration::hours(21),
            night_end: NaiveTime::MIN + Duration::hours(5),
        }
    }

    /// `None` when the offset is out of chrono's accepted range.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes * 60).map(Self::with_offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar day containing `instant`.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Instant at which the local day `date` begins.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let utc_naive = local_midnight - Duration::seconds(self.offset.local_minus_utc() as i64);
        Utc.from_utc_datetime(&utc_naive)
    }

    pub fn day_end(&self, date: NaiveDate) -> DateTime<Utc> {
        self.day_start(date) + Duration::days(1)
    }

    /// Monday of the calendar week containing `date`.
    pub fn week_monday(&self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(date.weekday().num_days_from_monday() as i64)
    }

    /// Portion of `[start, end)` falling inside the local night window,
    /// across however many days the span covers.
    pub fn night_overlap(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
        if end <= start {
            return Duration::zero();
        }

        let mut total = Duration::zero();
        let mut day = self.day_of(start) - Duration::days(1);
        let last_day = self.day_of(end);
        while day <= last_day {
            for (from, until) in self.night_intervals(day) {
                let overlap_start = start.max(from);
                let overlap_end = end.min(until);
                if overlap_end > overlap_start {
                    total = total + (overlap_end - overlap_start);
                }
            }
            day = day + Duration::days(1);
        }
        total
    }

    /// Night coverage anchored on local day `date`. With the default window
    /// this is `[21:00 day, 05:00 day+1)`; a window that does not cross
    /// midnight yields a single interval.
    fn night_intervals(&self, date: NaiveDate) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let day_start = self.day_start(date);
        let since_midnight = |time: NaiveTime| {
            Duration::seconds(time.signed_duration_since(NaiveTime::MIN).num_seconds())
        };

        if self.night_end <= self.night_start {
            vec![(
                day_start + since_midnight(self.night_start),
                day_start + Duration::days(1) + since_midnight(self.night_end),
            )]
        } else {
            vec![(
                day_start + since_midnight(self.night_start),
                day_start + since_midnight(self.night_end),
            )]
        }
    }
}

/// Per-activity-type duration breakdown carried on a work window.
pub type DurationByType = BTreeMap<ActivityType, Duration>;
