//! Work-window construction: merging a worker's raw activities into ordered,
//! non-overlapping spans bounded by rest events or submitter changes.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::domain::{
    Activity, ActivityId, ActivitySpan, ActivityType, DayPartition, DurationByType,
};

/// Maximal contiguous span of non-dismissed activities, with the aggregates
/// the daily and weekly checks consume. Derived on every evaluation, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub activity_ids: Vec<ActivityId>,
    /// Ordered spans contributing to the window; the duration checks walk
    /// these directly.
    pub spans: Vec<ActivitySpan>,
    pub total_work: Duration,
    pub night_work: Duration,
    pub by_type: DurationByType,
}

impl WorkWindow {
    /// Elapsed time from the window's first to last activity.
    pub fn amplitude(&self) -> Duration {
        self.end - self.start
    }

    /// Whether the window's span intersects the local calendar day.
    pub fn touches(&self, day: NaiveDate, partition: &DayPartition) -> bool {
        let day_start = partition.day_start(day);
        let day_end = partition.day_end(day);
        self.start < day_end && self.end > day_start
    }

    /// Work duration clipped to the local calendar day. The whole window
    /// stays visible to look-back checks; only this portion counts toward
    /// the day's totals.
    pub fn work_within(&self, day: NaiveDate, partition: &DayPartition) -> Duration {
        let day_start = partition.day_start(day);
        let day_end = partition.day_end(day);
        self.spans
            .iter()
            .filter(|span| span.activity_type.counts_as_work())
            .fold(Duration::zero(), |acc, span| {
                acc + span.overlap(day_start, day_end)
            })
    }

    fn from_spans(spans: Vec<ActivitySpan>, partition: &DayPartition) -> Option<Self> {
        let first = spans.first()?;
        let start = first.start;
        let end = spans.iter().map(|span| span.end).max()?;

        let mut total_work = Duration::zero();
        let mut night_work = Duration::zero();
        let mut by_type = DurationByType::new();
        let mut activity_ids = Vec::with_capacity(spans.len());

        for span in &spans {
            activity_ids.push(span.activity_id);
            let duration = span.duration();
            let by_type_entry = by_type.entry(span.activity_type).or_insert_with(Duration::zero);
            *by_type_entry = *by_type_entry + duration;
            if span.activity_type.counts_as_work() {
                total_work = total_work + duration;
                night_work = night_work + partition.night_overlap(span.start, span.end);
            }
        }

        Some(Self {
            start,
            end,
            activity_ids,
            spans,
            total_work,
            night_work,
            by_type,
        })
    }
}

/// Build the work windows for the three-day range `[target_day - 1,
/// target_day + 2)` around `target_day`. Open-ended activities run until
/// `reference`. The caller filters with [`WorkWindow::touches`] when only
/// the target day matters.
pub fn build_windows(
    activities: &[Activity],
    target_day: NaiveDate,
    partition: &DayPartition,
    reference: DateTime<Utc>,
) -> Vec<WorkWindow> {
    let range_start = partition.day_start(target_day - Duration::days(1));
    let range_end = partition.day_start(target_day + Duration::days(2));

    let mut spans: Vec<ActivitySpan> = activities
        .iter()
        .filter_map(|activity| activity.span_at(reference))
        .filter(|span| span.start < range_end && span.end > range_start)
        .collect();
    spans.sort_by_key(|span| (span.start, span.activity_id));

    let mut windows = Vec::new();
    let mut current: Vec<ActivitySpan> = Vec::new();

    for span in spans {
        if span.activity_type == ActivityType::Rest {
            // Rest bounds the window and contributes nothing to it.
            if let Some(window) = WorkWindow::from_spans(std::mem::take(&mut current), partition) {
                windows.push(window);
            }
            continue;
        }

        let submitter_changed = current
            .last()
            .map(|previous| previous.submitter.id != span.submitter.id)
            .unwrap_or(false);
        if submitter_changed {
            if let Some(window) = WorkWindow::from_spans(std::mem::take(&mut current), partition) {
                windows.push(window);
            }
        }

        current.push(span);
    }

    if let Some(window) = WorkWindow::from_spans(current, partition) {
        windows.push(window);
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::domain::{MissionId, Submitter, SubmitterType, UserId};
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
        end: Option<DateTime<Utc>>,
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
            end,
        )
    }

    #[test]
    fn rest_splits_windows() {
        let activities = vec![
            activity(1, ActivityType::Drive, at(5, 8, 0), Some(at(5, 12, 0))),
            activity(2, ActivityType::Rest, at(5, 12, 0), Some(at(5, 22, 0))),
            activity(3, ActivityType::Work, at(5, 22, 0), Some(at(5, 23, 0))),
        ];

        let windows = build_windows(&activities, day(5), &DayPartition::utc(), at(6, 0, 0));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].total_work, Duration::hours(4));
        assert_eq!(windows[1].total_work, Duration::hours(1));
        assert!(windows.iter().all(|window| !window
            .activity_ids
            .contains(&ActivityId(2))));
    }

    #[test]
    fn submitter_change_splits_windows() {
        let mut second = activity(2, ActivityType::Work, at(5, 10, 0), Some(at(5, 11, 0)));
        second.submitter = Submitter {
            id: UserId(42),
            kind: SubmitterType::Admin,
        };
        let activities = vec![
            activity(1, ActivityType::Drive, at(5, 8, 0), Some(at(5, 10, 0))),
            second,
        ];

        let windows = build_windows(&activities, day(5), &DayPartition::utc(), at(6, 0, 0));
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn break_and_transfer_span_but_do_not_count_as_work() {
        let activities = vec![
            activity(1, ActivityType::Drive, at(5, 8, 0), Some(at(5, 10, 0))),
            activity(2, ActivityType::Break, at(5, 10, 0), Some(at(5, 10, 45))),
            activity(3, ActivityType::Transfer, at(5, 10, 45), Some(at(5, 11, 15))),
            activity(4, ActivityType::Work, at(5, 11, 15), Some(at(5, 13, 0))),
        ];

        let windows = build_windows(&activities, day(5), &DayPartition::utc(), at(6, 0, 0));
        assert_eq!(windows.len(), 1);
        let window = &windows[0];
        assert_eq!(window.total_work, Duration::minutes(225));
        assert_eq!(window.amplitude(), Duration::hours(5));
        assert_eq!(
            window.by_type.get(&ActivityType::Break).copied(),
            Some(Duration::minutes(45))
        );
    }

    #[test]
    fn open_activity_runs_until_reference() {
        let activities = vec![activity(1, ActivityType::Drive, at(5, 8, 0), None)];
        let windows = build_windows(&activities, day(5), &DayPartition::utc(), at(5, 9, 30));
        assert_eq!(windows[0].total_work, Duration::minutes(90));
    }

    #[test]
    fn cross_midnight_window_clips_per_day() {
        let activities = vec![activity(1, ActivityType::Drive, at(5, 21, 39), Some(at(6, 0, 44)))];
        let partition = DayPartition::utc();
        let windows = build_windows(&activities, day(5), &partition, at(7, 0, 0));
        assert_eq!(windows.len(), 1);
        let window = &windows[0];

        assert!(window.touches(day(5), &partition));
        assert!(window.touches(day(6), &partition));
        assert_eq!(window.work_within(day(5), &partition), Duration::minutes(141));
        assert_eq!(window.work_within(day(6), &partition), Duration::minutes(44));
        assert_eq!(window.total_work, Duration::minutes(185));
    }

    #[test]
    fn night_work_accrues_only_inside_night_window() {
        let activities = vec![activity(1, ActivityType::Drive, at(5, 19, 0), Some(at(5, 22, 0)))];
        let windows = build_windows(&activities, day(5), &DayPartition::utc(), at(6, 0, 0));
        assert_eq!(windows[0].night_work, Duration::hours(1));
    }

    #[test]
    fn activities_outside_three_day_range_are_ignored() {
        let activities = vec![
            activity(1, ActivityType::Drive, at(1, 8, 0), Some(at(1, 10, 0))),
            activity(2, ActivityType::Drive, at(5, 8, 0), Some(at(5, 10, 0))),
        ];
        let windows = build_windows(&activities, day(5), &DayPartition::utc(), at(8, 0, 0));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].activity_ids, vec![ActivityId(2)]);
    }
}
