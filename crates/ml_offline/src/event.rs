//! Event records, extraction windows and dataset snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column names of the event store query and of the snapshot file, in order.
pub const EVENT_COLUMNS: [&str; 6] = [
    "id",
    "user_id",
    "activity_id",
    "event_type",
    "metadata",
    "created_at",
];

/// One logged user/activity interaction, immutable once extracted.
///
/// `created_at` keeps the textual representation produced at extraction so
/// that a snapshot round-trips without precision or timezone loss; it is
/// only parsed when features are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub user_id: Option<i64>,
    pub activity_id: Option<i64>,
    pub event_type: String,
    /// Opaque JSON payload, stored verbatim. Never `Some("")`: an empty
    /// payload is absent, see [`non_empty_metadata`].
    pub metadata: Option<String>,
    pub created_at: String,
}

/// Collapse an empty payload to `None`.
///
/// The snapshot file writes an absent payload as an empty cell, so an empty
/// string and a missing payload are the same value everywhere downstream.
pub fn non_empty_metadata(metadata: Option<String>) -> Option<String> {
    metadata.filter(|m| !m.is_empty())
}

/// Half-open time interval `[start, end)` of events considered for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub lookback_days: i64,
}

impl ExtractionWindow {
    /// Window of `lookback_days` ending (exclusively) at `now`.
    ///
    /// The lookback is not validated here; [`crate::source::extract`]
    /// rejects non-positive values.
    pub fn ending_at(now: DateTime<Utc>, lookback_days: i64) -> Self {
        Self {
            start: now - Duration::days(lookback_days),
            end: now,
            lookback_days,
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) ({} days)",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.lookback_days
        )
    }
}

/// Materialized result of one extraction run. Row order carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSnapshot {
    pub records: Vec<EventRecord>,
    pub extracted_at: DateTime<Utc>,
}

impl DatasetSnapshot {
    pub fn new(records: Vec<EventRecord>, extracted_at: DateTime<Utc>) -> Self {
        let records = records
            .into_iter()
            .map(|record| EventRecord {
                metadata: non_empty_metadata(record.metadata),
                ..record
            })
            .collect();
        Self {
            records,
            extracted_at,
        }
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let window = ExtractionWindow::ending_at(now, 30);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(window.contains(&window.start));
        assert!(!window.contains(&now));
        assert!(!window.contains(&(window.start - Duration::seconds(1))));
    }

    #[test]
    fn empty_metadata_is_absent_in_a_snapshot() {
        let record = |metadata: Option<&str>| EventRecord {
            id: "1".to_string(),
            user_id: None,
            activity_id: None,
            event_type: "PLAN_VIEWED".to_string(),
            metadata: metadata.map(String::from),
            created_at: "2024-01-01T10:00:00Z".to_string(),
        };
        let snapshot = DatasetSnapshot::new(
            vec![record(Some("")), record(None), record(Some("{}"))],
            Utc::now(),
        );

        let metadata: Vec<Option<&str>> =
            snapshot.records.iter().map(|r| r.metadata.as_deref()).collect();
        assert_eq!(metadata, vec![None, None, Some("{}")]);
    }

    #[test]
    fn window_display_names_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let text = ExtractionWindow::ending_at(now, 7).to_string();
        assert!(text.contains("2024-01-25T00:00:00+00:00"));
        assert!(text.contains("7 days"));
    }
}
