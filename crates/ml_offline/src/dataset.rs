//! Dataset materializer
//!
//! Persists a [`DatasetSnapshot`] as CSV and loads it back. Saves replace
//! the previous file atomically: rows are written to a temp file in the
//! destination directory, synced, then renamed over the target.

use crate::errors::PersistenceError;
use crate::event::{DatasetSnapshot, EventRecord, EVENT_COLUMNS};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Location of a persisted snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub rows: usize,
}

/// Write `snapshot` to `path`, creating parent directories as needed.
///
/// An absent `metadata` is an empty cell. [`DatasetSnapshot::new`] never
/// holds `Some("")`, so that cell reads back as `None` without loss.
pub fn save(snapshot: &DatasetSnapshot, path: &Path) -> Result<ArtifactRef, PersistenceError> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

    let tmp = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    let mut writer = csv::Writer::from_writer(tmp);
    // Written explicitly so an empty snapshot still carries the header.
    writer
        .write_record(EVENT_COLUMNS)
        .map_err(|source| csv_error(path, source))?;
    for record in &snapshot.records {
        write_record(&mut writer, record).map_err(|source| csv_error(path, source))?;
    }

    let mut tmp = writer.into_inner().map_err(|e| PersistenceError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })?;
    tmp.flush().map_err(|e| PersistenceError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PersistenceError::io(path, e))?;
    tmp.persist(path).map_err(|e| PersistenceError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    info!(path = %path.display(), rows = snapshot.row_count(), "saved dataset snapshot");
    Ok(ArtifactRef {
        path: path.to_path_buf(),
        rows: snapshot.row_count(),
    })
}

/// Read the snapshot at `path`.
///
/// The extraction timestamp is taken from the file's modification time.
pub fn load(path: &Path) -> Result<DatasetSnapshot, PersistenceError> {
    let metadata = fs::metadata(path).map_err(|e| PersistenceError::io(path, e))?;
    let extracted_at: DateTime<Utc> = metadata
        .modified()
        .map_err(|e| PersistenceError::io(path, e))?
        .into();

    let mut reader = csv::Reader::from_path(path).map_err(|source| csv_error(path, source))?;
    let headers = reader
        .headers()
        .map_err(|source| csv_error(path, source))?
        .clone();
    let missing: Vec<String> = EVENT_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|h| h.trim() == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PersistenceError::Schema {
            path: path.to_path_buf(),
            missing,
        });
    }

    let records = reader
        .deserialize::<EventRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| csv_error(path, source))?;

    debug!(path = %path.display(), rows = records.len(), "loaded dataset snapshot");
    Ok(DatasetSnapshot::new(records, extracted_at))
}

fn write_record<W: Write>(writer: &mut csv::Writer<W>, record: &EventRecord) -> csv::Result<()> {
    let user_id = record.user_id.map(|v| v.to_string()).unwrap_or_default();
    let activity_id = record.activity_id.map(|v| v.to_string()).unwrap_or_default();
    writer.write_record([
        record.id.as_str(),
        user_id.as_str(),
        activity_id.as_str(),
        record.event_type.as_str(),
        record.metadata.as_deref().unwrap_or(""),
        record.created_at.as_str(),
    ])
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn csv_error(path: &Path, source: csv::Error) -> PersistenceError {
    if let csv::ErrorKind::Io(io) = source.kind() {
        if io.kind() == std::io::ErrorKind::NotFound {
            return PersistenceError::NotFound {
                path: path.to_path_buf(),
            };
        }
    }
    PersistenceError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn record(id: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            user_id: Some(42),
            activity_id: None,
            event_type: "PLAN_VIEWED".to_string(),
            metadata: Some(r#"{"ref":"push","tags":["a","b"]}"#.to_string()),
            created_at: "2024-01-01T10:00:00.123456Z".to_string(),
        }
    }

    fn snapshot(records: Vec<EventRecord>) -> DatasetSnapshot {
        DatasetSnapshot::new(records, Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap())
    }

    #[test]
    fn round_trip_preserves_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/data/event_logs.csv");
        let original = snapshot(vec![record("a"), record("b")]);

        let artifact = save(&original, &path).unwrap();
        assert_eq!(artifact.rows, 2);

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.records, original.records);
    }

    #[test]
    fn empty_metadata_round_trips_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event_logs.csv");
        let mut blank = record("a");
        blank.metadata = Some(String::new());
        let original = snapshot(vec![blank, record("b")]);
        assert_eq!(original.records[0].metadata, None);

        save(&original, &path).unwrap();
        assert_eq!(load(&path).unwrap().records, original.records);
    }

    #[test]
    fn empty_snapshot_keeps_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event_logs.csv");
        save(&snapshot(vec![]), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), EVENT_COLUMNS.join(","));
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event_logs.csv");
        save(&snapshot(vec![record("a"), record("b"), record("c")]), &path).unwrap();
        save(&snapshot(vec![record("z")]), &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.row_count(), 1);
        assert_eq!(loaded.records[0].id, "z");
        // Only the snapshot itself remains; no temp files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[test]
    fn missing_columns_are_named() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.csv");
        fs::write(&path, "id,event_type,created_at\n1,PLAN_VIEWED,2024-01-01T10:00:00\n").unwrap();

        match load(&path).unwrap_err() {
            PersistenceError::Schema { missing, .. } => {
                assert_eq!(missing, vec!["user_id", "activity_id", "metadata"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_row_is_a_csv_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(
            &path,
            "id,user_id,activity_id,event_type,metadata,created_at\n1,not-a-number,,PLAN_VIEWED,,2024-01-01T10:00:00\n",
        )
        .unwrap();
        assert!(matches!(load(&path).unwrap_err(), PersistenceError::Csv { .. }));
    }

    fn arb_record() -> impl Strategy<Value = EventRecord> {
        (
            "[a-f0-9-]{1,36}",
            proptest::option::of(any::<i64>()),
            proptest::option::of(any::<i64>()),
            "[A-Z_]{1,20}",
            proptest::option::of("[ -~]{0,40}"),
            0i64..4_102_444_800,
            0u32..1_000_000,
        )
            .prop_map(|(id, user_id, activity_id, event_type, metadata, secs, micros)| {
                let ts = Utc.timestamp_opt(secs, micros * 1_000).unwrap();
                EventRecord {
                    id,
                    user_id,
                    activity_id,
                    event_type,
                    metadata,
                    created_at: ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn load_of_save_is_identity(records in proptest::collection::vec(arb_record(), 0..20)) {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("snapshot.csv");
            let original = snapshot(records);
            save(&original, &path).unwrap();
            prop_assert_eq!(load(&path).unwrap().records, original.records);
        }
    }
}
