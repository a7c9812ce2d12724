use anyhow::Context;
use chrono::NaiveDateTime;
use plib_core::{Status, StatusParams, StatusRecord, StatusStore, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The status record as a JSON file. Saves go through a sibling temp file
/// and a rename so a crash never leaves half a record behind.
#[derive(Debug, Clone)]
pub struct JsonStatusFile {
    path: PathBuf,
}

impl JsonStatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means a first run and yields a fresh record; any
    /// other failure is returned.
    pub fn load_or_fresh(&self, now: NaiveDateTime) -> Result<StatusRecord, StoreError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no status file, starting fresh");
            return Ok(StatusRecord::fresh(now));
        }
        self.load()
    }
}

impl StatusStore for JsonStatusFile {
    fn load(&self) -> Result<StatusRecord, StoreError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            context: format!("read {}", self.path.display()),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|err| StoreError::Malformed {
            context: self.path.display().to_string(),
            source: Box::new(err),
        })
    }

    fn save(&self, record: &StatusRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(record).map_err(|err| StoreError::Malformed {
            context: "encode status record".to_string(),
            source: Box::new(err),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Io {
            context: format!("write {}", tmp.display()),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            context: format!("replace {}", self.path.display()),
            source,
        })?;
        info!(path = %self.path.display(), points = record.points, "status saved");
        Ok(())
    }
}

/// Loads the ledger fully before use; an inconsistent record is refused.
pub fn open_status(
    store: &JsonStatusFile,
    params: StatusParams,
    now: NaiveDateTime,
) -> anyhow::Result<Status> {
    let record = store
        .load_or_fresh(now)
        .with_context(|| format!("load status {}", store.path().display()))?;
    let status = Status::from_record(record, params)
        .with_context(|| format!("check status {}", store.path().display()))?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 2)
            .and_then(|day| day.and_hms_opt(12, 0, 0))
            .expect("valid time")
    }

    #[test]
    fn missing_file_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStatusFile::new(dir.path().join("status.json"));
        assert!(store.load().is_err());
        assert_eq!(store.load_or_fresh(noon()).expect("fresh"), StatusRecord::fresh(noon()));
    }

    #[test]
    fn saved_record_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStatusFile::new(dir.path().join("status.json"));
        let mut record = StatusRecord::fresh(noon());
        record.points = -4;
        record.streak = -2;
        store.save(&record).expect("save");
        assert_eq!(store.load().expect("load"), record);
        assert!(!dir.path().join("status.json.tmp").exists());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("status.json");
        fs::write(&path, "{\"points\": \"many\"}").expect("write");
        let store = JsonStatusFile::new(path);
        let err = store.load().expect_err("malformed");
        assert!(matches!(err, StoreError::Malformed { .. }));
        let cause = std::error::Error::source(&err).expect("parse error kept");
        assert!(cause.to_string().contains("invalid type"));
        assert!(open_status(&store, StatusParams::default(), noon()).is_err());
    }

    #[test]
    fn unreadable_file_keeps_the_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStatusFile::new(dir.path());
        let err = store.load().expect_err("directory is not a record");
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn inconsistent_record_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStatusFile::new(dir.path().join("status.json"));
        let mut record = StatusRecord::fresh(noon());
        record.streak = 3;
        store.save(&record).expect("save");
        assert!(open_status(&store, StatusParams::default(), noon()).is_err());
    }
}
