//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{
    ACCOUNTS_DIR_NAME, AUDIT_DIR_NAME, AUDIT_LOG_FILENAME, EVENTS_DIR_NAME, INDEX_DIR_NAME,
    PATIENTS_DIR_NAME, PAYMENTS_DIR_NAME,
};
use crate::{RecordError, RecordResult};
use std::path::{Path, PathBuf};

/// Uniqueness indexes kept under `<data_dir>/index/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    Username,
    Email,
    NationalId,
    PatientNumber,
    PaymentReference,
    CheckoutId,
}

impl IndexKind {
    pub const ALL: [IndexKind; 6] = [
        IndexKind::Username,
        IndexKind::Email,
        IndexKind::NationalId,
        IndexKind::PatientNumber,
        IndexKind::PaymentReference,
        IndexKind::CheckoutId,
    ];

    pub const fn dir_name(self) -> &'static str {
        match self {
            IndexKind::Username => "username",
            IndexKind::Email => "email",
            IndexKind::NationalId => "national_id",
            IndexKind::PatientNumber => "patient_number",
            IndexKind::PaymentReference => "payment_reference",
            IndexKind::CheckoutId => "checkout_id",
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(data_dir: PathBuf) -> RecordResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(RecordError::InvalidInput(
                "data directory cannot be empty".into(),
            ));
        }
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.data_dir.join(ACCOUNTS_DIR_NAME)
    }

    pub fn patients_dir(&self) -> PathBuf {
        self.data_dir.join(PATIENTS_DIR_NAME)
    }

    pub fn events_dir(&self) -> PathBuf {
        self.data_dir.join(EVENTS_DIR_NAME)
    }

    pub fn payments_dir(&self) -> PathBuf {
        self.data_dir.join(PAYMENTS_DIR_NAME)
    }

    pub fn index_dir(&self, kind: IndexKind) -> PathBuf {
        self.data_dir.join(INDEX_DIR_NAME).join(kind.dir_name())
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_DIR_NAME).join(AUDIT_LOG_FILENAME)
    }
}

/// Create the storage layout under the configured data directory.
///
/// Intended to run once at startup so request handlers never race on directory creation for
/// the top-level folders.
pub fn prepare_data_dir(cfg: &CoreConfig) -> RecordResult<()> {
    let mut dirs = vec![
        cfg.accounts_dir(),
        cfg.patients_dir(),
        cfg.events_dir(),
        cfg.payments_dir(),
        cfg.data_dir().join(AUDIT_DIR_NAME),
    ];
    dirs.extend(IndexKind::ALL.iter().map(|kind| cfg.index_dir(*kind)));

    for dir in dirs {
        std::fs::create_dir_all(&dir).map_err(RecordError::StorageDirCreation)?;
    }
    tracing::debug!("data directory ready at {}", cfg.data_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_empty_data_dir() {
        assert!(CoreConfig::new(PathBuf::new()).is_err());
    }

    #[test]
    fn prepare_creates_every_directory() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(temp.path().join("data")).unwrap();
        prepare_data_dir(&cfg).unwrap();

        assert!(cfg.accounts_dir().is_dir());
        assert!(cfg.patients_dir().is_dir());
        assert!(cfg.events_dir().is_dir());
        assert!(cfg.payments_dir().is_dir());
        assert!(cfg.audit_log_path().parent().unwrap().is_dir());
        for kind in IndexKind::ALL {
            assert!(cfg.index_dir(kind).is_dir(), "{kind:?}");
        }

        // idempotent
        prepare_data_dir(&cfg).unwrap();
    }
}
