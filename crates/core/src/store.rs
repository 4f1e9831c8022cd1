//! On-disk record storage.
//!
//! Non-versioned records (accounts, outreach events, payments) are YAML files in a sharded
//! directory per record:
//!
//! ```text
//! <base>/<s1>/<s2>/<uuid>/<file>.yaml
//! ```
//!
//! Uniqueness (usernames, emails, national ids, references, checkout ids) is enforced by
//! [`UniqueIndex`]: one file per key, created with exclusive-create, whose body is the owning
//! record id. Two requests racing for the same key cannot both succeed.

use crate::config::{CoreConfig, IndexKind};
use crate::constants::MAX_REFERENCE_ATTEMPTS;
use crate::{RecordError, RecordResult};
use chs_uuid::ShardableUuid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Allocates a fresh sharded record directory under `base_dir`.
///
/// Guards against UUID collisions (or pre-existing directories from external interference) by
/// retrying a bounded number of times with new identifiers.
pub(crate) fn create_unique_record_dir(base_dir: &Path) -> RecordResult<(ShardableUuid, PathBuf)> {
    for _attempt in 0..MAX_REFERENCE_ATTEMPTS {
        let id = ShardableUuid::new();
        let candidate = id.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }
        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(RecordError::StorageDirCreation)?;
        }
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((id, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(RecordError::StorageDirCreation(e)),
        }
    }
    Err(RecordError::ReferenceExhausted("record directory"))
}

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> RecordResult<T> {
    let contents = fs::read_to_string(path).map_err(RecordError::FileRead)?;
    serde_yaml::from_str(&contents).map_err(RecordError::YamlDeserialization)
}

/// Reads a record if it exists; `Ok(None)` when the file is absent.
pub(crate) fn read_yaml_opt<T: DeserializeOwned>(path: &Path) -> RecordResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(RecordError::YamlDeserialization),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RecordError::FileRead(e)),
    }
}

/// Replaces `path` atomically by writing a sibling temp file and renaming over it.
pub(crate) fn write_yaml<T: Serialize>(path: &Path, value: &T) -> RecordResult<()> {
    let yaml = serde_yaml::to_string(value).map_err(RecordError::YamlSerialization)?;
    let tmp = path.with_extension(format!("yaml.tmp-{}", ShardableUuid::new()));
    fs::write(&tmp, yaml).map_err(RecordError::FileWrite)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(RecordError::FileWrite(e));
    }
    Ok(())
}

/// Writes `path` only if it does not exist yet.
///
/// Returns `Ok(false)` if the file was already present.
pub(crate) fn create_new_yaml<T: Serialize>(path: &Path, value: &T) -> RecordResult<bool> {
    let yaml = serde_yaml::to_string(value).map_err(RecordError::YamlSerialization)?;
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(RecordError::FileWrite(e)),
    };
    if let Err(e) = file.write_all(yaml.as_bytes()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(RecordError::FileWrite(e));
    }
    Ok(true)
}

/// Visits every `<base>/<s1>/<s2>/<uuid>/` record directory.
///
/// Entries that are not directories are skipped; unreadable shard levels are skipped
/// silently since a missing base simply means no records yet.
pub(crate) fn sharded_record_dirs(base_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    let s1_iter = match fs::read_dir(base_dir) {
        Ok(it) => it,
        Err(_) => return dirs,
    };
    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }

        let s2_iter = match fs::read_dir(&s1_path) {
            Ok(it) => it,
            Err(_) => continue,
        };
        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }

            let id_iter = match fs::read_dir(&s2_path) {
                Ok(it) => it,
                Err(_) => continue,
            };
            for id_ent in id_iter.flatten() {
                let id_path = id_ent.path();
                if id_path.is_dir() {
                    dirs.push(id_path);
                }
            }
        }
    }

    dirs
}

/// Loads every `<record dir>/<filename>` under `base_dir` with `parse`.
///
/// Records that fail to read or parse are logged as warnings and skipped.
pub(crate) fn list_sharded<T>(
    base_dir: &Path,
    filename: &str,
    parse: impl Fn(&str) -> RecordResult<T>,
) -> Vec<T> {
    let mut records = Vec::new();
    for dir in sharded_record_dirs(base_dir) {
        let path = dir.join(filename);
        if !path.is_file() {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(RecordError::FileRead)
            .and_then(|contents| parse(&contents));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("failed to parse {}: {}", path.display(), e),
        }
    }
    records
}

/// An exclusive-create uniqueness index.
#[derive(Clone, Debug)]
pub(crate) struct UniqueIndex {
    dir: PathBuf,
}

impl UniqueIndex {
    pub(crate) fn new(cfg: &CoreConfig, kind: IndexKind) -> Self {
        Self {
            dir: cfg.index_dir(kind),
        }
    }

    /// Keys are hashed so arbitrary input (emails, URLs) maps to a safe filename.
    fn key_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(hex::encode(digest))
    }

    /// Claims `key` for `owner`. Returns `Ok(false)` if someone else already holds it.
    pub(crate) fn claim(&self, key: &str, owner: &str) -> RecordResult<bool> {
        fs::create_dir_all(&self.dir).map_err(RecordError::StorageDirCreation)?;
        let path = self.key_path(key);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(RecordError::FileWrite(e)),
        };
        if let Err(e) = file.write_all(owner.as_bytes()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(RecordError::FileWrite(e));
        }
        Ok(true)
    }

    /// The owner recorded for `key`, if claimed.
    pub(crate) fn lookup(&self, key: &str) -> RecordResult<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(owner) => Ok(Some(owner.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RecordError::FileRead(e)),
        }
    }

    pub(crate) fn contains(&self, key: &str) -> RecordResult<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Releases `key`. Releasing an unclaimed key is not an error.
    pub(crate) fn release(&self, key: &str) -> RecordResult<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecordError::FileWrite(e)),
        }
    }

    /// Releases `key` while unwinding an earlier failure; a release error is only logged.
    pub(crate) fn release_quietly(&self, key: &str) {
        if let Err(e) = self.release(key) {
            tracing::warn!("failed to release index claim in {}: {}", self.dir.display(), e);
        }
    }
}

/// Generates `prefix` + UTC `YYYYMMDD` + 8 uppercase hex characters and claims it in `index`.
///
/// A collision regenerates; gives up after a bounded number of attempts.
pub(crate) fn claim_reference(
    index: &UniqueIndex,
    prefix: &str,
    owner: &str,
    what: &'static str,
) -> RecordResult<String> {
    for _attempt in 0..MAX_REFERENCE_ATTEMPTS {
        let candidate = generate_reference(prefix, chrono::Utc::now());
        if index.claim(&candidate, owner)? {
            return Ok(candidate);
        }
        tracing::debug!("{what} collision on {candidate}; regenerating");
    }
    Err(RecordError::ReferenceExhausted(what))
}

/// The suffix is the first eight hex characters of a fresh v4 UUID.
pub(crate) fn generate_reference(prefix: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "{prefix}{}{}",
        now.format("%Y%m%d"),
        ShardableUuid::new().short_code()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        text: String,
    }

    fn cfg(temp: &TempDir) -> CoreConfig {
        CoreConfig::new(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn write_then_read_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("note.yaml");
        write_yaml(&path, &Note { text: "one".into() }).unwrap();
        write_yaml(&path, &Note { text: "two".into() }).unwrap();
        let note: Note = read_yaml(&path).unwrap();
        assert_eq!(note.text, "two");
        // no temp files left behind
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn read_opt_distinguishes_missing() {
        let temp = TempDir::new().unwrap();
        let missing: Option<Note> = read_yaml_opt(&temp.path().join("nope.yaml")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn create_new_does_not_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("att.yaml");
        assert!(create_new_yaml(&path, &Note { text: "first".into() }).unwrap());
        assert!(!create_new_yaml(&path, &Note { text: "second".into() }).unwrap());
        let note: Note = read_yaml(&path).unwrap();
        assert_eq!(note.text, "first");
    }

    #[test]
    fn list_sharded_skips_unparsable_records() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("records");
        let (_, good) = create_unique_record_dir(&base).unwrap();
        let (_, bad) = create_unique_record_dir(&base).unwrap();
        write_yaml(&good.join("r.yaml"), &Note { text: "ok".into() }).unwrap();
        fs::write(bad.join("r.yaml"), ":: not yaml ::\n  - [").unwrap();

        let notes = list_sharded(&base, "r.yaml", |s| {
            serde_yaml::from_str::<Note>(s).map_err(RecordError::YamlDeserialization)
        });
        assert_eq!(notes, vec![Note { text: "ok".into() }]);
    }

    #[test]
    fn index_claim_is_exclusive_until_released() {
        let temp = TempDir::new().unwrap();
        let index = UniqueIndex::new(&cfg(&temp), IndexKind::Username);

        assert!(index.claim("jane", "owner-a").unwrap());
        assert!(!index.claim("jane", "owner-b").unwrap());
        assert_eq!(index.lookup("jane").unwrap().as_deref(), Some("owner-a"));

        index.release("jane").unwrap();
        index.release("jane").unwrap();
        assert!(!index.contains("jane").unwrap());
        assert!(index.claim("jane", "owner-b").unwrap());
    }

    #[test]
    fn references_have_prefix_date_and_hex_suffix() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let reference = generate_reference("CHS", now);
        assert_eq!(reference.len(), 3 + 8 + 8);
        assert!(reference.starts_with("CHS20260301"));
        assert!(reference[11..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn claim_reference_returns_claimed_key() {
        let temp = TempDir::new().unwrap();
        let index = UniqueIndex::new(&cfg(&temp), IndexKind::PaymentReference);
        let reference = claim_reference(&index, "CHS", "p1", "payment reference").unwrap();
        assert_eq!(index.lookup(&reference).unwrap().as_deref(), Some("p1"));
    }
}
