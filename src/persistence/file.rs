use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{footprint, KeyValueStore};
use crate::error::{AppError, Result};

/// One file per key inside a directory. The quota applies to the sum of
/// all stored values, like a browser origin's local storage.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: u64,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, quota_bytes: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), quota_bytes, "Opened file store");
        Ok(Self { dir, quota_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(AppError::StorageError(format!("Invalid storage key: {}", key)));
        }
        Ok(self.dir.join(key))
    }

    fn used_by_others(&self, key: &str) -> Result<u64> {
        let mut used = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == key || name.starts_with('.') {
                continue;
            }
            let len = entry.metadata()?.len();
            used += name.len() as u64 + len;
        }
        Ok(used)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        if self.used_by_others(key)? + footprint(key, value) > self.quota_bytes {
            return Err(AppError::QuotaExceeded(key.to_string()));
        }

        // write then rename so a crash never leaves a truncated value behind
        let tmp = self.dir.join(format!(".{}.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 1024).unwrap();
        store.set("study-companion-theme", "dark").unwrap();

        let reopened = FileStore::open(dir.path(), 1024).unwrap();
        assert_eq!(reopened.get("study-companion-theme").unwrap().as_deref(), Some("dark"));
        reopened.remove("study-companion-theme").unwrap();
        assert!(reopened.get("study-companion-theme").unwrap().is_none());
        reopened.remove("study-companion-theme").unwrap();
    }

    #[test]
    fn rejects_writes_over_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 16).unwrap();
        store.set("a", "0123456789").unwrap();
        let err = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(_)));
        assert!(store.get("b").unwrap().is_none());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 1024).unwrap();
        assert!(store.set("../escape", "x").is_err());
        assert!(store.get("").is_err());
    }
}
