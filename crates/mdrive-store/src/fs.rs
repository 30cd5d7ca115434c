//! File-backed store.
//!
//! Layout: `<base>/<group>/<name>/<file>`. Every write goes to a temp file
//! that is renamed over the target, so readers never see a torn record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{CREDENTIAL_FILE, CredentialInfo, JOB_FILE, JobProps, Store, StoreError, StoreGroup};

/// Store keeping each group as a directory of per-domain JSON files.
#[derive(Debug, Clone)]
pub struct FsStore {
    base: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `base`. Directories are created lazily on write.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory holding everything stored for `name` in `group`.
    pub fn entry_dir(&self, group: StoreGroup, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.base.join(group.as_str()).join(name))
    }

    /// Persist installed credential metadata for a domain.
    pub async fn save_credential(
        &self,
        name: &str,
        info: &CredentialInfo,
    ) -> Result<(), StoreError> {
        let path = self.entry_dir(StoreGroup::Domains, name)?.join(CREDENTIAL_FILE);
        write_json(&path, info).await
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Store for FsStore {
    async fn load_job(&self, name: &str) -> Result<Option<JobProps>, StoreError> {
        let path = self.entry_dir(StoreGroup::Staging, name)?.join(JOB_FILE);
        Self::read_json(&path).await
    }

    async fn save_job(&self, name: &str, props: &JobProps) -> Result<(), StoreError> {
        let path = self.entry_dir(StoreGroup::Staging, name)?.join(JOB_FILE);
        write_json(&path, props).await
    }

    async fn purge(&self, group: StoreGroup, name: &str) -> Result<(), StoreError> {
        let dir = self.entry_dir(group, name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(group = %group, name, "purged store entry");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_names(&self, group: StoreGroup) -> Result<Vec<String>, StoreError> {
        let dir = self.base.join(group.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    debug!(group = %group, name = ?raw, "skipping entry with non-UTF-8 name")
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load_credential(&self, name: &str) -> Result<Option<CredentialInfo>, StoreError> {
        let path = self.entry_dir(StoreGroup::Domains, name)?.join(CREDENTIAL_FILE);
        Self::read_json(&path).await
    }
}

/// Write `value` as pretty JSON to `path` via temp file and rename.
async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(value)?;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Names become directory names, so they must be a single path component.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("name cannot be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidName(format!(
            "{name:?} is not a single path component"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DriveStatus;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn props(name: &str) -> JobProps {
        JobProps {
            name: name.to_string(),
            error_runs: 3,
            last_status: DriveStatus::Failed,
            last_message: Some("connection refused".to_string()),
            next_run: Some(Utc::now() + Duration::seconds(20)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_missing_job_is_none() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.load_job("example.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_job() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let saved = props("example.org");

        store.save_job("example.org", &saved).await.unwrap();

        let path = dir.path().join("staging").join("example.org").join(JOB_FILE);
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(store.load_job("example.org").await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_purge_staging_removes_job_and_artifacts() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.save_job("example.org", &props("example.org")).await.unwrap();
        let entry = store.entry_dir(StoreGroup::Staging, "example.org").unwrap();
        std::fs::write(entry.join("privkey.pem"), "key").unwrap();

        store.purge(StoreGroup::Staging, "example.org").await.unwrap();

        assert!(!entry.exists());
        assert!(store.load_job("example.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_missing_entry_is_ok() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.purge(StoreGroup::Challenges, "nothing.org").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_names_sorted_dirs_only() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let challenges = dir.path().join("challenges");
        for name in ["zzz", "aaa", "example.org"] {
            std::fs::create_dir_all(challenges.join(name)).unwrap();
        }
        std::fs::write(challenges.join("stray-file"), "x").unwrap();

        let names = store.list_names(StoreGroup::Challenges).await.unwrap();
        assert_eq!(names, vec!["aaa", "example.org", "zzz"]);
        assert!(store.list_names(StoreGroup::Domains).await.unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_list_names_skips_non_utf8_entries() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let challenges = dir.path().join("challenges");
        std::fs::create_dir_all(challenges.join("example.org")).unwrap();
        std::fs::create_dir_all(challenges.join(OsStr::from_bytes(b"bad\xff"))).unwrap();

        let names = store.list_names(StoreGroup::Challenges).await.unwrap();
        assert_eq!(names, vec!["example.org"]);
    }

    #[tokio::test]
    async fn test_credential_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let now = Utc::now();
        let info = CredentialInfo {
            valid_from: now - Duration::days(10),
            expires: now + Duration::days(80),
        };

        assert!(store.load_credential("example.org").await.unwrap().is_none());
        store.save_credential("example.org", &info).await.unwrap();
        assert_eq!(store.load_credential("example.org").await.unwrap(), Some(info));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        for name in ["", "..", "a/b", "."] {
            assert!(matches!(
                store.load_job(name).await,
                Err(StoreError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_corrupt_job_is_json_error() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let entry = dir.path().join("staging").join("example.org");
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join(JOB_FILE), "{not json").unwrap();

        assert!(matches!(
            store.load_job("example.org").await,
            Err(StoreError::Json(_))
        ));
    }
}
