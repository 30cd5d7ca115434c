//! In-memory store.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{CredentialInfo, JobProps, Store, StoreError, StoreGroup};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<String, JobProps>,
    credentials: HashMap<String, CredentialInfo>,
    entries: HashMap<StoreGroup, BTreeSet<String>>,
    purged: Vec<(StoreGroup, String)>,
}

/// Store that keeps all records in memory.
///
/// Job records live in the `staging` group, so purging a domain's staging
/// entry also drops its job record, as with [`crate::FsStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save_job` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save_job` calls.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Insert a job record without counting it as a save.
    pub async fn put_job(&self, props: JobProps) {
        let mut inner = self.inner.lock().await;
        inner
            .entries
            .entry(StoreGroup::Staging)
            .or_default()
            .insert(props.name.clone());
        inner.jobs.insert(props.name.clone(), props);
    }

    /// Job record as currently stored.
    pub async fn job(&self, name: &str) -> Option<JobProps> {
        self.inner.lock().await.jobs.get(name).cloned()
    }

    pub async fn put_credential(&self, name: &str, info: CredentialInfo) {
        let mut inner = self.inner.lock().await;
        inner
            .entries
            .entry(StoreGroup::Domains)
            .or_default()
            .insert(name.to_string());
        inner.credentials.insert(name.to_string(), info);
    }

    /// Create an (opaque) entry for `name` in `group`.
    pub async fn add_entry(&self, group: StoreGroup, name: &str) {
        self.inner
            .lock()
            .await
            .entries
            .entry(group)
            .or_default()
            .insert(name.to_string());
    }

    /// Every purge performed so far, in order.
    pub async fn purged(&self) -> Vec<(StoreGroup, String)> {
        self.inner.lock().await.purged.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_job(&self, name: &str) -> Result<Option<JobProps>, StoreError> {
        Ok(self.inner.lock().await.jobs.get(name).cloned())
    }

    async fn save_job(&self, name: &str, props: &JobProps) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("save of {name} rejected")));
        }
        let mut inner = self.inner.lock().await;
        inner
            .entries
            .entry(StoreGroup::Staging)
            .or_default()
            .insert(name.to_string());
        inner.jobs.insert(name.to_string(), props.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn purge(&self, group: StoreGroup, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(names) = inner.entries.get_mut(&group) {
            names.remove(name);
        }
        match group {
            StoreGroup::Staging => {
                inner.jobs.remove(name);
            }
            StoreGroup::Domains => {
                inner.credentials.remove(name);
            }
            StoreGroup::Challenges => {}
        }
        inner.purged.push((group, name.to_string()));
        Ok(())
    }

    async fn list_names(&self, group: StoreGroup) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .entries
            .get(&group)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_credential(&self, name: &str) -> Result<Option<CredentialInfo>, StoreError> {
        Ok(self.inner.lock().await.credentials.get(name).cloned())
    }
}
