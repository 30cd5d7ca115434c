//! The store abstraction used by the scheduler.

use async_trait::async_trait;

use crate::{CredentialInfo, JobProps, StoreError, StoreGroup};

/// Grouped key/value storage of per-domain records.
///
/// Writes are atomic per record. One writer at a time is assumed; any number
/// of readers may observe the store concurrently.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the job record of a domain, `None` if none was ever saved.
    async fn load_job(&self, name: &str) -> Result<Option<JobProps>, StoreError>;

    /// Persist the job record of a domain.
    async fn save_job(&self, name: &str, props: &JobProps) -> Result<(), StoreError>;

    /// Remove everything stored for `name` in `group`. Missing entries are not an error.
    async fn purge(&self, group: StoreGroup, name: &str) -> Result<(), StoreError>;

    /// Names that have an entry in `group`, sorted.
    async fn list_names(&self, group: StoreGroup) -> Result<Vec<String>, StoreError>;

    /// Load metadata of the credentials currently installed for a domain.
    async fn load_credential(&self, name: &str) -> Result<Option<CredentialInfo>, StoreError>;
}
