//! Persistent storage for mdrive.
//!
//! Records are kept per domain inside named groups:
//! - `staging` holds the job record and in-progress renewal artifacts
//! - `challenges` holds protocol-specific transient artifacts
//! - `domains` holds metadata of the currently installed credentials
//!
//! [`FsStore`] keeps each group as a directory of JSON files. [`MemoryStore`]
//! keeps everything in memory and can inject failures.

mod error;
mod fs;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use store::Store;
pub use types::{CREDENTIAL_FILE, CredentialInfo, DriveStatus, JOB_FILE, JobProps, StoreGroup};
