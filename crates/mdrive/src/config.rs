//! Configuration file for the mdrive binary.
//!
//! ```json
//! {
//!   "store_dir": "/var/lib/mdrive",
//!   "notify_cmd": "/usr/local/bin/reload-server",
//!   "renew_cmd": "/usr/local/bin/acme-renew",
//!   "check_interval": 86400,
//!   "renew_window": "33%",
//!   "domains": [
//!     { "name": "example.org", "contacts": ["mailto:admin@example.org"] },
//!     { "name": "static.example.org", "drive_mode": "manual" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use mdrive_scheduler::{
    DEFAULT_CADENCE_SECS, DomainRegistry, DomainState, DriveConfig, DriveMode, ManagedDomain,
    RenewWindow,
};
use mdrive_store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors loading or applying the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no config directory on this system, pass --config")]
    NoConfigDir,

    #[error("no store directory configured, set store_dir or pass --store-dir")]
    NoStoreDir,

    #[error("domain {0} is configured more than once")]
    DuplicateDomain(String),

    #[error("domain entry with an empty name")]
    EmptyDomainName,

    #[error("{0} is set but blank")]
    BlankCommand(&'static str),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Longest accepted check interval, 30 days.
const MAX_CHECK_INTERVAL_SECS: u64 = 30 * 86_400;

fn default_check_interval() -> u64 {
    DEFAULT_CADENCE_SECS as u64
}

/// Top level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the file store.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// Command told about domains ready for activation.
    #[serde(default)]
    pub notify_cmd: Option<String>,
    /// Command performing one renewal attempt.
    #[serde(default)]
    pub renew_cmd: Option<String>,
    /// Full check interval in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Renew window for domains that do not set their own.
    #[serde(default)]
    pub renew_window: RenewWindow,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// One managed domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    /// Contact URIs registered with the CA. Renewal needs at least one.
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub drive_mode: DriveMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_window: Option<RenewWindow>,
}

impl Config {
    /// `<config dir>/mdrive/config.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("mdrive").join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Read and validate the configuration at `path`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), domains = config.domains.len(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, cmd) in [("notify_cmd", &self.notify_cmd), ("renew_cmd", &self.renew_cmd)] {
            if cmd.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(ConfigError::BlankCommand(field));
            }
        }
        let mut seen = HashSet::new();
        for domain in &self.domains {
            if domain.name.trim().is_empty() {
                return Err(ConfigError::EmptyDomainName);
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::DuplicateDomain(domain.name.clone()));
            }
        }
        Ok(())
    }

    /// Store directory: the command line override, else the configured one.
    pub fn store_dir(&self, cli_override: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        cli_override
            .or_else(|| self.store_dir.clone())
            .ok_or(ConfigError::NoStoreDir)
    }

    pub fn drive_config(&self) -> DriveConfig {
        let cadence = match self.check_interval {
            secs @ 1..=MAX_CHECK_INTERVAL_SECS => Duration::seconds(secs as i64),
            secs => {
                warn!(
                    check_interval = secs,
                    "check_interval out of range, using the default"
                );
                Duration::seconds(DEFAULT_CADENCE_SECS)
            }
        };
        DriveConfig {
            notify_cmd: self.notify_cmd.clone(),
            cadence,
        }
    }

    /// Managed domains in configuration order, with their installed credentials.
    pub async fn registry(
        &self,
        store: &dyn Store,
        now: DateTime<Utc>,
    ) -> Result<DomainRegistry, ConfigError> {
        let mut domains = Vec::with_capacity(self.domains.len());
        for entry in &self.domains {
            let credential = store.load_credential(&entry.name).await?;
            let state = DomainState::assess(!entry.contacts.is_empty(), credential.as_ref(), now);
            domains.push(ManagedDomain {
                name: entry.name.clone(),
                state,
                drive_mode: entry.drive_mode,
                renew_window: entry.renew_window.unwrap_or(self.renew_window),
                credential,
            });
        }
        Ok(DomainRegistry::new(domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdrive_store::{CredentialInfo, MemoryStore};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "store_dir": "/var/lib/mdrive",
        "notify_cmd": "/usr/local/bin/reload-server --graceful",
        "renew_cmd": "/usr/local/bin/acme-renew",
        "check_interval": 3600,
        "renew_window": "14d",
        "domains": [
            { "name": "example.org", "contacts": ["mailto:admin@example.org"] },
            { "name": "nocontact.org" },
            { "name": "static.org", "contacts": ["mailto:a@static.org"], "drive_mode": "manual", "renew_window": "50%" }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.store_dir, Some(PathBuf::from("/var/lib/mdrive")));
        assert_eq!(config.renew_window, RenewWindow::Fixed(Duration::days(14)));
        assert_eq!(config.domains.len(), 3);
        assert_eq!(config.domains[2].drive_mode, DriveMode::Manual);
        assert_eq!(config.domains[2].renew_window, Some(RenewWindow::Percent(50)));
        config.validate().unwrap();

        let drive = config.drive_config();
        assert_eq!(drive.cadence, Duration::hours(1));
        assert_eq!(
            drive.notify_cmd.as_deref(),
            Some("/usr/local/bin/reload-server --graceful")
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse(r#"{ "domains": [{ "name": "example.org" }] }"#).unwrap();
        assert_eq!(config.check_interval, 86_400);
        assert_eq!(config.renew_window, RenewWindow::Percent(33));
        assert_eq!(config.domains[0].drive_mode, DriveMode::Auto);
        assert!(config.notify_cmd.is_none());
        assert_eq!(config.drive_config().cadence, Duration::days(1));
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        let config = Config::parse(r#"{ "check_interval": 0 }"#).unwrap();
        assert_eq!(config.drive_config().cadence, Duration::days(1));
    }

    #[test]
    fn test_oversized_interval_falls_back_to_default() {
        let config = Config::parse(r#"{ "check_interval": 1000000000000000 }"#).unwrap();
        assert_eq!(config.drive_config().cadence, Duration::days(1));

        let config = Config::parse(r#"{ "check_interval": 2592000 }"#).unwrap();
        assert_eq!(config.drive_config().cadence, Duration::days(30));
    }

    #[test]
    fn test_blank_commands_rejected() {
        let config = Config::parse(r#"{ "notify_cmd": "  " }"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlankCommand("notify_cmd"))
        ));

        let config = Config::parse(r#"{ "renew_cmd": "" }"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlankCommand("renew_cmd"))
        ));
    }

    #[test]
    fn test_invalid_renew_window_rejected() {
        assert!(Config::parse(r#"{ "renew_window": "soon" }"#).is_err());
        assert!(Config::parse(r#"{ "renew_window": "120%" }"#).is_err());
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let config =
            Config::parse(r#"{ "domains": [{ "name": "a.org" }, { "name": "a.org" }] }"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateDomain(name)) if name == "a.org"
        ));
    }

    #[test]
    fn test_store_dir_override() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(
            config.store_dir(Some(PathBuf::from("/tmp/store"))).unwrap(),
            PathBuf::from("/tmp/store")
        );
        assert_eq!(
            config.store_dir(None).unwrap(),
            PathBuf::from("/var/lib/mdrive")
        );

        let bare = Config::parse("{}").unwrap();
        assert!(matches!(bare.store_dir(None), Err(ConfigError::NoStoreDir)));
    }

    #[tokio::test]
    async fn test_registry_assesses_domain_state() {
        let now = Utc::now();
        let store = MemoryStore::new();
        store
            .put_credential(
                "static.org",
                CredentialInfo {
                    valid_from: now - Duration::days(10),
                    expires: now + Duration::days(80),
                },
            )
            .await;
        let config = Config::parse(SAMPLE).unwrap();

        let registry = config.registry(&store, now).await.unwrap();

        let example = registry.get("example.org").unwrap();
        assert_eq!(example.state, DomainState::Incomplete);
        assert_eq!(example.renew_window, RenewWindow::Fixed(Duration::days(14)));
        assert_eq!(
            registry.get("nocontact.org").unwrap().state,
            DomainState::MissingInformation
        );
        let fixed = registry.get("static.org").unwrap();
        assert_eq!(fixed.state, DomainState::Complete);
        assert_eq!(fixed.renew_window, RenewWindow::Percent(50));
        assert_eq!(registry.watched_names(), vec!["example.org", "nocontact.org"]);
    }

    #[tokio::test]
    async fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let missing = Config::load(&path).await.unwrap_err();
        assert!(missing.to_string().contains("config.json"));

        tokio::fs::write(&path, SAMPLE).await.unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.domains[0].name, "example.org");

        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(
            Config::load(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }
}
