//! Managed domain configuration as seen by the scheduler.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use mdrive_store::CredentialInfo;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Lifecycle state of a managed domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    /// No usable credentials installed yet.
    Incomplete,
    /// Credentials installed and not expired.
    Complete,
    /// Installed credentials have expired.
    Expired,
    /// Configuration lacks required fields. Driving cannot succeed until
    /// the configuration is changed and the process restarted.
    MissingInformation,
}

impl DomainState {
    /// State of a domain given its configuration completeness and installed credentials.
    pub fn assess(
        has_required_info: bool,
        credential: Option<&CredentialInfo>,
        now: DateTime<Utc>,
    ) -> Self {
        if !has_required_info {
            return DomainState::MissingInformation;
        }
        match credential {
            None => DomainState::Incomplete,
            Some(c) if now >= c.expires => DomainState::Expired,
            Some(_) => DomainState::Complete,
        }
    }
}

/// Whether the scheduler drives a domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// Drive renewals when the renew window is reached.
    #[default]
    Auto,
    /// Same as `auto`.
    Always,
    /// Never drive; credentials are managed by hand.
    Manual,
}

/// How long before expiry a renewal starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RenewWindow {
    /// Percentage of the credential lifetime remaining.
    Percent(u8),
    /// Fixed time before expiry.
    Fixed(Duration),
}

impl Default for RenewWindow {
    fn default() -> Self {
        RenewWindow::Percent(33)
    }
}

impl RenewWindow {
    /// Time before `credential` expires at which renewal becomes due.
    pub fn lead_time(&self, credential: &CredentialInfo) -> Duration {
        match self {
            RenewWindow::Fixed(d) => *d,
            RenewWindow::Percent(p) => {
                let lifetime = (credential.expires - credential.valid_from).num_seconds();
                Duration::seconds(lifetime.max(0) * i64::from(*p) / 100)
            }
        }
    }
}

impl FromStr for RenewWindow {
    type Err = SchedulerError;

    /// Parses `"33%"`, or a number with unit `d`, `h`, `m` or `s`.
    /// A bare number counts days.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SchedulerError::InvalidRenewWindow(s.to_string());

        if let Some(pct) = s.strip_suffix('%') {
            let pct: u8 = pct.trim().parse().map_err(|_| invalid())?;
            if pct > 100 {
                return Err(invalid());
            }
            return Ok(RenewWindow::Percent(pct));
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        let d = match unit.trim() {
            "" | "d" => Duration::try_days(n),
            "h" => Duration::try_hours(n),
            "m" => Duration::try_minutes(n),
            "s" => Duration::try_seconds(n),
            _ => None,
        }
        .ok_or_else(invalid)?;
        Ok(RenewWindow::Fixed(d))
    }
}

impl TryFrom<String> for RenewWindow {
    type Error = SchedulerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RenewWindow> for String {
    fn from(w: RenewWindow) -> Self {
        w.to_string()
    }
}

impl fmt::Display for RenewWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewWindow::Percent(p) => write!(f, "{p}%"),
            RenewWindow::Fixed(d) => {
                let secs = d.num_seconds();
                if secs % 86_400 == 0 {
                    write!(f, "{}d", secs / 86_400)
                } else if secs % 3600 == 0 {
                    write!(f, "{}h", secs / 3600)
                } else if secs % 60 == 0 {
                    write!(f, "{}m", secs / 60)
                } else {
                    write!(f, "{secs}s")
                }
            }
        }
    }
}

/// A domain whose credentials are under management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDomain {
    pub name: String,
    pub state: DomainState,
    pub drive_mode: DriveMode,
    pub renew_window: RenewWindow,
    /// Credentials currently in use, if any.
    pub credential: Option<CredentialInfo>,
}

impl ManagedDomain {
    /// A domain without installed credentials, waiting for its first drive.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: DomainState::Incomplete,
            drive_mode: DriveMode::default(),
            renew_window: RenewWindow::default(),
            credential: None,
        }
    }

    /// Expiry of the credentials in use.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.credential.as_ref().map(|c| c.expires)
    }

    /// Whether a renewal should be driven at `now`.
    pub fn should_renew(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            DomainState::MissingInformation => false,
            DomainState::Incomplete | DomainState::Expired => true,
            DomainState::Complete => match &self.credential {
                None => true,
                // A window reaching past the earliest representable time is always open.
                Some(c) => c
                    .expires
                    .checked_sub_signed(self.renew_window.lead_time(c))
                    .is_none_or(|opens| now >= opens),
            },
        }
    }

    /// Take `credential` as the one currently in use and re-assess the state.
    pub fn install(&mut self, credential: CredentialInfo, now: DateTime<Utc>) {
        if self.state != DomainState::MissingInformation {
            self.state = DomainState::assess(true, Some(&credential), now);
        }
        self.credential = Some(credential);
    }
}

/// The read-only set of managed domains, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: Vec<ManagedDomain>,
}

impl DomainRegistry {
    pub fn new(domains: Vec<ManagedDomain>) -> Self {
        Self { domains }
    }

    pub fn get(&self, name: &str) -> Option<&ManagedDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedDomain> {
        self.domains.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of the domains the scheduler drives.
    pub fn watched_names(&self) -> Vec<String> {
        self.domains
            .iter()
            .filter(|d| d.drive_mode != DriveMode::Manual)
            .map(|d| d.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(now: DateTime<Utc>, age_days: i64, remaining_days: i64) -> CredentialInfo {
        CredentialInfo {
            valid_from: now - Duration::days(age_days),
            expires: now + Duration::days(remaining_days),
        }
    }

    fn complete(name: &str, credential: CredentialInfo) -> ManagedDomain {
        ManagedDomain {
            state: DomainState::Complete,
            credential: Some(credential),
            ..ManagedDomain::new(name)
        }
    }

    #[test]
    fn test_parse_renew_window() {
        assert_eq!("33%".parse::<RenewWindow>().unwrap(), RenewWindow::Percent(33));
        assert_eq!(
            "14d".parse::<RenewWindow>().unwrap(),
            RenewWindow::Fixed(Duration::days(14))
        );
        assert_eq!(
            "12h".parse::<RenewWindow>().unwrap(),
            RenewWindow::Fixed(Duration::hours(12))
        );
        assert_eq!(
            "30".parse::<RenewWindow>().unwrap(),
            RenewWindow::Fixed(Duration::days(30))
        );
        assert!("101%".parse::<RenewWindow>().is_err());
        assert!("soon".parse::<RenewWindow>().is_err());
        assert!("3w".parse::<RenewWindow>().is_err());
    }

    #[test]
    fn test_renew_window_display_roundtrips() {
        for s in ["33%", "14d", "12h", "90m", "45s"] {
            let w: RenewWindow = s.parse().unwrap();
            assert_eq!(w.to_string(), s);
        }
    }

    #[test]
    fn test_renew_window_from_json() {
        let w: RenewWindow = serde_json::from_str(r#""10d""#).unwrap();
        assert_eq!(w, RenewWindow::Fixed(Duration::days(10)));
        assert!(serde_json::from_str::<RenewWindow>(r#""ten days""#).is_err());
    }

    #[test]
    fn test_percent_window_lead_time() {
        let now = Utc::now();
        // 90 day lifetime, 33% => 29.7 days
        let c = credential(now, 30, 60);
        let lead = RenewWindow::Percent(33).lead_time(&c);
        assert_eq!(lead.num_seconds(), 90 * 86_400 * 33 / 100);
    }

    #[test]
    fn test_should_renew_far_from_expiry() {
        let now = Utc::now();
        let domain = complete("example.org", credential(now, 10, 80));
        assert!(!domain.should_renew(now));
    }

    #[test]
    fn test_should_renew_inside_window() {
        let now = Utc::now();
        let domain = complete("example.org", credential(now, 80, 10));
        assert!(domain.should_renew(now));
    }

    #[test]
    fn test_should_renew_fixed_window() {
        let now = Utc::now();
        let mut domain = complete("example.org", credential(now, 10, 20));
        domain.renew_window = RenewWindow::Fixed(Duration::days(14));
        assert!(!domain.should_renew(now));
        assert!(domain.should_renew(now + Duration::days(7)));
    }

    #[test]
    fn test_should_renew_huge_fixed_window() {
        let now = Utc::now();
        let mut domain = complete("example.org", credential(now, 10, 80));
        domain.renew_window = "100000000d".parse().unwrap();
        assert!(domain.should_renew(now));
    }

    #[test]
    fn test_install_reassesses_state() {
        let now = Utc::now();
        let mut domain = ManagedDomain::new("example.org");
        domain.install(credential(now, 1, 89), now);
        assert_eq!(domain.state, DomainState::Complete);
        assert!(!domain.should_renew(now));

        let mut missing = ManagedDomain::new("missing.org");
        missing.state = DomainState::MissingInformation;
        missing.install(credential(now, 1, 89), now);
        assert_eq!(missing.state, DomainState::MissingInformation);
        assert!(missing.credential.is_some());
    }

    #[test]
    fn test_should_renew_by_state() {
        let now = Utc::now();
        assert!(ManagedDomain::new("new.org").should_renew(now));

        let mut missing = ManagedDomain::new("missing.org");
        missing.state = DomainState::MissingInformation;
        assert!(!missing.should_renew(now));

        let mut expired = complete("expired.org", credential(now, 100, 10));
        expired.state = DomainState::Expired;
        assert!(expired.should_renew(now));
    }

    #[test]
    fn test_assess_state() {
        let now = Utc::now();
        let valid = credential(now, 10, 80);
        let old = CredentialInfo {
            valid_from: now - Duration::days(100),
            expires: now - Duration::days(10),
        };
        assert_eq!(
            DomainState::assess(false, Some(&valid), now),
            DomainState::MissingInformation
        );
        assert_eq!(DomainState::assess(true, None, now), DomainState::Incomplete);
        assert_eq!(DomainState::assess(true, Some(&old), now), DomainState::Expired);
        assert_eq!(DomainState::assess(true, Some(&valid), now), DomainState::Complete);
    }

    #[test]
    fn test_watched_names_skip_manual() {
        let mut manual = ManagedDomain::new("manual.org");
        manual.drive_mode = DriveMode::Manual;
        let mut always = ManagedDomain::new("always.org");
        always.drive_mode = DriveMode::Always;
        let registry = DomainRegistry::new(vec![ManagedDomain::new("auto.org"), manual, always]);

        assert_eq!(registry.watched_names(), vec!["auto.org", "always.org"]);
        assert!(registry.contains("manual.org"));
        assert!(registry.get("other.org").is_none());
    }
}
