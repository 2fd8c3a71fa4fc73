//! Static database settings, read once from a TOML file.
//!
//! ```toml
//! [lock-manager]
//! timeout-ms = 30000
//! upgrade-check = false
//! warn-wait-on-read-for-write = false
//!
//! [xquery]
//! enable-query-rewriting = true
//! raise-error-on-failed-retrieval = false
//! check-permissions = true
//!
//! [security]
//! default-user = "guest"
//! ```

use crate::lock::LockOptions;
use crate::security::GUEST_USER;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    pub lock_manager: LockManagerSettings,
    pub xquery: XQuerySettings,
    pub security: SecuritySettings,
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| SettingsError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LockManagerSettings {
    /// Milliseconds to wait for a document lock; `0` waits indefinitely.
    pub timeout_ms: u64,
    pub upgrade_check: bool,
    pub warn_wait_on_read_for_write: bool,
}

impl Default for LockManagerSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000, upgrade_check: false, warn_wait_on_read_for_write: false }
    }
}

impl LockManagerSettings {
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
            upgrade_check: self.upgrade_check,
            warn_wait_on_read_for_write: self.warn_wait_on_read_for_write,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct XQuerySettings {
    pub enable_query_rewriting: bool,
    pub raise_error_on_failed_retrieval: bool,
    pub check_permissions: bool,
}

impl Default for XQuerySettings {
    fn default() -> Self {
        Self { enable_query_rewriting: true, raise_error_on_failed_retrieval: false, check_permissions: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SecuritySettings {
    pub default_user: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self { default_user: GUEST_USER.to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.lock_manager.lock_options().timeout, Some(Duration::from_secs(30)));
        assert!(settings.xquery.check_permissions);
        assert_eq!(settings.security.default_user, "guest");
    }

    #[rstest]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [lock-manager]
            upgrade-check = true

            [xquery]
            raise-error-on-failed-retrieval = true
            "#,
        )
        .unwrap();
        let options = settings.lock_manager.lock_options();
        assert!(options.upgrade_check);
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
        assert!(settings.xquery.raise_error_on_failed_retrieval);
        assert!(settings.xquery.enable_query_rewriting);
    }

    #[rstest]
    fn zero_timeout_waits_indefinitely() {
        let settings = Settings::from_toml_str("[lock-manager]\ntimeout-ms = 0\n").unwrap();
        assert_eq!(settings.lock_manager.lock_options().timeout, None);
    }

    #[rstest]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_toml_str("[xquery]\nenable-rewriting = true\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
