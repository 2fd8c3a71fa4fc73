//! Store manifests: a TOML description of users, collections and documents
//! used to populate an in-memory [`Store`].
//!
//! ```toml
//! [[users]]
//! name = "editor"
//! groups = ["staff"]
//!
//! [[collections]]
//! uri = "/db/reports"
//! owner = "editor"
//! group = "staff"
//! mode = "0750"
//!
//! [[documents]]
//! path = "/db/reports/q1.xml"
//! mode = "0640"
//!
//! [[documents]]
//! path = "/db/reports/logo.png"
//! type = "binary"
//! ```

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use xqdb_core::security::{ADMIN_USER, DBA_GROUP};
use xqdb_core::{CollectionUri, Permission, ResourceType, Settings, Store, Subject};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub users: Vec<UserEntry>,
    pub collections: Vec<CollectionEntry>,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEntry {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub dba: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionEntry {
    pub uri: String,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentEntry {
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: DocumentKind,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Xml,
    Binary,
}

impl From<DocumentKind> for ResourceType {
    fn from(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Xml => ResourceType::Xml,
            DocumentKind::Binary => ResourceType::Binary,
        }
    }
}

/// Unset owner and group fall back to `admin` and `dba`.
fn permission(
    owner: Option<&str>,
    group: Option<&str>,
    mode: Option<&str>,
    default_mode: u32,
) -> anyhow::Result<Permission> {
    let mode = mode.map(parse_mode).transpose()?.unwrap_or(default_mode);
    Ok(Permission::new(owner.unwrap_or(ADMIN_USER), group.unwrap_or(DBA_GROUP), mode))
}

/// Parses `"0755"`, `"755"` or `"0o755"`.
pub fn parse_mode(text: &str) -> anyhow::Result<u32> {
    let digits = text.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8).with_context(|| format!("invalid octal mode '{text}'"))?;
    if mode > 0o777 {
        bail!("mode '{text}' is out of range");
    }
    Ok(mode)
}

impl Manifest {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).context("invalid store manifest")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading store manifest {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Creates a store configured by `settings` and fills it. Collections
    /// are created before documents; missing ancestors inherit the
    /// permissions of the first collection created below them.
    pub fn build_store(&self, settings: &Settings) -> anyhow::Result<Store> {
        let store = Store::with_settings(settings);
        for user in &self.users {
            let mut subject = if user.dba { Subject::dba(user.name.as_str()) } else { Subject::new(user.name.as_str()) };
            for group in &user.groups {
                subject = subject.with_group(group.as_str());
            }
            store.register_user(subject);
        }
        for entry in &self.collections {
            let uri = CollectionUri::parse(&entry.uri)?;
            let permission =
                permission(entry.owner.as_deref(), entry.group.as_deref(), entry.mode.as_deref(), 0o755)?;
            store.create_collection(&uri, permission);
        }
        for entry in &self.documents {
            let permission = permission(
                entry.owner.as_deref(),
                entry.group.as_deref(),
                entry.mode.as_deref(),
                Permission::DEFAULT_MODE,
            )?;
            store
                .store_document(&entry.path, entry.kind.into(), permission)
                .with_context(|| format!("storing {}", entry.path))?;
        }
        debug!(
            users = self.users.len(),
            collections = self.collections.len(),
            documents = store.document_count(),
            "store populated from manifest"
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use xqdb_core::AccessMode;

    #[rstest]
    #[case("0755", 0o755)]
    #[case("640", 0o640)]
    #[case("0o700", 0o700)]
    fn modes_are_octal(#[case] text: &str, #[case] expected: u32) {
        assert_eq!(parse_mode(text).unwrap(), expected);
    }

    #[rstest]
    #[case("0999")]
    #[case("7777")]
    #[case("rwx")]
    fn bad_modes_are_rejected(#[case] text: &str) {
        assert!(parse_mode(text).is_err());
    }

    #[rstest]
    fn builds_users_collections_and_documents() {
        let manifest = Manifest::from_toml_str(
            r#"
            [[users]]
            name = "editor"
            groups = ["staff"]

            [[collections]]
            uri = "/db/reports/2024"
            owner = "editor"
            group = "staff"
            mode = "0750"

            [[documents]]
            path = "/db/reports/2024/q1.xml"
            owner = "editor"

            [[documents]]
            path = "/db/reports/2024/logo.png"
            type = "binary"
            "#,
        )
        .unwrap();
        let store = manifest.build_store(&Settings::default()).unwrap();

        let editor = store.user("editor").unwrap();
        assert!(editor.in_group("staff"));
        let reports = store.collection(&CollectionUri::parse("/db/reports/2024").unwrap()).unwrap();
        assert!(reports.permissions().validate(&editor, AccessMode::READ));
        assert!(!reports.permissions().validate(&Subject::guest(), AccessMode::READ));
        assert!(store.collection(&CollectionUri::parse("/db/reports").unwrap()).is_some());

        let logo = store.document_by_path("/db/reports/2024/logo.png").unwrap();
        assert!(!logo.is_xml());
        let q1 = store.document_by_path("/db/reports/2024/q1.xml").unwrap();
        assert_eq!(q1.permissions().owner(), "editor");
        assert_eq!(q1.permissions().mode(), Permission::DEFAULT_MODE);
    }

    #[rstest]
    fn documents_need_an_existing_collection() {
        let manifest = Manifest::from_toml_str("[[documents]]\npath = \"/db/missing/a.xml\"").unwrap();
        let err = manifest.build_store(&Settings::default()).unwrap_err();
        assert!(format!("{err:#}").contains("/db/missing/a.xml"), "{err:#}");
    }

    #[rstest]
    fn unknown_keys_are_rejected() {
        assert!(Manifest::from_toml_str("[[users]]\nname = \"x\"\nrole = \"admin\"").is_err());
    }
}
