//! Principals and unix-style access permissions.

use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Access requested on a resource, using the classic `rwx` bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u32 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXECUTE = 0b001;
    }
}

pub const ADMIN_USER: &str = "admin";
pub const DBA_GROUP: &str = "dba";
pub const GUEST_USER: &str = "guest";
pub const GUEST_GROUP: &str = "guest";

/// The principal a query or store operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    name: Arc<str>,
    groups: Vec<Arc<str>>,
    dba: bool,
}

impl Subject {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into(), groups: Vec::new(), dba: false }
    }

    pub fn guest() -> Self {
        Self::new(GUEST_USER).with_group(GUEST_GROUP)
    }

    /// A database administrator; bypasses every permission check.
    pub fn dba(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into(), groups: vec![Arc::from(DBA_GROUP)], dba: true }
    }

    pub fn with_group(mut self, group: impl Into<Arc<str>>) -> Self {
        let group = group.into();
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(AsRef::as_ref)
    }

    pub fn is_dba(&self) -> bool {
        self.dba
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.as_ref() == group)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Owner, group and `0o777`-style mode bits of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    owner: Arc<str>,
    group: Arc<str>,
    mode: u32,
}

impl Permission {
    pub const DEFAULT_MODE: u32 = 0o644;

    pub fn new(owner: impl Into<Arc<str>>, group: impl Into<Arc<str>>, mode: u32) -> Self {
        Self { owner: owner.into(), group: group.into(), mode: mode & 0o777 }
    }

    /// Default permission for a resource created by `subject`.
    pub fn owned_by(subject: &Subject) -> Self {
        let group = subject.groups.first().cloned().unwrap_or_else(|| Arc::from(GUEST_GROUP));
        Self { owner: subject.name.clone(), group, mode: Self::DEFAULT_MODE }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Checks whether `subject` is granted every bit of `requested`.
    ///
    /// Administrators always pass. Otherwise exactly one class of bits
    /// applies: the user bits for the owner, the group bits for members of
    /// the owning group, the "other" bits for everyone else.
    pub fn validate(&self, subject: &Subject, requested: AccessMode) -> bool {
        if subject.is_dba() {
            return true;
        }
        let bits = if subject.name() == self.owner.as_ref() {
            self.mode >> 6
        } else if subject.in_group(&self.group) {
            self.mode >> 3
        } else {
            self.mode
        };
        AccessMode::from_bits_truncate(bits & 0o7).contains(requested)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {:03o}", self.owner, self.group, self.mode)
    }
}
