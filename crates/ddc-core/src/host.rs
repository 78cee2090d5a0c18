use serde::{Deserialize, Serialize};
use std::fmt;

/// The two node roles in the target cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coordinator,
    Executor,
}

impl Role {
    pub fn is_coordinator(&self) -> bool {
        matches!(self, Role::Coordinator)
    }

    /// Staging sub-directory holding every host of this role.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Role::Coordinator => "coordinators",
            Role::Executor => "executors",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::Executor => write!(f, "executor"),
        }
    }
}

/// A resolved, addressable node. The identifier is backend specific:
/// an IP or hostname for ssh, a pod name for kubectl, a container name for docker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Host {
    pub identifier: String,
    pub role: Role,
}

impl Host {
    pub fn new(identifier: impl Into<String>, role: Role) -> Self {
        Self {
            identifier: identifier.into(),
            role,
        }
    }

    /// Identifier with path separators replaced so it can name a directory.
    pub fn dir_name(&self) -> String {
        path_safe(&self.identifier)
    }
}

/// Replace path separators so user-supplied text stays a single path component.
pub fn path_safe(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identifier, self.role)
    }
}

/// User-supplied label, address list or name pattern for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub raw: String,
    pub role: Role,
}

impl Selector {
    pub fn new(raw: impl Into<String>, role: Role) -> Self {
        Self {
            raw: raw.into(),
            role,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}
