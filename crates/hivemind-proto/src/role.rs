//! Role definitions - the configured responsibilities workers take on.

use serde::{Deserialize, Serialize};

use crate::RoleName;

/// A file the worker fetches when installing a role payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    /// Install path on the worker
    pub path: String,
    /// Where the worker fetches the file from (opaque to the core)
    pub source: String,
}

/// A named responsibility bound to exactly one node per session.
///
/// Immutable once the cluster starts. Order matters: the i-th configured
/// role is offered to the i-th discovered node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: RoleName,
    #[serde(default)]
    pub description: String,
    /// Payload files the worker installs before acking the role
    #[serde(default)]
    pub manifest: Vec<FileRef>,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: RoleName::new(name),
            description: String::new(),
            manifest: Vec::new(),
        }
    }
}
