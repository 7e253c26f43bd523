//! Capability model for staging actors
//!
//! Roles map onto a set of capabilities; handlers check capabilities, never roles.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Capabilities that gate staging operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can claim batches of pending proposals
    Claim,
    /// Can record REVIEWED / IGNORED decisions
    Review,
    /// Can delete ignored proposals
    Delete,
    /// Can run the expired-lease sweep
    Reclaim,
    /// Can list every proposal, not only its own claims
    ViewAll,
    /// Can seed proposals
    Import,
    /// Can promote reviewed proposals into production
    Sync,
    /// Full administrative access (includes all other capabilities)
    Admin,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Claim => "claim",
            Capability::Review => "review",
            Capability::Delete => "delete",
            Capability::Reclaim => "reclaim",
            Capability::ViewAll => "view_all",
            Capability::Import => "import",
            Capability::Sync => "sync",
            Capability::Admin => "admin",
        }
    }
}

/// Console roles known to the identity gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SystemAdmin,
    Auditor,
    Annotator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "system_admin",
            Role::Auditor => "auditor",
            Role::Annotator => "annotator",
        }
    }

    pub fn capabilities(&self) -> CapabilitySet {
        match self {
            Role::SystemAdmin => vec![Capability::Admin].into(),
            Role::Auditor => vec![Capability::ViewAll, Capability::Reclaim].into(),
            Role::Annotator => vec![
                Capability::Claim,
                Capability::Review,
                Capability::Delete,
                Capability::Reclaim,
            ]
            .into(),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system_admin" | "admin" => Ok(Role::SystemAdmin),
            "auditor" => Ok(Role::Auditor),
            "annotator" => Ok(Role::Annotator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A set of capabilities with helper methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
}

impl CapabilitySet {
    /// Check if this set contains a capability (respects Admin override)
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&Capability::Admin) || self.capabilities.contains(&cap)
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(capabilities: Vec<Capability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
        }
    }
}
