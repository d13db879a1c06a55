//! Status Registry
//!
//! Maps the fixed set of workflow statuses to the identifiers persisted in the
//! `statuses` tree. Every other component asks for a status by [`StatusName`]
//! and never embeds an identifier directly.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::WorkflowError;
use crate::utils::new_business_id;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, minicbor::Encode, minicbor::Decode,
)]
pub enum StatusName {
    #[n(0)]
    InProgress,
    #[n(1)]
    Submitted,
    #[n(2)]
    InformationRequested,
    #[n(3)]
    Approved,
    #[n(4)]
    Denied,
}

impl StatusName {
    pub const ALL: [StatusName; 5] = [
        StatusName::InProgress,
        StatusName::Submitted,
        StatusName::InformationRequested,
        StatusName::Approved,
        StatusName::Denied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusName::InProgress => "IN_PROGRESS",
            StatusName::Submitted => "SUBMITTED",
            StatusName::InformationRequested => "INFORMATION_REQUESTED",
            StatusName::Approved => "APPROVED",
            StatusName::Denied => "DENIED",
        }
    }
}

impl fmt::Display for StatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusName {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| WorkflowError::Configuration(s.to_string()))
    }
}

/// A persisted status: the seeded identifier plus the name it was seeded for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub struct StatusRef {
    #[n(0)]
    id: String,
    #[n(1)]
    name: StatusName,
}

impl StatusRef {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> StatusName {
        self.name
    }
    pub fn is(&self, name: StatusName) -> bool {
        self.name == name
    }
}

/// Read-only cache of the seeded statuses. Values never change after seeding.
#[derive(Debug, Clone)]
pub struct StatusRegistry {
    cache: HashMap<StatusName, StatusRef>,
}

impl StatusRegistry {
    pub const TREE: &'static str = "statuses";

    /// Write every status that is not seeded yet. Existing identifiers are kept.
    pub fn seed(db: &sled::Db) -> Result<(), WorkflowError> {
        let tree = db.open_tree(Self::TREE)?;

        for name in StatusName::ALL {
            let status = StatusRef {
                id: new_business_id("status_")?,
                name,
            };
            let encoded = minicbor::to_vec(&status).map_err(WorkflowError::codec)?;

            // only the first writer for a name wins
            let swapped = tree.compare_and_swap(name.as_str(), None::<&[u8]>, Some(encoded))?;
            if swapped.is_ok() {
                info!(status = %name, id = %status.id, "seeded status");
            }
        }
        tree.flush()?;

        Ok(())
    }

    /// Load whatever is seeded. Missing names only fail later, on [`resolve`](Self::resolve).
    pub fn load(db: &sled::Db) -> Result<Self, WorkflowError> {
        let tree = db.open_tree(Self::TREE)?;
        let mut cache = HashMap::new();

        for name in StatusName::ALL {
            if let Some(raw) = tree.get(name.as_str())? {
                let status: StatusRef = minicbor::decode(&raw).map_err(WorkflowError::codec)?;
                cache.insert(name, status);
            } else {
                debug!(status = %name, "status is not seeded");
            }
        }

        Ok(Self { cache })
    }

    pub fn resolve(&self, name: StatusName) -> Result<StatusRef, WorkflowError> {
        self.cache
            .get(&name)
            .cloned()
            .ok_or_else(|| WorkflowError::Configuration(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_their_persisted_spelling() {
        for name in StatusName::ALL {
            assert_eq!(name.as_str().parse::<StatusName>().unwrap(), name);
        }
        assert!("ARCHIVED".parse::<StatusName>().is_err());
    }

    #[test]
    fn seeding_is_stable_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("statuses.db")).unwrap();

        StatusRegistry::seed(&db).unwrap();
        let first = StatusRegistry::load(&db).unwrap();
        StatusRegistry::seed(&db).unwrap();
        let second = StatusRegistry::load(&db).unwrap();

        for name in StatusName::ALL {
            assert_eq!(first.resolve(name).unwrap(), second.resolve(name).unwrap());
            assert_eq!(first.resolve(name).unwrap().name(), name);
        }
    }

    #[test]
    fn unseeded_status_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("empty.db")).unwrap();

        let registry = StatusRegistry::load(&db).unwrap();

        assert!(matches!(
            registry.resolve(StatusName::Approved),
            Err(WorkflowError::Configuration(_))
        ));
    }
}
