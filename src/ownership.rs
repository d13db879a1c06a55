//! Ownership Resolver
//!
//! Decides which institute name is stamped on a new aggregate and the status it
//! starts in. Central submissions start approved, network and partner
//! submissions start in progress.
use std::sync::Arc;

use tracing::error;

use crate::actor::{Actor, Owner};
use crate::error::WorkflowError;
use crate::status::{StatusName, StatusRef, StatusRegistry};
use crate::types::{NetworkRef, PartnerRef};

pub const CENTRAL_INSTITUTE: &str = "CAPNET";

/// Name lookup for networks and partners.
pub trait InstituteDirectory: Send + Sync {
    fn network_name(&self, network: &NetworkRef) -> Result<Option<String>, WorkflowError>;
    fn partner_name(&self, partner: &PartnerRef) -> Result<Option<String>, WorkflowError>;
}

/// Directory kept in the `institutes` tree, keyed by `network/<id>` and `partner/<id>`.
#[derive(Clone)]
pub struct SledDirectory {
    tree: sled::Tree,
}

impl SledDirectory {
    pub const TREE: &'static str = "institutes";

    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            tree: db.open_tree(Self::TREE)?,
        })
    }

    pub fn register_network(&self, network: &NetworkRef, name: &str) -> Result<(), WorkflowError> {
        self.tree
            .insert(format!("network/{network}"), name.as_bytes())?;
        Ok(())
    }

    pub fn register_partner(&self, partner: &PartnerRef, name: &str) -> Result<(), WorkflowError> {
        self.tree
            .insert(format!("partner/{partner}"), name.as_bytes())?;
        Ok(())
    }

    fn lookup(&self, key: String) -> Result<Option<String>, WorkflowError> {
        match self.tree.get(key)? {
            Some(raw) => String::from_utf8(raw.to_vec())
                .map(Some)
                .map_err(WorkflowError::codec),
            None => Ok(None),
        }
    }
}

impl InstituteDirectory for SledDirectory {
    fn network_name(&self, network: &NetworkRef) -> Result<Option<String>, WorkflowError> {
        self.lookup(format!("network/{network}"))
    }

    fn partner_name(&self, partner: &PartnerRef) -> Result<Option<String>, WorkflowError> {
        self.lookup(format!("partner/{partner}"))
    }
}

/// Outcome of resolving a new aggregate's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner: Owner,
    pub institute_name: String,
    pub initial_status: StatusRef,
}

#[derive(Clone)]
pub struct OwnershipResolver {
    directory: Arc<dyn InstituteDirectory>,
    central_name: String,
}

impl OwnershipResolver {
    pub fn new(directory: Arc<dyn InstituteDirectory>, central_name: impl Into<String>) -> Self {
        Self {
            directory,
            central_name: central_name.into(),
        }
    }

    /// Display name of the institute behind `owner`.
    pub fn institute_name(&self, owner: &Owner) -> Result<String, WorkflowError> {
        let name = match owner {
            Owner::Central => return Ok(self.central_name.clone()),
            Owner::Network(network) => self.directory.network_name(network)?,
            Owner::Partner(partner) => self.directory.partner_name(partner)?,
        };

        name.ok_or_else(|| {
            error!(owner = ?owner, "actor belongs to an unregistered institute");
            WorkflowError::InvalidActor(format!("no institute registered for {owner:?}"))
        })
    }

    pub fn initial_status(owner: &Owner) -> StatusName {
        match owner {
            Owner::Central => StatusName::Approved,
            Owner::Network(_) | Owner::Partner(_) => StatusName::InProgress,
        }
    }

    pub fn resolve(
        &self,
        actor: &Actor,
        statuses: &StatusRegistry,
    ) -> Result<Ownership, WorkflowError> {
        let institute_name = self.institute_name(&actor.owner)?;
        let initial_status = statuses.resolve(Self::initial_status(&actor.owner))?;

        Ok(Ownership {
            owner: actor.owner.clone(),
            institute_name,
            initial_status,
        })
    }

    /// Resolve straight from identity-provider references, rejecting a doubly-set actor.
    pub fn resolve_refs(
        &self,
        network: Option<NetworkRef>,
        partner: Option<PartnerRef>,
        statuses: &StatusRegistry,
    ) -> Result<Ownership, WorkflowError> {
        let owner = Owner::from_refs(network, partner).inspect_err(|e| {
            error!(error = %e, "refusing to resolve ownership");
        })?;
        let institute_name = self.institute_name(&owner)?;
        let initial_status = statuses.resolve(Self::initial_status(&owner))?;

        Ok(Ownership {
            owner,
            institute_name,
            initial_status,
        })
    }
}
