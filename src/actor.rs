//! Actors and institute ownership
use crate::error::WorkflowError;
use crate::types::{NetworkRef, PartnerRef};

/// The institute that owns a record or that a user belongs to.
///
/// Network and partner affiliation are mutually exclusive; `Central` is the
/// capnet body itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Owner {
    #[n(0)]
    Central,
    #[n(1)]
    Network(#[n(0)] NetworkRef),
    #[n(2)]
    Partner(#[n(0)] PartnerRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClass {
    Central,
    Affiliate,
}

impl Owner {
    /// Build an owner from the optional references an identity provider hands over.
    pub fn from_refs(
        network: Option<NetworkRef>,
        partner: Option<PartnerRef>,
    ) -> Result<Self, WorkflowError> {
        match (network, partner) {
            (None, None) => Ok(Owner::Central),
            (Some(network), None) => Ok(Owner::Network(network)),
            (None, Some(partner)) => Ok(Owner::Partner(partner)),
            (Some(network), Some(partner)) => Err(WorkflowError::InvalidActor(format!(
                "both network {network} and partner {partner} are set"
            ))),
        }
    }

    pub fn role(&self) -> RoleClass {
        match self {
            Owner::Central => RoleClass::Central,
            Owner::Network(_) | Owner::Partner(_) => RoleClass::Affiliate,
        }
    }

    pub fn network(&self) -> Option<&NetworkRef> {
        match self {
            Owner::Network(network) => Some(network),
            _ => None,
        }
    }

    pub fn partner(&self) -> Option<&PartnerRef> {
        match self {
            Owner::Partner(partner) => Some(partner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub owner: Owner,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, owner: Owner) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            owner,
        }
    }

    pub fn central(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, Owner::Central)
    }

    pub fn network(
        id: impl Into<String>,
        display_name: impl Into<String>,
        network: NetworkRef,
    ) -> Self {
        Self::new(id, display_name, Owner::Network(network))
    }

    pub fn partner(
        id: impl Into<String>,
        display_name: impl Into<String>,
        partner: PartnerRef,
    ) -> Self {
        Self::new(id, display_name, Owner::Partner(partner))
    }

    /// Validate raw identity data at the boundary.
    pub fn from_identity(
        id: impl Into<String>,
        display_name: impl Into<String>,
        network: Option<NetworkRef>,
        partner: Option<PartnerRef>,
    ) -> Result<Self, WorkflowError> {
        let owner = Owner::from_refs(network, partner)?;
        Ok(Self::new(id, display_name, owner))
    }

    pub fn role(&self) -> RoleClass {
        self.owner.role()
    }

    pub fn is_central(&self) -> bool {
        self.role() == RoleClass::Central
    }
}
