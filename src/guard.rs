//! Mutability Guard
//!
//! Central users may change any live record. Network and partner users may
//! edit only while a record is in progress or has had information requested,
//! and may additionally discard a denied record.
use crate::actor::{Actor, RoleClass};
use crate::aggregate::Aggregate;
use crate::error::{TransitionRefusal, WorkflowError};
use crate::status::StatusName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Permitted,
    Missing,
    Refused(TransitionRefusal),
}

impl Decision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Decision::Permitted)
    }

    pub fn into_result(self, business_id: &str) -> Result<(), WorkflowError> {
        match self {
            Decision::Permitted => Ok(()),
            Decision::Missing => Err(WorkflowError::NotFound(business_id.to_string())),
            Decision::Refused(refusal) => Err(refusal.into()),
        }
    }
}

/// Statuses in which an affiliated actor may apply `mutation`.
pub fn affiliate_window(mutation: Mutation) -> &'static [StatusName] {
    match mutation {
        Mutation::Edit => &[StatusName::InProgress, StatusName::InformationRequested],
        Mutation::Delete => &[
            StatusName::InProgress,
            StatusName::InformationRequested,
            StatusName::Denied,
        ],
    }
}

pub fn can_mutate(aggregate: &Aggregate, actor: &Actor, mutation: Mutation) -> Decision {
    if aggregate.is_deleted() {
        return Decision::Missing;
    }

    let status = aggregate.status_name();
    match actor.role() {
        RoleClass::Central => Decision::Permitted,
        RoleClass::Affiliate if affiliate_window(mutation).contains(&status) => Decision::Permitted,
        RoleClass::Affiliate => {
            Decision::Refused(TransitionRefusal::NotEditableInCurrentStatus(status))
        }
    }
}
