use crate::status::StatusName;
use crate::tabs::TabFlags;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{0} was not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transition refused: {0}")]
    InvalidTransition(TransitionRefusal),
    #[error("cascade refused: {0}")]
    CascadeViolation(CascadeReason),
    #[error("invalid actor: {0}")]
    InvalidActor(String),
    #[error("status {0} has not been seeded")]
    Configuration(String),
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
    #[error("search pattern could not be compiled: {0}")]
    InvalidQuery(String),
    #[error("encoding failed: {0}")]
    Codec(String),
    #[error(transparent)]
    Store(#[from] sled::Error),
}

/// Why the Mutability Guard or Tab-Completion Tracker refused a change.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionRefusal {
    #[error("record cannot be changed while {0}")]
    NotEditableInCurrentStatus(StatusName),
    #[error("submission steps incomplete {0}")]
    TabsIncomplete(TabFlags),
    #[error("only central reviewers may review a submission")]
    ReviewerRequired,
    #[error("record is {0}, not awaiting review")]
    NotAwaitingReview(StatusName),
}

/// Why the Cascade Invariant Checker refused a structural change.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeReason {
    #[error("the last remaining child cannot be removed")]
    LastChildViolation,
    #[error("the element is referenced by an activity or activity proposal")]
    ReferencedElsewhere,
    #[error("sibling elements must be removed individually first")]
    TooManySiblings,
}

impl WorkflowError {
    pub(crate) fn codec(err: impl std::fmt::Display) -> Self {
        WorkflowError::Codec(err.to_string())
    }
}

impl From<CascadeReason> for WorkflowError {
    fn from(reason: CascadeReason) -> Self {
        WorkflowError::CascadeViolation(reason)
    }
}

impl From<TransitionRefusal> for WorkflowError {
    fn from(refusal: TransitionRefusal) -> Self {
        WorkflowError::InvalidTransition(refusal)
    }
}
