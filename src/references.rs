//! Cross-aggregate references
//!
//! Activities and activity proposals point at the results and indicators they
//! are measured against. While such a link is live the referenced node cannot
//! be edited or deleted.
use crate::actor::Owner;
use crate::error::WorkflowError;

pub trait ReferenceLookup: Send + Sync {
    /// `owner` is the institute owning the MELP the result belongs to.
    fn is_result_referenced(&self, result_id: &str, owner: &Owner) -> Result<bool, WorkflowError>;
    fn is_indicator_referenced(&self, indicator_id: &str, owner: &Owner) -> Result<bool, WorkflowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum LinkSource {
    #[n(0)]
    Activity,
    #[n(1)]
    ActivityProposal,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct WorkplanLink {
    #[n(0)]
    pub business_id: String,
    #[n(1)]
    pub source: LinkSource,
    #[n(2)]
    pub owner: Owner,
    #[n(3)]
    pub result_ids: Vec<String>,
    #[n(4)]
    pub indicator_ids: Vec<String>,
    #[n(5)]
    pub is_deleted: bool,
}

impl WorkplanLink {
    pub fn new(business_id: impl Into<String>, source: LinkSource, owner: Owner) -> Self {
        Self {
            business_id: business_id.into(),
            source,
            owner,
            result_ids: vec![],
            indicator_ids: vec![],
            is_deleted: false,
        }
    }
    pub fn add_result(mut self, result_id: impl Into<String>) -> Self {
        self.result_ids.push(result_id.into());
        self
    }
    pub fn add_indicator(mut self, indicator_id: impl Into<String>) -> Self {
        self.indicator_ids.push(indicator_id.into());
        self
    }
}

/// Links kept in the `workplan_links` tree, keyed by the activity's business id.
#[derive(Clone)]
pub struct WorkplanLinks {
    tree: sled::Tree,
}

impl WorkplanLinks {
    pub const TREE: &'static str = "workplan_links";

    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            tree: db.open_tree(Self::TREE)?,
        })
    }

    pub fn upsert(&self, link: &WorkplanLink) -> Result<(), WorkflowError> {
        let encoded = minicbor::to_vec(link).map_err(WorkflowError::codec)?;
        self.tree.insert(link.business_id.as_bytes(), encoded)?;
        Ok(())
    }

    /// Soft-delete a link so it no longer freezes anything.
    pub fn retire(&self, business_id: &str) -> Result<bool, WorkflowError> {
        let Some(raw) = self.tree.get(business_id)? else {
            return Ok(false);
        };
        let mut link: WorkplanLink = minicbor::decode(&raw).map_err(WorkflowError::codec)?;
        link.is_deleted = true;
        self.upsert(&link)?;
        Ok(true)
    }

    fn any_live(&self, owner: &Owner, matches: impl Fn(&WorkplanLink) -> bool) -> Result<bool, WorkflowError> {
        for entry in self.tree.iter() {
            let (_, raw) = entry?;
            let link: WorkplanLink = minicbor::decode(&raw).map_err(WorkflowError::codec)?;
            if !link.is_deleted && &link.owner == owner && matches(&link) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl ReferenceLookup for WorkplanLinks {
    fn is_result_referenced(&self, result_id: &str, owner: &Owner) -> Result<bool, WorkflowError> {
        self.any_live(owner, |link| link.result_ids.iter().any(|id| id == result_id))
    }

    fn is_indicator_referenced(&self, indicator_id: &str, owner: &Owner) -> Result<bool, WorkflowError> {
        self.any_live(owner, |link| link.indicator_ids.iter().any(|id| id == indicator_id))
    }
}
