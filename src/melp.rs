//! MELP hierarchy
//!
//! `Melp 1→N Result 1→N Indicator 1→{N Monitoring, N Risk}` and
//! `Melp 1→N Outcome 1→N ProgressMarker`. A MELP keeps at least one live
//! result and a result keeps at least one live indicator; both are enforced
//! when deleting, see [`crate::cascade`].
use crate::cascade::{Buryable, Tombstone};
use crate::error::WorkflowError;
use crate::store::Document;
use crate::types::Timestamp;
use crate::utils::new_business_id;

/// Bookkeeping common to every child node.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct NodeMeta {
    #[n(0)]
    pub business_id: String,
    #[n(1)]
    pub parent_id: String,
    #[n(2)]
    is_deleted: bool,
    #[n(3)]
    pub updated_by: String,
    #[n(4)]
    pub updated_at: Timestamp,
    #[n(5)]
    revision: u64,
}

impl NodeMeta {
    fn new(hrp: &str, parent_id: &str, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            business_id: new_business_id(hrp)?,
            parent_id: parent_id.to_string(),
            is_deleted: false,
            updated_by: by.to_string(),
            updated_at: Timestamp::now(),
            revision: 0,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub(crate) fn touch(&mut self, by: &str) {
        self.updated_by = by.to_string();
        self.updated_at = Timestamp::now();
    }

    fn bury(&mut self, by: &str) {
        self.is_deleted = true;
        self.touch(by);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ResultNode {
    #[n(0)]
    pub meta: NodeMeta,
    #[n(1)]
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Indicator {
    #[n(0)]
    pub meta: NodeMeta,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub unit: Option<String>,
    #[n(3)]
    pub baseline: Option<String>,
    #[n(4)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Monitoring {
    #[n(0)]
    pub meta: NodeMeta,
    #[n(1)]
    pub period: String,
    #[n(2)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Risk {
    #[n(0)]
    pub meta: NodeMeta,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Outcome {
    #[n(0)]
    pub meta: NodeMeta,
    #[n(1)]
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ProgressMarker {
    #[n(0)]
    pub meta: NodeMeta,
    #[n(1)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorDraft {
    pub name: String,
    pub unit: Option<String>,
    pub baseline: Option<String>,
    pub target: Option<String>,
}

/// A result is always created together with its first indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDraft {
    pub statement: String,
    pub indicator: IndicatorDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringDraft {
    pub period: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskDraft {
    pub description: String,
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeDraft {
    pub statement: String,
    pub markers: Vec<String>,
}

impl IndicatorDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: None,
            baseline: None,
            target: None,
        }
    }
    pub fn set_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
    pub fn set_baseline(mut self, baseline: impl Into<String>) -> Self {
        self.baseline = Some(baseline.into());
        self
    }
    pub fn set_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl ResultDraft {
    pub fn new(statement: impl Into<String>, indicator: IndicatorDraft) -> Self {
        Self {
            statement: statement.into(),
            indicator,
        }
    }
}

impl OutcomeDraft {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            markers: vec![],
        }
    }
    pub fn add_marker(mut self, description: impl Into<String>) -> Self {
        self.markers.push(description.into());
        self
    }
}

impl ResultNode {
    pub(crate) fn new(melp_id: &str, statement: &str, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            meta: NodeMeta::new("result_", melp_id, by)?,
            statement: statement.to_string(),
        })
    }
}

impl Indicator {
    pub(crate) fn new(result_id: &str, draft: IndicatorDraft, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            meta: NodeMeta::new("indicator_", result_id, by)?,
            name: draft.name,
            unit: draft.unit,
            baseline: draft.baseline,
            target: draft.target,
        })
    }

    pub(crate) fn apply(&mut self, draft: IndicatorDraft, by: &str) {
        self.name = draft.name;
        self.unit = draft.unit;
        self.baseline = draft.baseline;
        self.target = draft.target;
        self.meta.touch(by);
    }
}

impl Monitoring {
    pub(crate) fn new(indicator_id: &str, draft: MonitoringDraft, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            meta: NodeMeta::new("monitoring_", indicator_id, by)?,
            period: draft.period,
            value: draft.value,
        })
    }
}

impl Risk {
    pub(crate) fn new(indicator_id: &str, draft: RiskDraft, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            meta: NodeMeta::new("risk_", indicator_id, by)?,
            description: draft.description,
            mitigation: draft.mitigation,
        })
    }
}

impl Outcome {
    pub(crate) fn new(melp_id: &str, statement: &str, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            meta: NodeMeta::new("outcome_", melp_id, by)?,
            statement: statement.to_string(),
        })
    }
}

impl ProgressMarker {
    pub(crate) fn new(outcome_id: &str, description: &str, by: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            meta: NodeMeta::new("marker_", outcome_id, by)?,
            description: description.to_string(),
        })
    }
}

macro_rules! node_document {
    ($node:ty, $collection:literal) => {
        impl Document for $node {
            const COLLECTION: &'static str = $collection;

            fn business_id(&self) -> &str {
                &self.meta.business_id
            }
            fn scope(&self) -> Option<&str> {
                Some(&self.meta.parent_id)
            }
            fn is_deleted(&self) -> bool {
                self.meta.is_deleted()
            }
            fn revision(&self) -> u64 {
                self.meta.revision
            }
            fn set_revision(&mut self, revision: u64) {
                self.meta.revision = revision;
            }
        }

        impl Buryable for $node {
            fn bury(&mut self, _: &Tombstone, by: &str) {
                self.meta.bury(by);
            }
        }
    };
}

node_document!(ResultNode, "result");
node_document!(Indicator, "indicator");
node_document!(Monitoring, "monitoring");
node_document!(Risk, "risk");
node_document!(Outcome, "outcome");
node_document!(ProgressMarker, "marker");
