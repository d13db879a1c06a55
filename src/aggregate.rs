//! Aggregate roots: proposals, MELPs and reports
use crate::actor::Owner;
use crate::cascade::{Buryable, Tombstone};
use crate::error::WorkflowError;
use crate::ownership::Ownership;
use crate::search::{SortValue, Sortable};
use crate::status::{StatusName, StatusRef};
use crate::store::Document;
use crate::tabs::{Tab, TabFlags};
use crate::types::Timestamp;
use crate::utils::new_business_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum AggregateKind {
    #[n(0)]
    Proposal,
    #[n(1)]
    Melp,
    #[n(2)]
    Report,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Proposal => "proposal",
            AggregateKind::Melp => "melp",
            AggregateKind::Report => "report",
        }
    }

    fn hrp(&self) -> &'static str {
        match self {
            AggregateKind::Proposal => "proposal_",
            AggregateKind::Melp => "melp_",
            AggregateKind::Report => "report_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum ReportKind {
    #[n(0)]
    Output,
    #[n(1)]
    Outcome,
}

/// Family-specific identity of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Family {
    #[n(0)]
    Proposal {
        #[n(0)]
        activity_id: String,
    },
    #[n(1)]
    Melp {
        #[n(0)]
        year: u16,
    },
    #[n(2)]
    Report {
        #[n(0)]
        kind: ReportKind,
        #[n(1)]
        year: u16,
    },
}

impl Family {
    pub fn kind(&self) -> AggregateKind {
        match self {
            Family::Proposal { .. } => AggregateKind::Proposal,
            Family::Melp { .. } => AggregateKind::Melp,
            Family::Report { .. } => AggregateKind::Report,
        }
    }

    pub fn year(&self) -> Option<u16> {
        match self {
            Family::Proposal { .. } => None,
            Family::Melp { year } | Family::Report { year, .. } => Some(*year),
        }
    }
}

/// First step: core identity fields.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct BasicInfo {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub code: Option<String>,
    #[n(2)]
    pub summary: Option<String>,
}

/// Second step: financial detail. Amounts are in minor units.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Financials {
    #[n(0)]
    pub currency: String,
    #[n(1)]
    pub requested_amount: u64,
    #[n(2)]
    pub co_funding_amount: u64,
}

/// Third step: supplementary information.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AdditionalInfo {
    #[n(0)]
    pub remarks: String,
    #[n(1)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Aggregate {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub business_id: String,
    #[n(2)]
    pub owner: Owner,
    #[n(3)]
    pub institute_name: String,
    #[n(4)]
    pub status: StatusRef,
    #[n(5)]
    is_deleted: bool,
    #[n(6)]
    pub tabs: TabFlags,
    #[n(7)]
    pub family: Family,
    #[n(8)]
    pub basic_info: Option<BasicInfo>,
    #[n(9)]
    pub financials: Option<Financials>,
    #[n(10)]
    pub additional_info: Option<AdditionalInfo>,
    #[n(11)]
    pub created_by: String,
    #[n(12)]
    pub updated_by: String,
    #[n(13)]
    pub created_at: Timestamp,
    #[n(14)]
    pub updated_at: Timestamp,
    #[n(15)]
    pub submitted_at: Option<Timestamp>,
    #[n(16)]
    pub approved_at: Option<Timestamp>,
    #[n(17)]
    pub approved_count: u32,
    #[n(18)]
    revision: u64,
}

impl Aggregate {
    pub(crate) fn new(
        id: u64,
        family: Family,
        ownership: Ownership,
        created_by: &str,
    ) -> Result<Self, WorkflowError> {
        let now = Timestamp::now();
        // central submissions are born approved
        let approved_at = ownership
            .initial_status
            .is(StatusName::Approved)
            .then_some(now);

        Ok(Self {
            id,
            business_id: new_business_id(family.kind().hrp())?,
            owner: ownership.owner,
            institute_name: ownership.institute_name,
            status: ownership.initial_status,
            is_deleted: false,
            tabs: TabFlags::default(),
            family,
            basic_info: None,
            financials: None,
            additional_info: None,
            created_by: created_by.to_string(),
            updated_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at,
            approved_count: 0,
            revision: 0,
        })
    }

    pub fn kind(&self) -> AggregateKind {
        self.family.kind()
    }

    pub fn status_name(&self) -> StatusName {
        self.status.name()
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub(crate) fn touch(&mut self, by: &str) {
        self.updated_by = by.to_string();
        self.updated_at = Timestamp::now();
    }

    pub(crate) fn complete_tab(&mut self, tab: Tab) -> bool {
        self.tabs.complete(tab)
    }

    /// Move to `status`, stamping the submitted/approved time the first time it is reached.
    pub(crate) fn transition(&mut self, status: StatusRef, by: &str) {
        self.touch(by);
        if status.is(StatusName::Submitted) && self.submitted_at.is_none() {
            self.submitted_at = Some(self.updated_at);
        }
        if status.is(StatusName::Approved) && self.approved_at.is_none() {
            self.approved_at = Some(self.updated_at);
        }
        self.status = status;
    }
}

impl Document for Aggregate {
    const COLLECTION: &'static str = "aggregate";

    fn business_id(&self) -> &str {
        &self.business_id
    }
    fn scope(&self) -> Option<&str> {
        Some(self.kind().as_str())
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

impl Buryable for Aggregate {
    fn bury(&mut self, _: &Tombstone, by: &str) {
        self.is_deleted = true;
        self.touch(by);
    }
}

impl Sortable for Aggregate {
    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "updatedAt" => SortValue::Time(self.updated_at),
            "createdAt" => SortValue::Time(self.created_at),
            "instituteName" => SortValue::Text(self.institute_name.to_lowercase()),
            "status" => SortValue::Text(self.status_name().as_str().to_string()),
            "year" => self
                .family
                .year()
                .map_or(SortValue::Missing, |year| SortValue::Number(i64::from(year))),
            "name" => self
                .basic_info
                .as_ref()
                .map_or(SortValue::Missing, |info| SortValue::Text(info.name.to_lowercase())),
            "code" => self
                .basic_info
                .as_ref()
                .and_then(|info| info.code.as_ref())
                .map_or(SortValue::Missing, |code| SortValue::Text(code.to_lowercase())),
            _ => SortValue::Missing,
        }
    }
}
