//! Service layer API for submission workflow operations
use std::sync::Arc;

use tracing::{debug, info};

use crate::activity_log::ActivityLog;
use crate::actor::{Actor, RoleClass};
use crate::aggregate::{AdditionalInfo, Aggregate, AggregateKind, BasicInfo, Family, Financials, ReportKind};
use crate::cascade::{self, Cascade};
use crate::config::EngineConfig;
use crate::error::{TransitionRefusal, WorkflowError};
use crate::guard::{self, Mutation};
use crate::melp::{Indicator, ResultDraft, ResultNode};
use crate::ownership::{InstituteDirectory, OwnershipResolver, SledDirectory};
use crate::references::{ReferenceLookup, WorkplanLinks};
use crate::status::{StatusName, StatusRegistry};
use crate::store::{DocumentStore, GuardedWrite, Stored};
use crate::tabs::{self, Finalization, Tab, TabFlags};

/// Result of a final-save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    Approved(Aggregate),
    /// Nothing changed; these are the flags as stored.
    Pending(TabFlags),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Deny,
    RequestInformation,
}

impl ReviewDecision {
    fn target(&self) -> StatusName {
        match self {
            ReviewDecision::Approve => StatusName::Approved,
            ReviewDecision::Deny => StatusName::Denied,
            ReviewDecision::RequestInformation => StatusName::InformationRequested,
        }
    }
}

pub struct WorkflowService {
    pub(crate) store: DocumentStore,
    pub(crate) statuses: StatusRegistry,
    pub(crate) ownership: OwnershipResolver,
    pub(crate) references: Arc<dyn ReferenceLookup>,
    pub(crate) log: ActivityLog,
    pub(crate) config: EngineConfig,
}

impl WorkflowService {
    /// Seed statuses and wire the sled-backed directory and reference registry.
    pub fn new(instance: Arc<sled::Db>, config: EngineConfig) -> Result<Self, WorkflowError> {
        let directory = Arc::new(SledDirectory::open(&instance)?);
        let references = Arc::new(WorkplanLinks::open(&instance)?);
        Self::with_collaborators(instance, config, directory, references)
    }

    pub fn with_collaborators(
        instance: Arc<sled::Db>,
        config: EngineConfig,
        directory: Arc<dyn InstituteDirectory>,
        references: Arc<dyn ReferenceLookup>,
    ) -> Result<Self, WorkflowError> {
        StatusRegistry::seed(&instance)?;

        Ok(Self {
            store: DocumentStore::open(&instance)?,
            statuses: StatusRegistry::load(&instance)?,
            ownership: OwnershipResolver::new(directory, config.central_institute_name.clone()),
            references,
            log: ActivityLog::open(&instance)?,
            config,
        })
    }

    pub fn statuses(&self) -> &StatusRegistry {
        &self.statuses
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn ownership(&self) -> &OwnershipResolver {
        &self.ownership
    }

    /// Load a live aggregate.
    pub fn get(&self, business_id: &str) -> Result<Aggregate, WorkflowError> {
        Ok(self.store.find_live::<Aggregate>(business_id)?.into_inner())
    }

    /// Open a proposal for an activity. One live proposal per activity.
    pub fn create_proposal(&self, activity_id: &str, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        let taken = self
            .store
            .find::<Aggregate>(Some(AggregateKind::Proposal.as_str()))?
            .iter()
            .any(|p| matches!(&p.family, Family::Proposal { activity_id: a } if a == activity_id));
        if taken {
            return Err(WorkflowError::Conflict(format!(
                "activity {activity_id} already has a proposal"
            )));
        }

        let family = Family::Proposal {
            activity_id: activity_id.to_string(),
        };
        self.create_aggregate(family, actor)
    }

    /// Open a report. One live report per owner, kind and year.
    pub fn create_report(&self, kind: ReportKind, year: u16, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        let family = Family::Report { kind, year };
        if self.same_family_exists(&family, actor)? {
            return Err(WorkflowError::Conflict(format!(
                "a {kind:?} report for {year} already exists for this institute"
            )));
        }
        self.create_aggregate(family, actor)
    }

    /// Open a MELP together with its first result and that result's first indicator.
    pub fn create_melp(&self, year: u16, first_result: ResultDraft, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        let family = Family::Melp { year };
        if self.same_family_exists(&family, actor)? {
            return Err(WorkflowError::Conflict(format!(
                "a melp for {year} already exists for this institute"
            )));
        }

        let ownership = self.ownership.resolve(actor, &self.statuses)?;
        let melp = Aggregate::new(self.store.generate_id()?, family, ownership, &actor.id)?;
        let result = ResultNode::new(&melp.business_id, &first_result.statement, &actor.id)?;
        let indicator = Indicator::new(result.meta.business_id.as_str(), first_result.indicator, &actor.id)?;

        let mut writes = Vec::new();
        writes.extend(GuardedWrite::create(&melp)?);
        writes.extend(GuardedWrite::create(&result)?);
        writes.extend(GuardedWrite::create(&indicator)?);
        self.store.commit(writes)?;

        info!(
            business_id = %melp.business_id,
            institute = %melp.institute_name,
            status = %melp.status_name(),
            "created melp"
        );
        self.log.record(&self.ownership, actor, &format!("Created MELP for {year}"));

        Ok(melp)
    }

    fn same_family_exists(&self, family: &Family, actor: &Actor) -> Result<bool, WorkflowError> {
        Ok(self
            .store
            .find::<Aggregate>(Some(family.kind().as_str()))?
            .iter()
            .any(|a| &a.family == family && a.owner == actor.owner))
    }

    fn create_aggregate(&self, family: Family, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        let ownership = self.ownership.resolve(actor, &self.statuses)?;
        let aggregate = Aggregate::new(self.store.generate_id()?, family, ownership, &actor.id)?;

        self.store.commit(GuardedWrite::create(&aggregate)?.to_vec())?;

        info!(
            business_id = %aggregate.business_id,
            institute = %aggregate.institute_name,
            status = %aggregate.status_name(),
            "created {}",
            aggregate.kind().as_str()
        );
        self.log.record(
            &self.ownership,
            actor,
            &format!("Created {} {}", aggregate.kind().as_str(), aggregate.business_id),
        );

        Ok(aggregate)
    }

    /// Load an aggregate and check `actor` may apply `mutation` to it.
    pub(crate) fn load_mutable(
        &self,
        business_id: &str,
        actor: &Actor,
        mutation: Mutation,
    ) -> Result<Stored<Aggregate>, WorkflowError> {
        let stored = self.store.find_live::<Aggregate>(business_id)?;
        guard::can_mutate(&stored, actor, mutation)
            .into_result(business_id)
            .inspect_err(|e| debug!(business_id, error = %e, "mutation refused"))?;
        Ok(stored)
    }

    fn save_step(
        &self,
        business_id: &str,
        actor: &Actor,
        tab: Tab,
        apply: impl FnOnce(&mut Aggregate),
    ) -> Result<Aggregate, WorkflowError> {
        let stored = self.load_mutable(business_id, actor, Mutation::Edit)?;

        let mut aggregate = (*stored).clone();
        apply(&mut aggregate);
        let first_time = aggregate.complete_tab(tab);
        aggregate.touch(&actor.id);
        self.store.commit(vec![stored.rewrite(&aggregate)?])?;

        info!(business_id, tab = ?tab, first_time, tabs = %aggregate.tabs, "saved step");
        self.log.record(
            &self.ownership,
            actor,
            &format!("Updated {tab:?} of {} {business_id}", aggregate.kind().as_str()),
        );

        Ok(aggregate)
    }

    /// Step one: core identity fields.
    pub fn edit_basic_info(&self, business_id: &str, info: BasicInfo, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        self.save_step(business_id, actor, Tab::BasicInfo, |a| a.basic_info = Some(info))
    }

    /// Step two: financial detail.
    pub fn add_financials(&self, business_id: &str, financials: Financials, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        self.save_step(business_id, actor, Tab::Financials, |a| a.financials = Some(financials))
    }

    /// Step three: supplementary information.
    pub fn add_additional_info(
        &self,
        business_id: &str,
        info: AdditionalInfo,
        actor: &Actor,
    ) -> Result<Aggregate, WorkflowError> {
        self.save_step(business_id, actor, Tab::AdditionalInfo, |a| {
            a.additional_info = Some(info)
        })
    }

    /// Self-service final save. Approves once every step is done; otherwise hands
    /// the flags back unchanged, whatever the status.
    ///
    /// Incomplete flags are reported before the guard runs, since nothing is
    /// written for them.
    pub fn finalize(&self, business_id: &str, actor: &Actor) -> Result<Finalized, WorkflowError> {
        let stored = self.store.find_live::<Aggregate>(business_id)?;
        if actor.role() == RoleClass::Central {
            return Ok(Finalized::Pending(stored.tabs));
        }

        match tabs::evaluate(stored.tabs, actor) {
            Finalization::Hold(flags) => {
                debug!(business_id, tabs = %flags, "finalize held");
                Ok(Finalized::Pending(flags))
            }
            Finalization::Approve => {
                guard::can_mutate(&stored, actor, Mutation::Edit).into_result(business_id)?;
                let mut aggregate = (*stored).clone();
                aggregate.transition(self.statuses.resolve(StatusName::Approved)?, &actor.id);
                self.store.commit(vec![stored.rewrite(&aggregate)?])?;

                info!(business_id, "finalized");
                self.log.record(
                    &self.ownership,
                    actor,
                    &format!("Finalized {} {business_id}", aggregate.kind().as_str()),
                );
                Ok(Finalized::Approved(aggregate))
            }
        }
    }

    /// Hand a completed submission to central reviewers.
    pub fn submit(&self, business_id: &str, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        let stored = self.load_mutable(business_id, actor, Mutation::Edit)?;
        if actor.is_central() {
            return Err(TransitionRefusal::NotEditableInCurrentStatus(stored.status_name()).into());
        }
        if !stored.tabs.is_complete() {
            return Err(TransitionRefusal::TabsIncomplete(stored.tabs).into());
        }

        let mut aggregate = (*stored).clone();
        aggregate.transition(self.statuses.resolve(StatusName::Submitted)?, &actor.id);
        self.store.commit(vec![stored.rewrite(&aggregate)?])?;

        info!(business_id, "submitted");
        self.log.record(
            &self.ownership,
            actor,
            &format!("Submitted {} {business_id}", aggregate.kind().as_str()),
        );
        Ok(aggregate)
    }

    /// Central review of a submitted record.
    pub fn review(&self, business_id: &str, decision: ReviewDecision, actor: &Actor) -> Result<Aggregate, WorkflowError> {
        if !actor.is_central() {
            return Err(TransitionRefusal::ReviewerRequired.into());
        }
        let stored = self.store.find_live::<Aggregate>(business_id)?;
        if !stored.status.is(StatusName::Submitted) {
            return Err(TransitionRefusal::NotAwaitingReview(stored.status_name()).into());
        }

        let mut aggregate = (*stored).clone();
        aggregate.transition(self.statuses.resolve(decision.target())?, &actor.id);
        self.store.commit(vec![stored.rewrite(&aggregate)?])?;

        info!(business_id, decision = ?decision, "reviewed");
        self.log.record(
            &self.ownership,
            actor,
            &format!(
                "Reviewed {} {business_id}: {}",
                aggregate.kind().as_str(),
                aggregate.status_name()
            ),
        );
        Ok(aggregate)
    }

    /// Soft-delete an aggregate. MELPs go through the hierarchy rules.
    pub fn delete(&self, business_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let stored = self.load_mutable(business_id, actor, Mutation::Delete)?;

        let plan = match stored.kind() {
            AggregateKind::Melp => self.plan_melp_delete(&stored, actor)?,
            AggregateKind::Proposal | AggregateKind::Report => {
                cascade::plan_single_delete(&stored, &actor.id)?
            }
        };
        let buried = self.apply(vec![], plan)?;

        info!(business_id, removed = buried.len(), "deleted {}", stored.kind().as_str());
        self.log.record(
            &self.ownership,
            actor,
            &format!("Deleted {} {business_id}", stored.kind().as_str()),
        );
        Ok(buried)
    }

    /// Commit a planned cascade as one unit.
    /// Commit `cascade` together with the `claims` on the parents it depends on.
    pub(crate) fn apply(&self, claims: Vec<GuardedWrite>, cascade: Cascade) -> Result<Vec<String>, WorkflowError> {
        let buried = cascade.buried().to_vec();
        let mut writes = claims;
        writes.extend(cascade.into_writes());
        self.store.commit(writes)?;
        Ok(buried)
    }
}
