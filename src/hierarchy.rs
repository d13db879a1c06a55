//! MELP hierarchy operations
//!
//! Every change below a MELP is gated by the MELP's own status. Results and
//! indicators are additionally frozen while an activity or activity proposal
//! references them, whoever the actor is.
//!
//! Each commit claims the MELP, plus the result, indicator, or outcome the
//! change hangs off, so concurrent changes under the same parent serialize:
//! the later one fails with `NotFound` and changes nothing.
use tracing::{debug, info};

use crate::actor::{Actor, Owner};
use crate::aggregate::{Aggregate, AggregateKind};
use crate::cascade::{self, Cascade, IndicatorBranch, ResultBranch};
use crate::error::WorkflowError;
use crate::guard::{self, Mutation};
use crate::melp::{
    Indicator, IndicatorDraft, Monitoring, MonitoringDraft, Outcome, OutcomeDraft, ProgressMarker,
    ResultDraft, ResultNode, Risk, RiskDraft,
};
use crate::service::WorkflowService;
use crate::store::{Document, GuardedWrite, Stored};

impl WorkflowService {
    /// The live MELP `melp_id`, without any permission check.
    fn find_melp(&self, melp_id: &str) -> Result<Stored<Aggregate>, WorkflowError> {
        let melp = self.store.find_live::<Aggregate>(melp_id)?;
        if melp.kind() != AggregateKind::Melp {
            return Err(WorkflowError::NotFound(format!("melp {melp_id}")));
        }
        Ok(melp)
    }

    fn permit(&self, melp: &Stored<Aggregate>, actor: &Actor, mutation: Mutation) -> Result<(), WorkflowError> {
        guard::can_mutate(melp, actor, mutation)
            .into_result(&melp.business_id)
            .inspect_err(|e| debug!(melp = %melp.business_id, error = %e, "hierarchy change refused"))
    }

    fn ensure_result_unreferenced(&self, result_id: &str, owner: &Owner) -> Result<(), WorkflowError> {
        let referenced = self.references.is_result_referenced(result_id, owner)?;
        cascade::check_reference(referenced)
            .inspect_err(|_| debug!(result = result_id, "result is referenced"))?;
        Ok(())
    }

    fn ensure_indicator_unreferenced(&self, indicator_id: &str, owner: &Owner) -> Result<(), WorkflowError> {
        let referenced = self.references.is_indicator_referenced(indicator_id, owner)?;
        cascade::check_reference(referenced)
            .inspect_err(|_| debug!(indicator = indicator_id, "indicator is referenced"))?;
        Ok(())
    }

    fn ensure_branch_unreferenced(&self, branch: &ResultBranch, owner: &Owner) -> Result<(), WorkflowError> {
        self.ensure_result_unreferenced(branch.result.business_id(), owner)?;
        for indicator in &branch.indicators {
            self.ensure_indicator_unreferenced(indicator.indicator.business_id(), owner)?;
        }
        Ok(())
    }

    fn indicator_branch(&self, indicator: Stored<Indicator>) -> Result<IndicatorBranch, WorkflowError> {
        let scope = Some(indicator.business_id());
        Ok(IndicatorBranch {
            monitorings: self.store.find::<Monitoring>(scope)?,
            risks: self.store.find::<Risk>(scope)?,
            indicator,
        })
    }

    fn result_branch(&self, result: Stored<ResultNode>) -> Result<ResultBranch, WorkflowError> {
        let indicators = self
            .store
            .find::<Indicator>(Some(result.business_id()))?
            .into_iter()
            .map(|indicator| self.indicator_branch(indicator))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResultBranch { result, indicators })
    }

    /// Walk from an indicator up to its result and MELP.
    fn indicator_lineage(
        &self,
        indicator_id: &str,
    ) -> Result<(Stored<Indicator>, Stored<ResultNode>, Stored<Aggregate>), WorkflowError> {
        let indicator = self.store.find_live::<Indicator>(indicator_id)?;
        let result = self.store.find_live::<ResultNode>(&indicator.meta.parent_id)?;
        let melp = self.find_melp(&result.meta.parent_id)?;
        Ok((indicator, result, melp))
    }

    pub(crate) fn plan_melp_delete(
        &self,
        melp: &Stored<Aggregate>,
        actor: &Actor,
    ) -> Result<Cascade, WorkflowError> {
        let results = self
            .store
            .find::<ResultNode>(Some(&melp.business_id))?
            .into_iter()
            .map(|result| self.result_branch(result))
            .collect::<Result<Vec<_>, _>>()?;
        let live_outcomes = self.store.count::<Outcome>(Some(&melp.business_id))?;

        for branch in &results {
            self.ensure_branch_unreferenced(branch, &melp.owner)?;
        }
        cascade::plan_melp_delete(melp, &results, live_outcomes, &actor.id)
    }

    pub fn results(&self, melp_id: &str) -> Result<Vec<ResultNode>, WorkflowError> {
        Ok(self
            .store
            .find::<ResultNode>(Some(melp_id))?
            .into_iter()
            .map(Stored::into_inner)
            .collect())
    }

    pub fn indicators(&self, result_id: &str) -> Result<Vec<Indicator>, WorkflowError> {
        Ok(self
            .store
            .find::<Indicator>(Some(result_id))?
            .into_iter()
            .map(Stored::into_inner)
            .collect())
    }

    pub fn monitorings(&self, indicator_id: &str) -> Result<Vec<Monitoring>, WorkflowError> {
        Ok(self
            .store
            .find::<Monitoring>(Some(indicator_id))?
            .into_iter()
            .map(Stored::into_inner)
            .collect())
    }

    pub fn risks(&self, indicator_id: &str) -> Result<Vec<Risk>, WorkflowError> {
        Ok(self
            .store
            .find::<Risk>(Some(indicator_id))?
            .into_iter()
            .map(Stored::into_inner)
            .collect())
    }

    pub fn outcomes(&self, melp_id: &str) -> Result<Vec<Outcome>, WorkflowError> {
        Ok(self
            .store
            .find::<Outcome>(Some(melp_id))?
            .into_iter()
            .map(Stored::into_inner)
            .collect())
    }

    pub fn progress_markers(&self, outcome_id: &str) -> Result<Vec<ProgressMarker>, WorkflowError> {
        Ok(self
            .store
            .find::<ProgressMarker>(Some(outcome_id))?
            .into_iter()
            .map(Stored::into_inner)
            .collect())
    }

    pub fn add_result(&self, melp_id: &str, draft: ResultDraft, actor: &Actor) -> Result<ResultNode, WorkflowError> {
        let melp = self.find_melp(melp_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let result = ResultNode::new(melp_id, &draft.statement, &actor.id)?;
        let indicator = Indicator::new(result.business_id(), draft.indicator, &actor.id)?;
        let mut writes = vec![melp.claim()?];
        writes.extend(GuardedWrite::create(&result)?);
        writes.extend(GuardedWrite::create(&indicator)?);
        self.store.commit(writes)?;

        info!(melp = melp_id, result = %result.business_id(), "added result");
        self.log.record(&self.ownership, actor, &format!("Added result to MELP {melp_id}"));
        Ok(result)
    }

    pub fn edit_result(&self, result_id: &str, statement: &str, actor: &Actor) -> Result<ResultNode, WorkflowError> {
        let stored = self.store.find_live::<ResultNode>(result_id)?;
        let melp = self.find_melp(&stored.meta.parent_id)?;
        self.ensure_result_unreferenced(result_id, &melp.owner)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let mut result = (*stored).clone();
        result.statement = statement.to_string();
        result.meta.touch(&actor.id);
        self.store.commit(vec![melp.claim()?, stored.rewrite(&result)?])?;

        info!(result = result_id, "edited result");
        self.log.record(&self.ownership, actor, &format!("Edited result {result_id}"));
        Ok(result)
    }

    /// Everything a result delete will write, read but not yet committed.
    fn stage_result_delete(
        &self,
        result_id: &str,
        actor: &Actor,
    ) -> Result<(Vec<GuardedWrite>, Cascade), WorkflowError> {
        let stored = self.store.find_live::<ResultNode>(result_id)?;
        let melp = self.find_melp(&stored.meta.parent_id)?;
        self.ensure_result_unreferenced(result_id, &melp.owner)?;
        self.permit(&melp, actor, Mutation::Delete)?;

        let live_results = self.store.count::<ResultNode>(Some(&melp.business_id))?;
        if live_results == 1 {
            debug!(result = result_id, melp = %melp.business_id, "sole result, collapsing melp");
            return Ok((vec![], self.plan_melp_delete(&melp, actor)?));
        }

        let branch = self.result_branch(stored)?;
        for indicator in &branch.indicators {
            self.ensure_indicator_unreferenced(indicator.indicator.business_id(), &melp.owner)?;
        }
        let plan = cascade::plan_result_delete(live_results, &branch, &actor.id)?;
        Ok((vec![melp.claim()?], plan))
    }

    /// Remove a result holding exactly one indicator, with that indicator's
    /// monitorings and risks. Removing a MELP's sole result removes the MELP
    /// too, which is refused while the MELP has outcomes.
    pub fn delete_result(&self, result_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let (claims, plan) = self.stage_result_delete(result_id, actor)?;
        let buried = self.apply(claims, plan)?;

        info!(result = result_id, removed = buried.len(), "deleted result");
        self.log.record(&self.ownership, actor, &format!("Deleted result {result_id}"));
        Ok(buried)
    }

    pub fn add_indicator(&self, result_id: &str, draft: IndicatorDraft, actor: &Actor) -> Result<Indicator, WorkflowError> {
        let result = self.store.find_live::<ResultNode>(result_id)?;
        let melp = self.find_melp(&result.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let indicator = Indicator::new(result_id, draft, &actor.id)?;
        let mut writes = vec![result.claim()?, melp.claim()?];
        writes.extend(GuardedWrite::create(&indicator)?);
        self.store.commit(writes)?;

        info!(result = result_id, indicator = %indicator.business_id(), "added indicator");
        self.log.record(&self.ownership, actor, &format!("Added indicator to result {result_id}"));
        Ok(indicator)
    }

    pub fn edit_indicator(
        &self,
        indicator_id: &str,
        draft: IndicatorDraft,
        actor: &Actor,
    ) -> Result<Indicator, WorkflowError> {
        let (stored, _, melp) = self.indicator_lineage(indicator_id)?;
        self.ensure_indicator_unreferenced(indicator_id, &melp.owner)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let mut indicator = (*stored).clone();
        indicator.apply(draft, &actor.id);
        self.store.commit(vec![melp.claim()?, stored.rewrite(&indicator)?])?;

        info!(indicator = indicator_id, "edited indicator");
        self.log.record(&self.ownership, actor, &format!("Edited indicator {indicator_id}"));
        Ok(indicator)
    }

    fn stage_indicator_delete(
        &self,
        indicator_id: &str,
        actor: &Actor,
    ) -> Result<(Vec<GuardedWrite>, Cascade), WorkflowError> {
        let (stored, result, melp) = self.indicator_lineage(indicator_id)?;
        self.ensure_indicator_unreferenced(indicator_id, &melp.owner)?;
        self.permit(&melp, actor, Mutation::Delete)?;

        let live_siblings = self.store.count::<Indicator>(Some(result.business_id()))?;
        let branch = self.indicator_branch(stored)?;
        let plan = cascade::plan_indicator_delete(live_siblings, &branch, &actor.id)?;
        Ok((vec![result.claim()?, melp.claim()?], plan))
    }

    /// Remove an indicator that has a live sibling, with its monitorings and risks.
    pub fn delete_indicator(&self, indicator_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let (claims, plan) = self.stage_indicator_delete(indicator_id, actor)?;
        let buried = self.apply(claims, plan)?;

        info!(indicator = indicator_id, removed = buried.len(), "deleted indicator");
        self.log.record(&self.ownership, actor, &format!("Deleted indicator {indicator_id}"));
        Ok(buried)
    }

    pub fn add_monitoring(
        &self,
        indicator_id: &str,
        draft: MonitoringDraft,
        actor: &Actor,
    ) -> Result<Monitoring, WorkflowError> {
        let (indicator, _, melp) = self.indicator_lineage(indicator_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let monitoring = Monitoring::new(indicator_id, draft, &actor.id)?;
        let mut writes = vec![indicator.claim()?, melp.claim()?];
        writes.extend(GuardedWrite::create(&monitoring)?);
        self.store.commit(writes)?;

        info!(indicator = indicator_id, monitoring = %monitoring.business_id(), "added monitoring");
        self.log.record(&self.ownership, actor, &format!("Added monitoring to indicator {indicator_id}"));
        Ok(monitoring)
    }

    pub fn delete_monitoring(&self, monitoring_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let stored = self.store.find_live::<Monitoring>(monitoring_id)?;
        let (_, _, melp) = self.indicator_lineage(&stored.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Delete)?;

        let buried = self.apply(vec![melp.claim()?], cascade::plan_single_delete(&stored, &actor.id)?)?;

        info!(monitoring = monitoring_id, "deleted monitoring");
        self.log.record(&self.ownership, actor, &format!("Deleted monitoring {monitoring_id}"));
        Ok(buried)
    }

    pub fn add_risk(&self, indicator_id: &str, draft: RiskDraft, actor: &Actor) -> Result<Risk, WorkflowError> {
        let (indicator, _, melp) = self.indicator_lineage(indicator_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let risk = Risk::new(indicator_id, draft, &actor.id)?;
        let mut writes = vec![indicator.claim()?, melp.claim()?];
        writes.extend(GuardedWrite::create(&risk)?);
        self.store.commit(writes)?;

        info!(indicator = indicator_id, risk = %risk.business_id(), "added risk");
        self.log.record(&self.ownership, actor, &format!("Added risk to indicator {indicator_id}"));
        Ok(risk)
    }

    pub fn delete_risk(&self, risk_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let stored = self.store.find_live::<Risk>(risk_id)?;
        let (_, _, melp) = self.indicator_lineage(&stored.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Delete)?;

        let buried = self.apply(vec![melp.claim()?], cascade::plan_single_delete(&stored, &actor.id)?)?;

        info!(risk = risk_id, "deleted risk");
        self.log.record(&self.ownership, actor, &format!("Deleted risk {risk_id}"));
        Ok(buried)
    }

    /// Add an outcome with any initial progress markers.
    pub fn add_outcome(&self, melp_id: &str, draft: OutcomeDraft, actor: &Actor) -> Result<Outcome, WorkflowError> {
        let melp = self.find_melp(melp_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let outcome = Outcome::new(melp_id, &draft.statement, &actor.id)?;
        let mut writes = vec![melp.claim()?];
        writes.extend(GuardedWrite::create(&outcome)?);
        for description in &draft.markers {
            let marker = ProgressMarker::new(outcome.business_id(), description, &actor.id)?;
            writes.extend(GuardedWrite::create(&marker)?);
        }
        self.store.commit(writes)?;

        info!(melp = melp_id, outcome = %outcome.business_id(), markers = draft.markers.len(), "added outcome");
        self.log.record(&self.ownership, actor, &format!("Added outcome to MELP {melp_id}"));
        Ok(outcome)
    }

    pub fn edit_outcome(&self, outcome_id: &str, statement: &str, actor: &Actor) -> Result<Outcome, WorkflowError> {
        let stored = self.store.find_live::<Outcome>(outcome_id)?;
        let melp = self.find_melp(&stored.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let mut outcome = (*stored).clone();
        outcome.statement = statement.to_string();
        outcome.meta.touch(&actor.id);
        self.store.commit(vec![melp.claim()?, stored.rewrite(&outcome)?])?;

        info!(outcome = outcome_id, "edited outcome");
        self.log.record(&self.ownership, actor, &format!("Edited outcome {outcome_id}"));
        Ok(outcome)
    }

    /// Remove an outcome and all of its progress markers.
    pub fn delete_outcome(&self, outcome_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let stored = self.store.find_live::<Outcome>(outcome_id)?;
        let melp = self.find_melp(&stored.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Delete)?;

        let markers = self.store.find::<ProgressMarker>(Some(outcome_id))?;
        let plan = cascade::plan_outcome_delete(&stored, &markers, &actor.id)?;
        let buried = self.apply(vec![melp.claim()?], plan)?;

        info!(outcome = outcome_id, removed = buried.len(), "deleted outcome");
        self.log.record(&self.ownership, actor, &format!("Deleted outcome {outcome_id}"));
        Ok(buried)
    }

    pub fn add_progress_marker(
        &self,
        outcome_id: &str,
        description: &str,
        actor: &Actor,
    ) -> Result<ProgressMarker, WorkflowError> {
        let outcome = self.store.find_live::<Outcome>(outcome_id)?;
        let melp = self.find_melp(&outcome.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Edit)?;

        let marker = ProgressMarker::new(outcome_id, description, &actor.id)?;
        let mut writes = vec![outcome.claim()?, melp.claim()?];
        writes.extend(GuardedWrite::create(&marker)?);
        self.store.commit(writes)?;

        info!(outcome = outcome_id, marker = %marker.business_id(), "added progress marker");
        self.log.record(&self.ownership, actor, &format!("Added progress marker to outcome {outcome_id}"));
        Ok(marker)
    }

    pub fn delete_progress_marker(&self, marker_id: &str, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        let stored = self.store.find_live::<ProgressMarker>(marker_id)?;
        let outcome = self.store.find_live::<Outcome>(&stored.meta.parent_id)?;
        let melp = self.find_melp(&outcome.meta.parent_id)?;
        self.permit(&melp, actor, Mutation::Delete)?;

        let buried = self.apply(vec![melp.claim()?], cascade::plan_single_delete(&stored, &actor.id)?)?;

        info!(marker = marker_id, "deleted progress marker");
        self.log.record(&self.ownership, actor, &format!("Deleted progress marker {marker_id}"));
        Ok(buried)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::aggregate::BasicInfo;
    use crate::config::EngineConfig;
    use crate::ownership::SledDirectory;
    use crate::types::NetworkRef;

    fn open_service(dir: &tempfile::TempDir) -> WorkflowService {
        let db = Arc::new(sled::open(dir.path().join("hierarchy.db")).unwrap());
        SledDirectory::open(&db)
            .unwrap()
            .register_network(&NetworkRef::new("net-1"), "West Network")
            .unwrap();
        WorkflowService::new(db, EngineConfig::default()).unwrap()
    }

    fn network_user() -> Actor {
        Actor::network("u1", "Ana", NetworkRef::new("net-1"))
    }

    /// A MELP whose first result carries two indicators.
    fn melp_with_two_indicators(service: &WorkflowService) -> (String, String, Vec<String>) {
        let actor = network_user();
        let melp = service
            .create_melp(
                2025,
                ResultDraft::new("Staff apply practice", IndicatorDraft::new("Staff trained")),
                &actor,
            )
            .unwrap();
        let result_id = service.results(&melp.business_id).unwrap()[0].business_id().to_string();
        service
            .add_indicator(&result_id, IndicatorDraft::new("Sites visited"), &actor)
            .unwrap();
        let indicators = service
            .indicators(&result_id)
            .unwrap()
            .iter()
            .map(|indicator| indicator.business_id().to_string())
            .collect();
        (melp.business_id, result_id, indicators)
    }

    #[test]
    fn sibling_deletes_read_together_leave_one_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(&dir);
        let actor = network_user();
        let (_, result_id, indicators) = melp_with_two_indicators(&service);

        // both deletes see two live siblings before either commits
        let (first_claims, first_plan) = service.stage_indicator_delete(&indicators[0], &actor).unwrap();
        let (second_claims, second_plan) = service.stage_indicator_delete(&indicators[1], &actor).unwrap();

        assert!(service.apply(first_claims, first_plan).is_ok());
        assert!(matches!(
            service.apply(second_claims, second_plan),
            Err(WorkflowError::NotFound(_))
        ));
        let left = service.indicators(&result_id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].business_id(), indicators[1]);
    }

    #[test]
    fn result_delete_loses_to_a_new_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(&dir);
        let actor = network_user();
        let (melp_id, _, _) = melp_with_two_indicators(&service);
        let second = service
            .add_result(
                &melp_id,
                ResultDraft::new("Districts adopt the plan", IndicatorDraft::new("Plans adopted")),
                &actor,
            )
            .unwrap();
        let second_id = second.business_id().to_string();

        let (claims, plan) = service.stage_result_delete(&second_id, &actor).unwrap();
        service
            .add_indicator(&second_id, IndicatorDraft::new("Budgets approved"), &actor)
            .unwrap();

        assert!(matches!(service.apply(claims, plan), Err(WorkflowError::NotFound(_))));
        assert_eq!(service.results(&melp_id).unwrap().len(), 2);
        assert_eq!(service.indicators(&second_id).unwrap().len(), 2);
    }

    #[test]
    fn melp_change_invalidates_a_staged_child_delete() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(&dir);
        let actor = network_user();
        let (melp_id, result_id, indicators) = melp_with_two_indicators(&service);

        let (claims, plan) = service.stage_indicator_delete(&indicators[0], &actor).unwrap();
        service
            .edit_basic_info(
                &melp_id,
                BasicInfo {
                    name: "Renamed".to_string(),
                    code: None,
                    summary: None,
                },
                &actor,
            )
            .unwrap();

        assert!(matches!(service.apply(claims, plan), Err(WorkflowError::NotFound(_))));
        assert_eq!(service.indicators(&result_id).unwrap().len(), 2);
    }
}
