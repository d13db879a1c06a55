//! Cascade Invariant Checker
//!
//! Structural rules for removing nodes of the Result/Indicator and
//! Outcome/ProgressMarker hierarchies, and the reference rule that protects
//! results and indicators used by activities or activity proposals.
//!
//! This module is the only place a [`Tombstone`] can be minted, so every
//! soft delete in the crate is planned here and committed as one unit.
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::error::{CascadeReason, WorkflowError};
use crate::melp::{Indicator, Monitoring, Outcome, ProgressMarker, ResultNode, Risk};
use crate::store::{Document, GuardedWrite, Stored};

/// Permission to set `is_deleted`. Only constructible inside this module.
#[derive(Debug)]
pub struct Tombstone {
    _sealed: (),
}

pub trait Buryable: Document + Clone {
    fn bury(&mut self, tombstone: &Tombstone, by: &str);
}

/// An indicator with its live monitorings and risks.
#[derive(Debug, Clone)]
pub struct IndicatorBranch {
    pub indicator: Stored<Indicator>,
    pub monitorings: Vec<Stored<Monitoring>>,
    pub risks: Vec<Stored<Risk>>,
}

/// A result with its live indicator branches.
#[derive(Debug, Clone)]
pub struct ResultBranch {
    pub result: Stored<ResultNode>,
    pub indicators: Vec<IndicatorBranch>,
}

/// The soft deletes a permitted removal expands to.
#[derive(Debug)]
pub struct Cascade {
    tombstone: Tombstone,
    by: String,
    buried: Vec<String>,
    writes: Vec<GuardedWrite>,
}

impl Cascade {
    fn new(by: &str) -> Self {
        Self {
            tombstone: Tombstone { _sealed: () },
            by: by.to_string(),
            buried: vec![],
            writes: vec![],
        }
    }

    fn bury<D: Buryable>(&mut self, stored: &Stored<D>) -> Result<(), WorkflowError> {
        let mut doc = (**stored).clone();
        doc.bury(&self.tombstone, &self.by);
        self.writes.push(stored.rewrite(&doc)?);
        self.buried.push(doc.business_id().to_string());
        Ok(())
    }

    fn bury_indicator(&mut self, branch: &IndicatorBranch) -> Result<(), WorkflowError> {
        for monitoring in &branch.monitorings {
            self.bury(monitoring)?;
        }
        for risk in &branch.risks {
            self.bury(risk)?;
        }
        self.bury(&branch.indicator)
    }

    /// Business ids in the order they are marked deleted.
    pub fn buried(&self) -> &[String] {
        &self.buried
    }

    pub(crate) fn into_writes(self) -> Vec<GuardedWrite> {
        self.writes
    }
}

/// A result or indicator used by any live activity or proposal is frozen.
pub fn check_reference(referenced: bool) -> Result<(), CascadeReason> {
    if referenced {
        return Err(CascadeReason::ReferencedElsewhere);
    }
    Ok(())
}

/// Rule for a result with live siblings: its indicators go one at a time until
/// exactly one is left. A MELP's sole result collapses the MELP instead, see
/// [`check_melp_delete`].
pub fn check_result_delete(live_results: usize, live_indicators: usize) -> Result<(), WorkflowError> {
    if live_results == 0 {
        return Err(WorkflowError::Inconsistent("melp has no live result".to_string()));
    }
    match live_indicators {
        0 => Err(WorkflowError::Inconsistent(
            "result has no live indicator".to_string(),
        )),
        1 => Ok(()),
        _ => Err(CascadeReason::TooManySiblings.into()),
    }
}

/// Rule for an indicator: a result never ends up with zero indicators.
pub fn check_indicator_delete(live_siblings: usize) -> Result<(), CascadeReason> {
    if live_siblings <= 1 {
        return Err(CascadeReason::LastChildViolation);
    }
    Ok(())
}

/// Rule for a whole MELP: it collapses only when a single result with a single
/// indicator is left and no outcome exists.
pub fn check_melp_delete(
    live_results: usize,
    sole_result_indicators: usize,
    live_outcomes: usize,
) -> Result<(), WorkflowError> {
    if live_results > 1 || live_outcomes > 0 {
        return Err(CascadeReason::TooManySiblings.into());
    }
    if live_results == 0 {
        return Err(WorkflowError::Inconsistent("melp has no live result".to_string()));
    }
    match sole_result_indicators {
        0 => Err(WorkflowError::Inconsistent(
            "result has no live indicator".to_string(),
        )),
        1 => Ok(()),
        _ => Err(CascadeReason::TooManySiblings.into()),
    }
}

pub fn plan_result_delete(
    live_results: usize,
    branch: &ResultBranch,
    by: &str,
) -> Result<Cascade, WorkflowError> {
    check_result_delete(live_results, branch.indicators.len())
        .inspect_err(|e| debug!(result = %branch.result.business_id(), error = %e, "result delete refused"))?;

    let mut cascade = Cascade::new(by);
    for indicator in &branch.indicators {
        cascade.bury_indicator(indicator)?;
    }
    cascade.bury(&branch.result)?;
    Ok(cascade)
}

pub fn plan_indicator_delete(
    live_siblings: usize,
    branch: &IndicatorBranch,
    by: &str,
) -> Result<Cascade, WorkflowError> {
    check_indicator_delete(live_siblings).inspect_err(
        |e| debug!(indicator = %branch.indicator.business_id(), error = %e, "indicator delete refused"),
    )?;

    let mut cascade = Cascade::new(by);
    cascade.bury_indicator(branch)?;
    Ok(cascade)
}

pub fn plan_melp_delete(
    melp: &Stored<Aggregate>,
    results: &[ResultBranch],
    live_outcomes: usize,
    by: &str,
) -> Result<Cascade, WorkflowError> {
    let sole_indicators = results.first().map_or(0, |branch| branch.indicators.len());
    check_melp_delete(results.len(), sole_indicators, live_outcomes)
        .inspect_err(|e| debug!(melp = %melp.business_id, error = %e, "melp delete refused"))?;

    let mut cascade = Cascade::new(by);
    for branch in results {
        for indicator in &branch.indicators {
            cascade.bury_indicator(indicator)?;
        }
        cascade.bury(&branch.result)?;
    }
    cascade.bury(melp)?;
    Ok(cascade)
}

/// Outcomes carry no minimum; their markers always go with them.
pub fn plan_outcome_delete(
    outcome: &Stored<Outcome>,
    markers: &[Stored<ProgressMarker>],
    by: &str,
) -> Result<Cascade, WorkflowError> {
    let mut cascade = Cascade::new(by);
    for marker in markers {
        cascade.bury(marker)?;
    }
    cascade.bury(outcome)?;
    Ok(cascade)
}

/// Monitorings, risks, progress markers, and aggregates without children.
pub fn plan_single_delete<D: Buryable>(node: &Stored<D>, by: &str) -> Result<Cascade, WorkflowError> {
    let mut cascade = Cascade::new(by);
    cascade.bury(node)?;
    Ok(cascade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_count_alone_never_refuses() {
        assert!(check_result_delete(1, 1).is_ok());
        assert!(check_result_delete(3, 1).is_ok());
        assert!(matches!(
            check_result_delete(0, 1),
            Err(WorkflowError::Inconsistent(_))
        ));
    }

    #[test]
    fn result_with_several_indicators_is_refused() {
        assert!(matches!(
            check_result_delete(2, 3),
            Err(WorkflowError::CascadeViolation(CascadeReason::TooManySiblings))
        ));
    }

    #[test]
    fn result_without_indicator_is_inconsistent() {
        assert!(matches!(
            check_result_delete(2, 0),
            Err(WorkflowError::Inconsistent(_))
        ));
    }

    #[test]
    fn melp_with_outcome_is_refused() {
        assert!(matches!(
            check_melp_delete(1, 1, 1),
            Err(WorkflowError::CascadeViolation(CascadeReason::TooManySiblings))
        ));
        assert!(check_melp_delete(1, 1, 0).is_ok());
    }

    #[test]
    fn referenced_nodes_are_frozen() {
        assert_eq!(check_reference(true), Err(CascadeReason::ReferencedElsewhere));
        assert_eq!(check_reference(false), Ok(()));
    }
}
