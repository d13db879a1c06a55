//! Property-based tests for the workflow rules
//!
//! The pure rules (ownership, cascade, tabs, paging, search) are checked over
//! wide input ranges. The guard is checked end to end against a real store with
//! a handful of cases, since every case opens a database.

use std::sync::Arc;

use capdev_workflow::actor::{Actor, Owner, RoleClass};
use capdev_workflow::aggregate::{AdditionalInfo, BasicInfo, Financials, ReportKind};
use capdev_workflow::cascade::{check_indicator_delete, check_melp_delete, check_result_delete};
use capdev_workflow::error::{CascadeReason, WorkflowError};
use capdev_workflow::guard::{Mutation, affiliate_window};
use capdev_workflow::ownership::{OwnershipResolver, SledDirectory};
use capdev_workflow::search::{SearchSpec, paginate};
use capdev_workflow::service::{ReviewDecision, WorkflowService};
use capdev_workflow::status::StatusName;
use capdev_workflow::tabs::{self, Finalization, Tab, TabFlags};
use capdev_workflow::types::{NetworkRef, PartnerRef};
use capdev_workflow::EngineConfig;
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

fn tab_strategy() -> impl Strategy<Value = Tab> {
    prop_oneof![
        Just(Tab::BasicInfo),
        Just(Tab::Financials),
        Just(Tab::AdditionalInfo),
    ]
}

fn decision_strategy() -> impl Strategy<Value = ReviewDecision> {
    prop_oneof![
        Just(ReviewDecision::Approve),
        Just(ReviewDecision::Deny),
        Just(ReviewDecision::RequestInformation),
    ]
}

/// Identity-provider references, each independently present or absent
fn refs_strategy() -> impl Strategy<Value = (Option<NetworkRef>, Option<PartnerRef>)> {
    (
        proptest::option::of("[a-z]{3,8}".prop_map(NetworkRef::new)),
        proptest::option::of("[a-z]{3,8}".prop_map(PartnerRef::new)),
    )
}

fn submitted_report(service: &WorkflowService, actor: &Actor) -> anyhow::Result<String> {
    let report = service.create_report(ReportKind::Output, 2025, actor)?;
    let id = report.business_id;
    service.edit_basic_info(
        &id,
        BasicInfo {
            name: "Output report".to_string(),
            code: None,
            summary: None,
        },
        actor,
    )?;
    service.add_financials(
        &id,
        Financials {
            currency: "USD".to_string(),
            requested_amount: 0,
            co_funding_amount: 0,
        },
        actor,
    )?;
    service.add_additional_info(
        &id,
        AdditionalInfo {
            remarks: String::new(),
            attachments: vec![],
        },
        actor,
    )?;
    service.submit(&id, actor)?;
    Ok(id)
}

// PROPERTY TESTS
proptest! {
    /// Property: an identity is never both network and partner affiliated
    #[test]
    fn prop_owner_is_exclusive((network, partner) in refs_strategy()) {
        let both = network.is_some() && partner.is_some();
        let neither = network.is_none() && partner.is_none();

        match Owner::from_refs(network, partner) {
            Err(WorkflowError::InvalidActor(_)) => prop_assert!(both),
            Ok(owner) => {
                prop_assert!(!both);
                prop_assert_eq!(owner.role() == RoleClass::Central, neither);
                prop_assert_eq!(
                    OwnershipResolver::initial_status(&owner) == StatusName::Approved,
                    neither
                );
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }

    /// Property: a result goes only with exactly one indicator, and a sole
    /// result follows the same rule as its MELP
    #[test]
    fn prop_result_delete_rule(live_results in 0usize..6, live_indicators in 0usize..6) {
        let outcome = check_result_delete(live_results, live_indicators);

        if live_results == 0 {
            prop_assert!(matches!(outcome, Err(WorkflowError::Inconsistent(_))));
        } else {
            prop_assert_eq!(outcome.is_ok(), live_indicators == 1);
            prop_assert!(!matches!(
                outcome,
                Err(WorkflowError::CascadeViolation(CascadeReason::LastChildViolation))
            ));
        }
        if live_results == 1 {
            prop_assert_eq!(
                outcome.is_ok(),
                check_melp_delete(live_results, live_indicators, 0).is_ok()
            );
        }
    }

    /// Property: an indicator is never the last one removed
    #[test]
    fn prop_indicator_delete_rule(live_siblings in 0usize..10) {
        prop_assert_eq!(check_indicator_delete(live_siblings).is_ok(), live_siblings >= 2);
    }

    /// Property: a MELP collapses only from its minimal shape
    #[test]
    fn prop_melp_delete_rule(results in 0usize..4, indicators in 0usize..4, outcomes in 0usize..3) {
        let allowed = check_melp_delete(results, indicators, outcomes).is_ok();

        prop_assert_eq!(allowed, results == 1 && indicators == 1 && outcomes == 0);
    }

    /// Property: each flag is reported newly set exactly once, and completion
    /// needs every step
    #[test]
    fn prop_tab_flags_are_monotonic(steps in prop::collection::vec(tab_strategy(), 0..12)) {
        let mut flags = TabFlags::default();
        let mut newly_set = 0;
        for step in &steps {
            if flags.complete(*step) {
                newly_set += 1;
            }
        }

        let distinct = [Tab::BasicInfo, Tab::Financials, Tab::AdditionalInfo]
            .iter()
            .filter(|tab| steps.contains(tab))
            .count();
        prop_assert_eq!(newly_set, distinct);
        prop_assert_eq!(flags.is_complete(), distinct == 3);
    }

    /// Property: only an affiliate with every step done is approved on finalize
    #[test]
    fn prop_finalize_gate(first: bool, second: bool, third: bool, central: bool) {
        let flags = TabFlags { first, second, third };
        let actor = if central {
            Actor::central("u0", "Root")
        } else {
            Actor::network("u1", "Ana", NetworkRef::new("net"))
        };

        let approve = tabs::evaluate(flags, &actor) == Finalization::Approve;
        prop_assert_eq!(approve, !central && first && second && third);
    }

    /// Property: a page never exceeds its limit and the page count ignores it
    #[test]
    fn prop_pagination_bounds(total in 0usize..60, limit in 0usize..15, index in 0usize..8) {
        let page = paginate((0..total).collect::<Vec<_>>(), limit, index, 10);

        prop_assert_eq!(page.total_count, total);
        prop_assert_eq!(page.total_pages, total.div_ceil(10));
        if limit > 0 {
            prop_assert!(page.items.len() <= limit);
        }
        if let Some(first) = page.items.first() {
            prop_assert_eq!(*first, index * limit);
        }
    }

    /// Property: any text containing the keyword matches, whatever its case
    #[test]
    fn prop_keyword_matches_as_substring(
        prefix in "[ -~]{0,8}",
        keyword in "[ -~]{1,8}",
        suffix in "[ -~]{0,8}",
    ) {
        let spec = SearchSpec::build(&keyword, "", -1).unwrap();
        let haystack = format!("{prefix}{}{suffix}", keyword.to_uppercase());

        prop_assert!(spec.matches_any([haystack.as_str()]));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: after review, affiliate edits succeed exactly inside the edit
    /// window while central edits always do
    #[test]
    fn prop_guard_follows_status(decision in decision_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("guard.db")).unwrap());
        SledDirectory::open(&db)
            .unwrap()
            .register_network(&NetworkRef::new("net-1"), "West Network")
            .unwrap();
        let service = WorkflowService::new(db, EngineConfig::default()).unwrap();
        let network = Actor::network("u1", "Ana", NetworkRef::new("net-1"));
        let central = Actor::central("u0", "Root");

        let id = submitted_report(&service, &network).unwrap();
        let reviewed = service.review(&id, decision, &central).unwrap();
        let editable = affiliate_window(Mutation::Edit).contains(&reviewed.status_name());

        let info = BasicInfo { name: "Changed".to_string(), code: None, summary: None };
        prop_assert_eq!(service.edit_basic_info(&id, info.clone(), &network).is_ok(), editable);
        prop_assert!(service.edit_basic_info(&id, info, &central).is_ok());
    }
}
