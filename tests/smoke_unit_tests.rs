//! Smoke screen unit tests for workflow engine components
//!
//! Happy-path checks across the public API, kept apart from the end-to-end
//! scenarios.

use capdev_workflow::{
    actor::{Actor, Owner, RoleClass},
    config::EngineConfig,
    guard::{Mutation, affiliate_window},
    search::{COUNT_PAGE_SIZE, SearchSpec, SortDirection, paginate},
    status::StatusName,
    tabs::{Tab, TabFlags},
    telemetry::init_tracing,
    types::{NetworkRef, PartnerRef, Timestamp},
    utils::{new_business_id, new_uuid_to_bech32},
};
use chrono::{Datelike, Utc};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Business ids carry their collection prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_business_id("melp_").unwrap();

        assert!(encoded.starts_with("melp_1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_business_id("result_").unwrap();
        let id2 = new_business_id("result_").unwrap();

        assert_ne!(id1, id2);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn timestamp_now_is_current() {
        let ts = Timestamp::now();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();

        assert!(diff < 1);
    }

    /// Invalid calendar dates are rejected rather than clamped
    #[test]
    fn timestamp_new_with_validates() {
        let ts = Timestamp::new_with(2025, 2, 28, 12, 0, 0).unwrap();
        assert_eq!(ts.to_datetime_utc().year(), 2025);

        assert!(Timestamp::new_with(2025, 2, 30, 0, 0, 0).is_none());
    }

    #[test]
    fn refs_display_their_id() {
        assert_eq!(NetworkRef::new("net-1").to_string(), "net-1");
        assert_eq!(PartnerRef::new("p-2").to_string(), "p-2");
    }
}

// ACTOR MODULE TESTS
#[cfg(test)]
mod actor_tests {
    use super::*;

    #[test]
    fn affiliated_owners_are_affiliates() {
        let network = Owner::from_refs(Some(NetworkRef::new("n")), None).unwrap();
        let partner = Owner::from_refs(None, Some(PartnerRef::new("p"))).unwrap();

        assert_eq!(network.role(), RoleClass::Affiliate);
        assert_eq!(partner.role(), RoleClass::Affiliate);
        assert_eq!(network.network(), Some(&NetworkRef::new("n")));
        assert!(network.partner().is_none());
    }

    #[test]
    fn central_actor_reports_central_role() {
        let actor = Actor::central("u0", "Root");

        assert!(actor.is_central());
        assert_eq!(actor.role(), RoleClass::Central);
    }
}

// STATUS AND GUARD TESTS
#[cfg(test)]
mod guard_tests {
    use super::*;

    #[test]
    fn status_names_use_persisted_spelling() {
        assert_eq!(StatusName::InformationRequested.to_string(), "INFORMATION_REQUESTED");
        assert_eq!("DENIED".parse::<StatusName>().unwrap(), StatusName::Denied);
    }

    /// Denied records may be discarded but not edited
    #[test]
    fn delete_window_extends_edit_window_with_denied() {
        let edit = affiliate_window(Mutation::Edit);
        let delete = affiliate_window(Mutation::Delete);

        assert!(edit.iter().all(|status| delete.contains(status)));
        assert!(!edit.contains(&StatusName::Denied));
        assert!(delete.contains(&StatusName::Denied));
        assert!(!delete.contains(&StatusName::Approved));
        assert!(!delete.contains(&StatusName::Submitted));
    }
}

// TABS MODULE TESTS
#[cfg(test)]
mod tabs_tests {
    use super::*;

    #[test]
    fn all_three_steps_complete_the_flags() {
        let mut flags = TabFlags::default();
        assert!(!flags.is_complete());

        flags.complete(Tab::BasicInfo);
        flags.complete(Tab::Financials);
        flags.complete(Tab::AdditionalInfo);

        assert!(flags.is_complete());
    }
}

// SEARCH MODULE TESTS
#[cfg(test)]
mod search_tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_literal() {
        let spec = SearchSpec::build("(a+", "", 1).unwrap();

        assert!(spec.matches_any(["x (A+ y"]));
        assert!(!spec.matches_any(["aaa"]));
        assert_eq!(spec.sort.direction, SortDirection::Ascending);
    }

    #[test]
    fn any_direction_but_one_descends() {
        assert_eq!(SortDirection::from(-1), SortDirection::Descending);
        assert_eq!(SortDirection::from(0), SortDirection::Descending);
        assert_eq!(SortDirection::from(7), SortDirection::Descending);
    }

    #[test]
    fn zero_limit_returns_everything() {
        let page = paginate((0..12).collect::<Vec<_>>(), 0, 3, COUNT_PAGE_SIZE);

        assert_eq!(page.items.len(), 12);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn empty_listing_has_no_pages() {
        let page = paginate(Vec::<u8>::new(), 5, 0, COUNT_PAGE_SIZE);

        assert_eq!(page.total_count, 0);
        assert_eq!(page.total_pages, 0);
    }
}

// CONFIG AND TELEMETRY TESTS
#[cfg(test)]
mod ambient_tests {
    use super::*;

    #[test]
    fn config_loads_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.toml");
        let db_path = dir.path().join("engine.db");
        std::fs::write(
            &path,
            format!("database_path = {:?}\nlog_filter = \"debug\"\n", db_path.display().to_string()),
        )?;

        let config = EngineConfig::load(&path)?;
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.database_path, db_path);

        let db = config.open_database()?;
        assert_eq!(db.len(), 0);
        Ok(())
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(EngineConfig::from_toml_str("count_page_size = 0").is_err());
    }

    /// Only the first subscriber installs; later calls report an error
    #[test]
    fn tracing_installs_once() {
        assert!(init_tracing("debug").is_ok());
        assert!(init_tracing("debug").is_err());
    }
}
