//! Listing of aggregates, shared by every family
use tracing::debug;

use crate::actor::{Actor, Owner};
use crate::aggregate::{Aggregate, AggregateKind};
use crate::error::WorkflowError;
use crate::search::{Page, SearchSpec, paginate};
use crate::service::WorkflowService;
use crate::status::StatusName;

/// Optional narrowing applied before search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    /// Ignored for affiliates, who always see their own institute.
    pub owner: Option<Owner>,
    pub status: Option<StatusName>,
    pub year: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search_keyword: String,
    pub sort_key: String,
    /// `1` ascending, anything else descending.
    pub sort_direction: i32,
    /// Zero returns every match.
    pub page_limit: usize,
    pub page_index: usize,
    pub scope: ScopeFilter,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn search(mut self, keyword: impl Into<String>) -> Self {
        self.search_keyword = keyword.into();
        self
    }
    pub fn sort(mut self, key: impl Into<String>, direction: i32) -> Self {
        self.sort_key = key.into();
        self.sort_direction = direction;
        self
    }
    pub fn page(mut self, limit: usize, index: usize) -> Self {
        self.page_limit = limit;
        self.page_index = index;
        self
    }
    pub fn scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }
}

impl ScopeFilter {
    fn admits(&self, aggregate: &Aggregate, actor: &Actor) -> bool {
        let visible = if actor.is_central() {
            self.owner.as_ref().is_none_or(|owner| &aggregate.owner == owner)
        } else {
            aggregate.owner == actor.owner
        };

        visible
            && self.status.is_none_or(|status| aggregate.status.is(status))
            && self.year.is_none_or(|year| aggregate.family.year() == Some(year))
    }
}

fn search_fields(aggregate: &Aggregate) -> Vec<&str> {
    let mut fields = vec![aggregate.institute_name.as_str()];
    if let Some(info) = &aggregate.basic_info {
        fields.push(info.name.as_str());
        if let Some(code) = &info.code {
            fields.push(code.as_str());
        }
    }
    fields
}

impl WorkflowService {
    /// Live aggregates of `kind` that `actor` may see, filtered, sorted and paged.
    pub fn list(&self, kind: AggregateKind, query: &ListQuery, actor: &Actor) -> Result<Page<Aggregate>, WorkflowError> {
        let spec = SearchSpec::build(&query.search_keyword, &query.sort_key, query.sort_direction)?;

        let mut items: Vec<Aggregate> = self
            .store
            .find::<Aggregate>(Some(kind.as_str()))?
            .into_iter()
            .map(|stored| stored.into_inner())
            .filter(|aggregate| query.scope.admits(aggregate, actor))
            .filter(|aggregate| spec.matches_any(search_fields(aggregate)))
            .collect();
        items.sort_by(|a, b| spec.compare(a, b));

        debug!(
            kind = kind.as_str(),
            matched = items.len(),
            sort = %spec.sort.key,
            "listed aggregates"
        );
        Ok(paginate(items, query.page_limit, query.page_index, self.config.count_page_size))
    }
}
