//! Search/Sort/Paginate Helper
//!
//! Gives every listing the same behaviour for empty search terms and unset sort
//! keys: an empty keyword matches everything and an empty key sorts by
//! `updatedAt`.
use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::error::WorkflowError;
use crate::types::Timestamp;

pub const DEFAULT_SORT_KEY: &str = "updatedAt";

/// Divisor behind `total_pages`, applied regardless of the requested page limit.
pub const COUNT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl From<i32> for SortDirection {
    fn from(value: i32) -> Self {
        if value == 1 {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

/// A comparable field value. Missing values sort before everything else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Missing,
    Number(i64),
    Text(String),
    Time(Timestamp),
}

pub trait Sortable {
    fn sort_value(&self, key: &str) -> SortValue;
}

#[derive(Debug, Clone)]
pub struct SearchSpec {
    pub pattern: Regex,
    pub sort: SortSpec,
}

impl SearchSpec {
    pub fn build(keyword: &str, sort_key: &str, direction: i32) -> Result<Self, WorkflowError> {
        let pattern = RegexBuilder::new(&regex::escape(keyword.trim()))
            .case_insensitive(true)
            .build()
            .map_err(|e| WorkflowError::InvalidQuery(e.to_string()))?;

        let key = match sort_key.trim() {
            "" => DEFAULT_SORT_KEY,
            key => key,
        };

        Ok(Self {
            pattern,
            sort: SortSpec {
                key: key.to_string(),
                direction: SortDirection::from(direction),
            },
        })
    }

    /// OR over the caller's chosen text fields.
    pub fn matches_any<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        fields.into_iter().any(|field| self.pattern.is_match(field))
    }

    pub fn compare<T: Sortable>(&self, a: &T, b: &T) -> Ordering {
        let ordering = a
            .sort_value(&self.sort.key)
            .cmp(&b.sort_value(&self.sort.key));
        match self.sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub total_pages: usize,
}

/// Slice one page out of already filtered and sorted items. A zero `page_limit`
/// means no limit.
pub fn paginate<T>(items: Vec<T>, page_limit: usize, page_index: usize, count_page_size: usize) -> Page<T> {
    let total_count = items.len();
    let skip = page_index.saturating_mul(page_limit);
    let limit = if page_limit == 0 { usize::MAX } else { page_limit };

    Page {
        items: items.into_iter().skip(skip).take(limit).collect(),
        total_count,
        total_pages: total_count.div_ceil(count_page_size.max(1)),
    }
}
