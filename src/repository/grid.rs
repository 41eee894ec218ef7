//! Grid requests: filter + sort (or search) + page window in one call

use crate::core::error::Result;
use crate::core::pagination::Paginator;
use crate::core::schema::Schema;
use crate::query::builder::{Direction, Query};
use crate::query::filter::{FilterSpec, multi_filter_by};
use crate::query::search::{SearchColumns, apply_search};
use crate::query::sort::{SortSpec, multi_sort_by};
use serde::{Deserialize, Serialize};

fn first_page() -> usize {
    1
}

/// Parameters of a `fetch` / `simple_fetch` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRequest {
    /// 1-based page number
    #[serde(default = "first_page")]
    pub page: usize,

    /// Page size; the repository default when absent
    #[serde(default, rename = "perPage", alias = "per_page")]
    pub per_page: Option<usize>,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub filter: FilterSpec,

    #[serde(default)]
    pub sort: SortSpec,

    /// Relevance search phrase; replaces filter and sort when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Default for GridRequest {
    fn default() -> Self {
        Self {
            page: first_page(),
            per_page: None,
            columns: Vec::new(),
            filter: FilterSpec::new(),
            sort: SortSpec::new(),
            search: None,
        }
    }
}

impl GridRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a filter; later filters are ANDed after earlier ones
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.insert(column.into(), value.into());
        self
    }

    /// Add a sort; later sorts break ties of earlier ones
    pub fn sort(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.sort.insert(column.into(), direction);
        self
    }

    pub fn search(mut self, phrase: impl Into<String>) -> Self {
        self.search = Some(phrase.into());
        self
    }

    pub fn column_refs(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Page size, falling back to `default`
    pub fn page_size(&self, default: usize) -> usize {
        self.per_page.unwrap_or(default).max(1)
    }
}

/// Searchable columns of a repository and the score threshold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSettings {
    pub columns: SearchColumns,
    pub threshold: Option<f64>,
}

/// Apply the request's filters and sorts, or its search, to `query`
pub fn compose(
    query: Query,
    schema: &Schema,
    request: &GridRequest,
    search: &SearchSettings,
) -> Result<Query> {
    match request.search.as_deref() {
        Some(phrase) if !phrase.trim().is_empty() => {
            apply_search(query, schema, phrase, &search.columns, search.threshold)
        }
        _ => {
            let query = multi_filter_by(query, schema, &request.filter)?;
            multi_sort_by(query, schema, &request.sort)
        }
    }
}

/// Attach link metadata to a grid page
pub fn with_links<T>(page: Paginator<T>, path: &str) -> Paginator<T> {
    let (current, per_page) = (page.current_page, page.per_page);
    page.with_path(path)
        .append("page", current)
        .append("perPage", per_page)
}
