//! Paginated results and page link generation

use serde::{Deserialize, Serialize};

/// Default number of items per page
pub const DEFAULT_PER_PAGE: usize = 15;

/// A page of items together with the size of the whole (filtered) set.
///
/// `total` counts the set before windowing, so it is independent of
/// `current_page` and `per_page`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginator<T> {
    /// Items on the current page
    pub items: Vec<T>,

    /// Total number of items (after filters)
    pub total: u64,

    /// Number of items per page
    pub per_page: usize,

    /// Current page number (starts at 1)
    pub current_page: usize,

    /// Base path used to build page links
    #[serde(default)]
    pub path: String,

    /// Extra query-string parameters carried by page links
    #[serde(default)]
    pub query: Vec<(String, String)>,
}

impl<T> Paginator<T> {
    /// Create a paginator; `per_page` and `current_page` are clamped to at least 1
    pub fn new(items: Vec<T>, total: u64, per_page: usize, current_page: usize) -> Self {
        Self {
            items,
            total,
            per_page: per_page.max(1),
            current_page: current_page.max(1),
            path: String::from("/"),
            query: Vec::new(),
        }
    }

    /// Set the link path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Add a query-string parameter carried by page links
    pub fn append(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Last page number; an empty set still has one (empty) page
    pub fn last_page(&self) -> usize {
        let pages = (self.total as usize).div_ceil(self.per_page);
        pages.max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    pub fn on_first_page(&self) -> bool {
        self.current_page <= 1
    }

    /// Link to the given page: `path?page=N` followed by the carried parameters
    pub fn url(&self, page: usize) -> String {
        let page = page.max(1);
        let mut url = format!("{}?page={}", self.path, page);
        for (key, value) in &self.query {
            if key == "page" {
                continue;
            }
            url.push_str(&format!("&{}={}", key, value));
        }
        url
    }

    pub fn next_page_url(&self) -> Option<String> {
        self.has_more_pages().then(|| self.url(self.current_page + 1))
    }

    pub fn previous_page_url(&self) -> Option<String> {
        (!self.on_first_page()).then(|| self.url(self.current_page - 1))
    }

    /// Transform the items, keeping the page metadata
    pub fn map<U, F>(self, f: F) -> Paginator<U>
    where
        F: FnMut(T) -> U,
    {
        Paginator {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            path: self.path,
            query: self.query,
        }
    }

    /// Fallible [`Paginator::map`]
    pub fn try_map<U, E, F>(self, f: F) -> Result<Paginator<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Paginator {
            items,
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            path: self.path,
            query: self.query,
        })
    }
}

/// Largest window bound a SQL backend accepts (`BIGINT`)
pub const MAX_WINDOW: usize = i64::MAX as usize;

/// Zero-based offset of the first item on `page`.
///
/// Pages past the addressable range saturate and come back empty.
pub fn page_offset(page: usize, per_page: usize) -> usize {
    page.max(1)
        .saturating_sub(1)
        .saturating_mul(per_page)
        .min(MAX_WINDOW)
}
