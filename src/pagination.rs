//! Page requests and page shapes.
//!
//! Posts use 1-based offset pages with a total count. Comments and answers
//! use 0-based pages that only report whether another page exists, which
//! is what an infinite-scroll client needs.

use serde::{Deserialize, Deserializer};

pub const MAX_PAGE_SIZE: i64 = 50;
pub const DEFAULT_POST_PAGE_SIZE: i64 = 5;
pub const DEFAULT_COMMENT_PAGE_SIZE: i64 = 4;
pub const ANSWER_PAGE_SIZE: i64 = 4;

/// Raw query-string parameters. Missing, empty, non-numeric or
/// out-of-range values fall back to defaults rather than failing the
/// request.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub page_size: Option<i64>,
    pub search: Option<String>,
}

/// Read a query value as a number, treating anything unparsable as absent.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

fn clamp_size(size: Option<i64>, default: i64) -> i64 {
    match size {
        Some(s) if s >= 1 => s.min(MAX_PAGE_SIZE),
        _ => default,
    }
}

/// A resolved 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRequest {
    pub page: i64,
    pub page_size: i64,
}

impl OffsetRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>, default_size: i64) -> Self {
        Self {
            page: page.filter(|p| *p >= 1).unwrap_or(1),
            page_size: clamp_size(page_size, default_size),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// A resolved 0-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub page: i64,
    pub page_size: i64,
}

impl ScrollRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>, default_size: i64) -> Self {
        Self {
            page: page.filter(|p| *p >= 0).unwrap_or(0),
            page_size: clamp_size(page_size, default_size),
        }
    }

    pub fn fixed(page: Option<i64>, page_size: i64) -> Self {
        Self {
            page: page.filter(|p| *p >= 0).unwrap_or(0),
            page_size,
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.page_size)
    }

    /// Rows to fetch: one extra to learn whether another page exists.
    pub fn probe_limit(&self) -> i64 {
        self.page_size + 1
    }
}

#[derive(Debug, Clone)]
pub struct ScrollPage<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub has_more: bool,
}

impl<T> ScrollPage<T> {
    /// Build from rows fetched with `probe_limit()`.
    pub fn from_probe(mut rows: Vec<T>, request: ScrollRequest) -> Self {
        let has_more = rows.len() as i64 > request.page_size;
        rows.truncate(request.page_size as usize);
        Self {
            items: rows,
            page: request.page,
            page_size: request.page_size,
            has_more,
        }
    }
}
