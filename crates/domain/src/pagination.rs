//! Paging parameters and paged results.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Page-numbered paging, as used by order listings.
///
/// Out-of-range values are normalized rather than rejected: a page below 1
/// becomes 1 and a limit outside `1..=100` becomes the default of 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Pagination {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let limit = match limit {
            Some(l) if (1..=i64::from(MAX_LIMIT)).contains(&l) => l as u32,
            _ => DEFAULT_LIMIT,
        };
        Self { page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of records to skip.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Offset-based paging, as used by payment listings.
///
/// A missing or zero limit becomes 20 and larger limits are capped at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: u32,
    pub offset: u32,
}

impl Window {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = match limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(l) => l.min(MAX_LIMIT),
        };
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results together with the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
