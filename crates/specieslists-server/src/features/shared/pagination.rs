//! Shared pagination utilities
//!
//! Search pages are bounded by the index's result window: a request whose
//! last position `page * per_page` lies past the window is rejected rather
//! than clamped.
//!
//! # Examples
//!
//! ```rust,ignore
//! use specieslists_server::features::shared::pagination::{PaginationParams, PaginationMetadata};
//!
//! let params = PaginationParams::new(Some(2), Some(20));
//! params.validate(10_000)?;
//! let offset = params.offset();
//!
//! // After fetching data...
//! let metadata = PaginationMetadata::new(params.page(), params.per_page(), 100);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("Page must be greater than 0")]
    InvalidPage,

    #[error("Per page must be between 1 and 1000")]
    InvalidPageSize,

    #[error("Result window {requested} exceeds the maximum of {max}")]
    ResultWindowExceeded { requested: u64, max: u64 },
}

/// Common pagination request parameters
///
/// Defaults to page 1 with 20 items per page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PaginationParams {
    /// Page number (1-indexed). Defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    /// Items per page. Defaults to 20.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
}

impl PaginationParams {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self { page, per_page }
    }

    /// Page number (1-indexed), defaulting to 1
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Items per page, defaulting to 20 and clamped to 1-1000
    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }

    /// Last result position this page touches
    pub fn window_end(&self) -> u64 {
        (self.page() as u64).saturating_mul(self.per_page() as u64)
    }

    /// Check bounds and the result window
    pub fn validate(&self, max_result_window: u64) -> Result<(), PaginationError> {
        if let Some(page) = self.page {
            if page < 1 {
                return Err(PaginationError::InvalidPage);
            }
        }
        if let Some(per_page) = self.per_page {
            if !(1..=MAX_PAGE_SIZE).contains(&per_page) {
                return Err(PaginationError::InvalidPageSize);
            }
        }
        let requested = self.window_end();
        if requested > max_result_window {
            return Err(PaginationError::ResultWindowExceeded {
                requested,
                max: max_result_window,
            });
        }
        Ok(())
    }
}

/// Pagination metadata for response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationMetadata {
    /// Current page number (1-indexed)
    pub page: i64,

    /// Items per page
    pub per_page: i64,

    /// Total number of items
    pub total: i64,

    /// Total number of pages
    pub pages: i64,

    pub has_next: bool,

    pub has_prev: bool,
}

impl PaginationMetadata {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };

        Self {
            page,
            per_page,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }

    pub fn from_params(params: &PaginationParams, total: i64) -> Self {
        Self::new(params.page(), params.per_page(), total)
    }
}

/// Wrapper for paginated responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,

    pub pagination: PaginationMetadata,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, pagination: PaginationMetadata) -> Self {
        Self { items, pagination }
    }

    pub fn from_items(items: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        Self {
            items,
            pagination: PaginationMetadata::from_params(params, total),
        }
    }

    /// Map items to a different type
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
