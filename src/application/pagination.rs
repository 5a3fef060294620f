//! Fixed-size page-number pagination for the admin listing.

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("page numbers start at 1")]
    ZeroPage,
}

/// A 1-based page request with a fixed page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Result<Self, PaginationError> {
        if page == 0 {
            return Err(PaginationError::ZeroPage);
        }
        Ok(Self {
            page,
            per_page: per_page.max(1),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Row offset for OFFSET/LIMIT style stores.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// One page of results plus position bookkeeping and the
/// human-readable summary line the admin listing shows.
#[derive(Debug, Clone, Serialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub total_pages: u32,
    pub current_page: u32,
    pub nav_text: String,
}

impl<T> PagedList<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let per_page = u64::from(request.per_page());
        let total_pages = if total == 0 {
            1
        } else {
            total.div_ceil(per_page).min(u64::from(u32::MAX)) as u32
        };
        let current_page = request.page().min(total_pages);
        let noun = if total == 1 { "item" } else { "items" };
        let nav_text = format!("{total} {noun}, page {current_page} of {total_pages}");
        Self {
            items,
            total,
            total_pages,
            current_page,
            nav_text,
        }
    }
}
