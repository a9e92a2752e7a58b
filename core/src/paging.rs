//! Page requests and paged results.

use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a request, clamping out-of-range values.
    #[must_use]
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Number of items to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }

    /// Number of items to take.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.page_size as u64
    }

    /// Slice an in-memory, already ordered result.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit()).unwrap_or(usize::MAX);
        let data = items.into_iter().skip(offset).take(limit).collect();
        Page::new(data, total, *self)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Items across all pages.
    pub total: u64,
    /// This page's number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Number of pages.
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Assemble a page.
    #[must_use]
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        let size = u64::from(request.page_size.max(1));
        Self {
            data,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages: total.div_ceil(size),
        }
    }

    /// Transform the items, keeping the paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_inputs() {
        let req = PageRequest::new(Some(0), Some(1000));
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(None, None), PageRequest::default());
    }

    #[test]
    fn slices_and_counts_pages() {
        let page = PageRequest::new(Some(2), Some(3)).slice((1..=7).collect::<Vec<_>>());
        assert_eq!(page.data, vec![4, 5, 6]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);

        let past_end = PageRequest::new(Some(9), Some(3)).slice(vec![1, 2]);
        assert!(past_end.data.is_empty());
        assert_eq!(past_end.total_pages, 1);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: Page<u8> = PageRequest::default().slice(vec![]);
        assert_eq!(page.total_pages, 0);
    }
}
