//! Page/page-size normalization for collection endpoints.
//!
//! Out-of-range values fall back to defaults instead of producing client errors.

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Bounds applied by [`PageRequest::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageBounds {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// A normalized page request: `page >= 1` and `1 <= page_size <= max_page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Normalize client-supplied values. `None` stands for an absent or unparsable parameter.
    pub fn normalize(page: Option<i64>, page_size: Option<i64>, bounds: PageBounds) -> Self {
        let page = page
            .filter(|value| *value >= 1)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(DEFAULT_PAGE);

        let page_size = page_size
            .filter(|value| *value >= 1 && *value <= i64::from(bounds.max_page_size))
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(bounds.default_page_size);

        Self { page, page_size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Rows to skip in storage.
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

/// Lenient integer parsing for query parameters.
pub fn parse_lenient(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
}
