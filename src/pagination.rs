//! Page/page-size handling for list endpoints.

use std::collections::HashMap;

use serde::Serialize;

/// Page sizes offered by the UI; anything else falls back to the default.
pub const PAGE_SIZES: [u32; 5] = [10, 20, 30, 40, 50];
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageQuery {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p >= 1).unwrap_or(1),
            page_size: page_size
                .filter(|s| PAGE_SIZES.contains(s))
                .unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }

    /// Read `page` and `page_size` (or `pageSize`) from raw query parameters.
    /// Unparsable values are treated as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).and_then(|v| v.trim().parse::<u32>().ok());
        Self::new(get("page"), get("page_size").or_else(|| get("pageSize")))
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, query: PageQuery, total: i64) -> Self {
        let size = i64::from(query.page_size);
        Self {
            items,
            page: query.page,
            page_size: query.page_size,
            total,
            total_pages: (total + size - 1) / size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_allowed_sizes() {
        assert_eq!(PageQuery::new(None, None), PageQuery::default());
        assert_eq!(PageQuery::new(Some(0), Some(25)).page_size, 10);
        assert_eq!(PageQuery::new(Some(0), Some(25)).page, 1);
        assert_eq!(PageQuery::new(Some(3), Some(50)).offset(), 100);
    }

    #[test]
    fn from_query_params() {
        let params = HashMap::from([
            ("page".to_string(), "2".to_string()),
            ("pageSize".to_string(), "20".to_string()),
        ]);
        let query = PageQuery::from_params(&params);
        assert_eq!((query.page, query.page_size), (2, 20));

        let params = HashMap::from([("page".to_string(), "x".to_string())]);
        assert_eq!(PageQuery::from_params(&params), PageQuery::default());
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], PageQuery::new(Some(1), Some(10)), 21);
        assert_eq!(page.total_pages, 3);
        let empty: Page<u8> = Page::new(vec![], PageQuery::default(), 0);
        assert_eq!(empty.total_pages, 0);
    }
}
