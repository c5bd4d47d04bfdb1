use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 15;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Offset/limit pagination, pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PaginationRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let page = PaginationRequest::default();
        assert_eq!(page.limit(), 15);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_offset_and_clamping() {
        assert_eq!(PaginationRequest::new(3, 10).offset(), 20);
        assert_eq!(PaginationRequest::new(1, 500).limit(), 100);
        assert_eq!(PaginationRequest::new(0, 0).limit(), 1);
        assert_eq!(PaginationRequest::new(0, 10).offset(), 0);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let page: PaginationRequest = serde_json::from_str(r#"{"page": 2}"#).unwrap();
        assert_eq!(page, PaginationRequest::new(2, 15));
    }
}
