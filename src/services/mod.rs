use serde::Serialize;

pub mod artist;
pub mod auth_client;
pub mod background;
pub mod calendar_feed;
pub mod community;
pub mod profile;
pub mod rsvp;
pub mod show;
pub mod spotify;

/// An unguessable token for share links, invites and calendar feeds.
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub const DEFAULT_PAGE_SIZE: u64 = 25;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based
    pub number: u64,
    pub size: u64,
}

impl Page {
    pub fn new(number: Option<u64>, size: Option<u64>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_unique_hex() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::new(None, None), Page { number: 1, size: 25 });
        assert_eq!(Page::new(Some(0), Some(0)), Page { number: 1, size: 1 });
        assert_eq!(Page::new(Some(3), Some(500)), Page { number: 3, size: 100 });
    }
}
