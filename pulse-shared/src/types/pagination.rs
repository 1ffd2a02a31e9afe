use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp-cursor pagination over `created_at` descending. The cursor is
/// the `created_at` of the oldest row in the previous page; message ids are
/// not monotonic, so the timestamp is the stable ordering key. Same-instant
/// creates may duplicate across a page boundary; clients dedupe by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CursorParams {
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

impl CursorParams {
    pub fn limit(&self) -> i64 {
        i64::from(self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub next_cursor: Option<DateTime<Utc>>,
    pub has_more: bool,
}

impl<T: Serialize> Page<T> {
    /// Build a page from rows already loaded with `LIMIT limit`. A full page
    /// means more rows may exist; the next cursor is the last row's timestamp.
    pub fn from_rows(items: Vec<T>, limit: i64, created_at: impl Fn(&T) -> DateTime<Utc>) -> Self {
        let full = items.len() as i64 == limit;
        let next_cursor = if full { items.last().map(&created_at) } else { None };
        Self {
            items,
            next_cursor,
            has_more: full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(CursorParams::default().limit(), 20);
        let p = CursorParams { cursor: None, limit: Some(500) };
        assert_eq!(p.limit(), 100);
        let p = CursorParams { cursor: None, limit: Some(0) };
        assert_eq!(p.limit(), 1);
    }

    #[test]
    fn full_page_has_more_and_cursor() {
        // 25 rows paginated at 20: first page full, second page of 5 ends it.
        let rows: Vec<DateTime<Utc>> = (0..20).map(|i| ts(100 - i)).collect();
        let page = Page::from_rows(rows, 20, |t| *t);
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(ts(81)));

        let rest: Vec<DateTime<Utc>> = (20..25).map(|i| ts(100 - i)).collect();
        let page = Page::from_rows(rest, 20, |t| *t);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn empty_page() {
        let page = Page::from_rows(Vec::<DateTime<Utc>>::new(), 20, |t| *t);
        assert!(!page.has_more);
        assert!(page.items.is_empty());
        assert_eq!(page.next_cursor, None);
    }
}
