//! Upstream source-of-record collaborator.
//!
//! The engine only needs paginated retrieval: it asks for page `n` of size
//! `page_size` and keeps going until a page reports `has_more = false`.
//! How pagination, authentication or transport work is the source's concern.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The upstream asked us to slow down. The message usually says how long.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },
    #[error("Upstream transport error: {0}")]
    Transport(String),
    #[error("Upstream returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport(_))
    }
}

/// One page of raw upstream records.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub has_more: bool,
}

impl<R> Page<R> {
    pub fn last(records: Vec<R>) -> Self {
        Self { records, has_more: false }
    }

    pub fn more(records: Vec<R>) -> Self {
        Self { records, has_more: true }
    }
}

/// Paginated source of raw records for one entity type.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    type Record: Send;

    /// Fetch a 1-based page.
    ///
    /// An empty first page with `has_more = false` is a legitimate empty
    /// result, distinct from an error.
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<Self::Record>, FetchError>;
}

/// Upstream backed by a fixed list of records, paged on demand.
///
/// Handy for replaying a captured feed or for tests.
pub struct StaticSource<R> {
    records: Vec<R>,
}

impl<R> StaticSource<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> UpstreamSource for StaticSource<R> {
    type Record = R;

    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<R>, FetchError> {
        if page == 0 || page_size == 0 {
            return Err(FetchError::InvalidResponse(format!(
                "invalid page request page={} page_size={}",
                page, page_size
            )));
        }
        let start = (page as usize - 1).saturating_mul(page_size as usize);
        let end = start.saturating_add(page_size as usize).min(self.records.len());
        let records = if start < self.records.len() {
            self.records[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(Page {
            records,
            has_more: end < self.records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_pages() {
        let source = StaticSource::new((1..=5).collect::<Vec<u32>>());

        let p1 = source.fetch_page(1, 2).await.unwrap();
        assert_eq!(p1, Page::more(vec![1, 2]));
        let p3 = source.fetch_page(3, 2).await.unwrap();
        assert_eq!(p3, Page::last(vec![5]));
    }

    #[tokio::test]
    async fn test_static_source_empty() {
        let source: StaticSource<u32> = StaticSource::new(vec![]);
        let p1 = source.fetch_page(1, 50).await.unwrap();
        assert!(p1.records.is_empty());
        assert!(!p1.has_more);
    }

    #[tokio::test]
    async fn test_static_source_rejects_page_zero() {
        let source = StaticSource::new(vec![1u32]);
        assert!(source.fetch_page(0, 10).await.is_err());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::RateLimited { message: "slow down".into() }.is_retryable());
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::InvalidResponse("bad json".into()).is_retryable());
    }
}
