//! Paginated remote record source
//!
//! FromTarget runs pull target resources from a server page by page. A
//! background task walks the pages and feeds a bounded channel, so a slow
//! consumer pauses page fetching and dropping the consumer stops it.

pub mod error;
pub mod http;
pub mod retry;

pub use error::{ErrorClassification, FetchError};
pub use http::HttpRecordSource;
pub use retry::{execute_with_retry, RetryDecision, RetryHandler, RetryPolicy};

use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Stream of target resources; an `Err` item is terminal
pub type ResourceStream = BoxStream<'static, Result<Value>>;

/// One page of a paginated search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub resources: Vec<Value>,
    /// Absolute URL of the following page
    pub next: Option<String>,
}

/// A paginated producer of target-resource objects
#[async_trait]
pub trait RemoteRecordSource: Send + Sync {
    /// URL of the first page for a query path such as `Patient?gender=female`
    fn first_page_url(&self, query: &str) -> Result<String>;

    /// Fetch a single page
    async fn fetch_page(&self, url: &str) -> Result<Page>;
}

/// Stream every resource `query` yields, fetching pages on demand
///
/// At most `buffer` resources are held ahead of the consumer. A fetch
/// failure is sent as the last item.
pub fn paginate(source: Arc<dyn RemoteRecordSource>, query: impl Into<String>, buffer: usize) -> ResourceStream {
    let query = query.into();
    let (tx, rx) = mpsc::channel::<Result<Value>>(buffer.max(1));

    tokio::spawn(async move {
        let mut next = match source.first_page_url(&query) {
            Ok(url) => Some(url),
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if tx.is_closed() {
                break;
            }
            tracing::debug!(%url, page = pages, "fetching page");
            let page = match source.fetch_page(&url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "page fetch failed");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            pages += 1;

            for resource in page.resources {
                if tx.send(Ok(resource)).await.is_err() {
                    tracing::debug!(%query, pages, "consumer dropped, pagination stopped");
                    return;
                }
            }
            next = page.next;
        }
        tracing::debug!(%query, pages, "pagination finished");
    });

    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
