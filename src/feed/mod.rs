//! The upstream feed collaborator seam.
//!
//! Query construction and XML normalization happen on the other side of
//! this boundary: a [`FeedSource`] yields a flat, already-normalized page
//! of records for a query. The engine only consumes the seam; the bundled
//! [`RemoteFeedSource`] talks JSON to the companion API service.

mod remote;

pub use remote::RemoteFeedSource;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

use crate::query::FeedQuery;

/// Errors crossing the feed seam. All of these leave the local snapshot
/// untouched: stale-but-valid data keeps displaying.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body was not the expected JSON shape
    #[error("Malformed feed response: {0}")]
    Malformed(String),
}

/// One record as returned by the upstream query: descriptive fields only,
/// no user state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPaper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub primary_category: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

/// One page of feed results. The three counters are informational only;
/// pagination is not driven by them here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub papers: Vec<FetchedPaper>,
    #[serde(default)]
    pub total_results: i64,
    #[serde(default)]
    pub start_index: i64,
    #[serde(default)]
    pub items_per_page: i64,
}

/// Anything that can answer a feed query with a page of normalized records.
pub trait FeedSource: Send + Sync {
    fn fetch(
        &self,
        query: &FeedQuery,
    ) -> impl Future<Output = Result<FeedPage, FetchError>> + Send;
}
