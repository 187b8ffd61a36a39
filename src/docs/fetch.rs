use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::connectivity::ConnectivityMonitor;
use crate::storage::{Database, DocumentCacheStats, StorageError};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Hard per-document ceiling. A single document larger than this is
/// refused outright rather than evicting the whole cache to fit it.
const MAX_DOCUMENT_SIZE: usize = 200 * 1024 * 1024;

/// Default total-cache cap before oldest-first eviction kicks in.
pub const DEFAULT_CACHE_CAP_BYTES: i64 = 500 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DocumentError {
    /// Not cached and the connectivity monitor reports offline
    #[error("Document not available offline")]
    Offline,
    /// The record has no document URL to fetch from
    #[error("No document URL for '{0}'")]
    NoDocumentUrl(String),
    #[error("Request timed out after 60s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Document too large (exceeds {0} bytes)")]
    TooLarge(usize),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Where a resolved document's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    Cache,
    Network,
}

#[derive(Debug)]
pub struct ResolvedDocument {
    pub data: Vec<u8>,
    pub source: DocumentSource,
}

/// Cache-first document resolution.
///
/// Concurrent resolves for the same id are allowed to race: both may
/// download, and the later write replaces the earlier identical bytes.
/// Wasteful but harmless, and it keeps the resolve path free of any
/// cross-request bookkeeping.
pub struct DocumentFetcher {
    client: reqwest::Client,
    db: Database,
    connectivity: ConnectivityMonitor,
    cache_cap_bytes: i64,
}

impl DocumentFetcher {
    pub fn new(db: Database, connectivity: ConnectivityMonitor) -> Self {
        Self {
            client: reqwest::Client::new(),
            db,
            connectivity,
            cache_cap_bytes: DEFAULT_CACHE_CAP_BYTES,
        }
    }

    pub fn with_cache_cap(mut self, cap_bytes: i64) -> Self {
        self.cache_cap_bytes = cap_bytes;
        self
    }

    /// Reuse an existing client (custom timeouts, proxies, test setups).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Resolve the document for one paper: cached bytes if present,
    /// otherwise download, persist, and return. A cache hit never touches
    /// the network, so it works offline.
    ///
    /// `on_progress` is called with `(bytes_so_far, total_if_known)` as
    /// chunks arrive; `bytes_so_far` only ever grows. On any failure the
    /// partial download is dropped and the cache is left untouched.
    pub async fn resolve<F>(
        &self,
        paper_id: &str,
        url: Option<&str>,
        mut on_progress: F,
    ) -> Result<ResolvedDocument, DocumentError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        if let Some(doc) = self.db.get_document(paper_id).await? {
            tracing::debug!(paper_id = %paper_id, bytes = doc.data.len(), "Document cache hit");
            return Ok(ResolvedDocument {
                data: doc.data,
                source: DocumentSource::Cache,
            });
        }

        if !self.connectivity.is_online() {
            return Err(DocumentError::Offline);
        }
        let url = url.ok_or_else(|| DocumentError::NoDocumentUrl(paper_id.to_string()))?;

        let data = self.download(url, &mut on_progress).await?;

        let now = chrono::Utc::now().timestamp();
        self.db.put_document(paper_id, &data, now).await?;
        // Evict oldest entries over the cap, but never the one just
        // written: the user is about to read it.
        let evicted = self
            .db
            .evict_documents_over(self.cache_cap_bytes, paper_id)
            .await?;
        if evicted > 0 {
            tracing::info!(evicted = evicted, "Evicted documents over cache cap");
        }

        tracing::info!(paper_id = %paper_id, bytes = data.len(), "Document downloaded and cached");
        Ok(ResolvedDocument {
            data,
            source: DocumentSource::Network,
        })
    }

    /// True when opening this paper's document needs no network.
    pub async fn is_available_offline(&self, paper_id: &str) -> Result<bool, DocumentError> {
        Ok(self.db.is_document_cached(paper_id).await?)
    }

    /// Drop one cached document. Missing is fine.
    pub async fn evict(&self, paper_id: &str) -> Result<(), DocumentError> {
        self.db.delete_document(paper_id).await?;
        Ok(())
    }

    pub async fn cache_stats(&self) -> Result<DocumentCacheStats, DocumentError> {
        Ok(self.db.document_cache_stats().await?)
    }

    async fn download<F>(&self, url: &str, on_progress: &mut F) -> Result<Vec<u8>, DocumentError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let response = tokio::time::timeout(FETCH_TIMEOUT, self.client.get(url).send())
            .await
            .map_err(|_| DocumentError::Timeout)?
            .map_err(DocumentError::Network)?;

        if !response.status().is_success() {
            return Err(DocumentError::HttpStatus(response.status().as_u16()));
        }

        let total = response.content_length();
        if let Some(len) = total {
            if len as usize > MAX_DOCUMENT_SIZE {
                return Err(DocumentError::TooLarge(MAX_DOCUMENT_SIZE));
            }
        }
        on_progress(0, total);

        let mut data = Vec::with_capacity(total.unwrap_or(0).min(MAX_DOCUMENT_SIZE as u64) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DocumentError::Network)?;
            if data.len().saturating_add(chunk.len()) > MAX_DOCUMENT_SIZE {
                return Err(DocumentError::TooLarge(MAX_DOCUMENT_SIZE));
            }
            data.extend_from_slice(&chunk);
            on_progress(data.len() as u64, total);
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetcher() -> DocumentFetcher {
        let db = Database::open(":memory:").await.unwrap();
        DocumentFetcher::new(db, ConnectivityMonitor::new(true))
    }

    fn no_progress(_: u64, _: Option<u64>) {}

    #[tokio::test]
    async fn downloads_and_caches_on_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/2401.00001"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 fake".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher().await;
        let url = format!("{}/pdf/2401.00001", server.uri());

        let first = fetcher
            .resolve("2401.00001", Some(&url), no_progress)
            .await
            .unwrap();
        assert_eq!(first.source, DocumentSource::Network);
        assert_eq!(first.data, b"%PDF-1.7 fake");

        // Second resolve is served from cache; expect(1) above proves the
        // network was not hit again.
        let second = fetcher
            .resolve("2401.00001", Some(&url), no_progress)
            .await
            .unwrap();
        assert_eq!(second.source, DocumentSource::Cache);
        assert_eq!(second.data, first.data);
    }

    #[tokio::test]
    async fn cached_document_resolves_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"doc".to_vec()))
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let connectivity = ConnectivityMonitor::new(true);
        let fetcher = DocumentFetcher::new(db, connectivity.clone());
        let url = format!("{}/x", server.uri());
        fetcher.resolve("x", Some(&url), no_progress).await.unwrap();

        connectivity.set_online(false);
        let doc = fetcher.resolve("x", Some(&url), no_progress).await.unwrap();
        assert_eq!(doc.source, DocumentSource::Cache);
        assert!(fetcher.is_available_offline("x").await.unwrap());
    }

    #[tokio::test]
    async fn uncached_document_offline_is_an_error() {
        let db = Database::open(":memory:").await.unwrap();
        let fetcher = DocumentFetcher::new(db, ConnectivityMonitor::new(false));

        match fetcher
            .resolve("nope", Some("http://unused.invalid/d"), no_progress)
            .await
            .unwrap_err()
        {
            DocumentError::Offline => {}
            e => panic!("Expected Offline, got {e:?}"),
        }
    }

    #[tokio::test]
    async fn missing_url_is_an_error() {
        let fetcher = fetcher().await;
        match fetcher.resolve("p1", None, no_progress).await.unwrap_err() {
            DocumentError::NoDocumentUrl(id) => assert_eq!(id, "p1"),
            e => panic!("Expected NoDocumentUrl, got {e:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_caches_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = fetcher().await;
        let url = format!("{}/gone", server.uri());

        match fetcher.resolve("gone", Some(&url), no_progress).await.unwrap_err() {
            DocumentError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {e:?}"),
        }
        assert!(!fetcher.is_available_offline("gone").await.unwrap());
        let stats = fetcher.cache_stats().await.unwrap();
        assert_eq!(stats.total_entries, 0);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_reaches_the_total() {
        let body = vec![7u8; 64 * 1024];
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let fetcher = fetcher().await;
        let url = format!("{}/big", server.uri());

        let mut seen: Vec<(u64, Option<u64>)> = Vec::new();
        fetcher
            .resolve("big", Some(&url), |loaded, total| seen.push((loaded, total)))
            .await
            .unwrap();

        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        let (last_loaded, last_total) = *seen.last().unwrap();
        assert_eq!(last_loaded, body.len() as u64);
        assert_eq!(last_total, Some(body.len() as u64));
    }

    #[tokio::test]
    async fn eviction_drops_oldest_but_not_the_new_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/c"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        // Seed two older entries with explicit timestamps so eviction order
        // is deterministic.
        db.put_document("a", &[0u8; 100], 1_000).await.unwrap();
        db.put_document("b", &[0u8; 100], 2_000).await.unwrap();

        let fetcher =
            DocumentFetcher::new(db, ConnectivityMonitor::new(true)).with_cache_cap(250);
        let url = format!("{}/pdf/c", server.uri());
        fetcher.resolve("c", Some(&url), no_progress).await.unwrap();

        // 300 bytes > 250 cap: the oldest entry goes, the newest stays.
        assert!(!fetcher.is_available_offline("a").await.unwrap());
        assert!(fetcher.is_available_offline("b").await.unwrap());
        assert!(fetcher.is_available_offline("c").await.unwrap());
    }
}
