use std::time::Duration;
use url::Url;

use super::{FeedPage, FeedSource, FetchError};
use crate::query::FeedQuery;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// HTTP-backed [`FeedSource`]: GET `{base}/api/feed` with the query encoded
/// as URL parameters, JSON page in the response body.
#[derive(Clone)]
pub struct RemoteFeedSource {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteFeedSource {
    /// Build a source against a base URL (scheme + host, no trailing path).
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Reuse an existing client (custom timeouts, proxies, test setups).
    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn endpoint(&self, query: &FeedQuery) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join("/api/feed")
            .map_err(|e| FetchError::Malformed(format!("bad base URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("categories", &query.categories.join(","));
            let keywords = query.keywords.trim();
            if !keywords.is_empty() {
                pairs.append_pair("keywords", keywords);
            }
            pairs.append_pair("max_results", &query.max_results.to_string());
        }
        Ok(url)
    }
}

impl FeedSource for RemoteFeedSource {
    async fn fetch(&self, query: &FeedQuery) -> Result<FeedPage, FetchError> {
        let url = self.endpoint(query)?;
        let mut retry_count = 0;

        loop {
            let response =
                tokio::time::timeout(FETCH_TIMEOUT, self.client.get(url.clone()).send())
                    .await
                    .map_err(|_| FetchError::Timeout)?
                    .map_err(FetchError::Network)?;

            // Server errors are transient more often than not; retry with
            // exponential backoff. 4xx fails immediately.
            if response.status().is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::HttpStatus(response.status().as_u16()));
                }
                let delay_secs = 1u64 << retry_count; // 1s, 2s, 4s
                tracing::warn!(
                    url = %url,
                    status = %response.status(),
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Upstream server error, retrying after delay"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let page: FeedPage = response
                .json()
                .await
                .map_err(|e| FetchError::Malformed(e.to_string()))?;

            tracing::debug!(
                papers = page.papers.len(),
                total_results = page.total_results,
                "Fetched feed page"
            );
            return Ok(page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_PAGE: &str = r#"{
        "papers": [
            {
                "id": "2401.00001",
                "title": "Attention Is All You Need",
                "authors": ["Ashish Vaswani"],
                "abstract": "We propose the Transformer.",
                "categories": ["cs.CL"],
                "pdf_url": "https://example.org/pdf/2401.00001.pdf"
            }
        ],
        "total_results": 812,
        "start_index": 0,
        "items_per_page": 50
    }"#;

    fn test_query() -> FeedQuery {
        FeedQuery::new(vec!["cs.AI".into(), "cs.CL".into()], "attention")
    }

    #[tokio::test]
    async fn fetch_parses_page_and_forwards_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/feed"))
            .and(query_param("categories", "cs.AI,cs.CL"))
            .and(query_param("keywords", "attention"))
            .and(query_param("max_results", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let source = RemoteFeedSource::new(&server.uri()).unwrap();
        let page = source.fetch(&test_query()).await.unwrap();

        assert_eq!(page.papers.len(), 1);
        assert_eq!(page.papers[0].id, "2401.00001");
        assert_eq!(page.papers[0].abstract_text, "We propose the Transformer.");
        assert_eq!(page.total_results, 812);
    }

    #[tokio::test]
    async fn empty_keywords_are_omitted_from_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"papers": []}"#))
            .mount(&server)
            .await;

        let source = RemoteFeedSource::new(&server.uri()).unwrap();
        let mut query = test_query();
        query.keywords = "   ".into();
        source.fetch(&query).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].url.query().unwrap_or("").contains("keywords"));
    }

    #[tokio::test]
    async fn client_error_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let source = RemoteFeedSource::new(&server.uri()).unwrap();
        match source.fetch(&test_query()).await.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {e:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_retries_then_succeeds() {
        use wiremock::matchers::any;

        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_PAGE))
            .mount(&server)
            .await;

        let source = RemoteFeedSource::new(&server.uri()).unwrap();
        let page = source.fetch(&test_query()).await.unwrap();
        assert_eq!(page.papers.len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not json"))
            .mount(&server)
            .await;

        let source = RemoteFeedSource::new(&server.uri()).unwrap();
        match source.fetch(&test_query()).await.unwrap_err() {
            FetchError::Malformed(_) => {}
            e => panic!("Expected Malformed, got {e:?}"),
        }
    }
}
