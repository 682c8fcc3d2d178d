use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::{is_retryable_status, with_retry, RetryConfig, Transient};

const QUOTE_FEED_URL: &str = "https://feeds.feedburner.com/brainyquote/QUOTEBR";
const QUOTE_WEBSITE: &str = "BrainyQuote.com";

/// Quotes kept from each feed download
pub const DEFAULT_MAX_QUOTES: usize = 5;

#[derive(Error, Debug)]
pub enum QuoteFeedError {
    #[error("Feed returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("RSS parsing failed: {0}")]
    ParseError(#[from] rss::Error),
}

impl Transient for QuoteFeedError {
    fn is_transient(&self) -> bool {
        match self {
            QuoteFeedError::Status(status) => is_retryable_status(*status),
            QuoteFeedError::NetworkError(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            QuoteFeedError::ParseError(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, QuoteFeedError>;

/// Quote of the day entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuote {
    pub quote: String,
    pub author: String,
    pub url: String,
    pub website: String,
}

impl FeedQuote {
    /// The feed puts the quote in `<description>` (wrapped in quotation
    /// marks) and the author in `<title>`. Entries missing either are unusable.
    fn from_item(item: &rss::Item) -> Option<Self> {
        let description = item.description()?;
        let author = item.title()?;

        Some(Self {
            quote: description.trim_matches('"').to_string(),
            author: author.to_string(),
            url: item.link().unwrap_or_default().to_string(),
            website: QUOTE_WEBSITE.to_string(),
        })
    }
}

/// Turns an RSS document into at most `max_quotes` entries, `None` for
/// unusable ones
pub fn parse_feed(xml: &[u8], max_quotes: usize) -> Result<Vec<Option<FeedQuote>>> {
    let channel = rss::Channel::read_from(xml)?;

    Ok(channel
        .items()
        .iter()
        .take(max_quotes)
        .map(FeedQuote::from_item)
        .collect())
}

pub struct QuoteFeedClient {
    client: reqwest::Client,
    feed_url: String,
    max_quotes: usize,
    retry_config: RetryConfig,
}

impl QuoteFeedClient {
    pub fn new() -> Self {
        Self::with_feed_url(QUOTE_FEED_URL.to_string())
    }

    pub fn with_feed_url(feed_url: String) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Tabscape/0.1.0"),
        );
        // The feed changes daily, never take a proxy's copy
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            reqwest::header::HeaderValue::from_static("no-store"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            feed_url,
            max_quotes: DEFAULT_MAX_QUOTES,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_max_quotes(mut self, max_quotes: usize) -> Self {
        self.max_quotes = max_quotes;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Download and parse the feed
    pub async fn fetch_quotes(&self) -> Result<Vec<Option<FeedQuote>>> {
        let body = with_retry(&self.retry_config, || self.download_feed()).await?;

        let quotes = parse_feed(&body, self.max_quotes)?;
        debug!("Quote feed yielded {} entries", quotes.len());
        Ok(quotes)
    }

    async fn download_feed(&self) -> Result<Vec<u8>> {
        let response = self.client.get(&self.feed_url).send().await?;

        if !response.status().is_success() {
            return Err(QuoteFeedError::Status(response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl Default for QuoteFeedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(title: &str, description: &str) -> String {
        format!(
            "<item><title>{}</title><description>{}</description><link>https://www.brainyquote.com/q/{}</link></item>",
            title,
            description,
            title.replace(' ', "_")
        )
    }

    fn feed(items: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Quote of the Day</title><link>https://www.brainyquote.com</link><description>Daily quotes</description>{}</channel></rss>"#,
            items.join("")
        )
    }

    #[test]
    fn test_parse_feed_maps_fields() {
        let xml = feed(&[item("Maya Angelou", "\"Nothing will work unless you do.\"")]);

        let quotes = parse_feed(xml.as_bytes(), 5).unwrap();

        assert_eq!(
            quotes,
            vec![Some(FeedQuote {
                quote: "Nothing will work unless you do.".to_string(),
                author: "Maya Angelou".to_string(),
                url: "https://www.brainyquote.com/q/Maya_Angelou".to_string(),
                website: "BrainyQuote.com".to_string(),
            })]
        );
    }

    #[test]
    fn test_parse_feed_caps_and_marks_incomplete_items() {
        let mut items: Vec<String> = (0..7).map(|i| item(&format!("Author {}", i), "\"Words\"")).collect();
        items[1] = "<item><title>No words</title></item>".to_string();

        let quotes = parse_feed(feed(&items).as_bytes(), 5).unwrap();

        assert_eq!(quotes.len(), 5);
        assert!(quotes[1].is_none());
        assert_eq!(quotes.iter().flatten().count(), 4);
    }

    #[test]
    fn test_inner_quotation_marks_survive() {
        let xml = feed(&[item("Someone", "\"\"He said \"\"go\"\"\"\"")]);

        let quotes = parse_feed(xml.as_bytes(), 5).unwrap();

        assert_eq!(quotes[0].as_ref().unwrap().quote, "He said \"\"go");
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(parse_feed(b"definitely not xml", 5).is_err());
    }

    #[tokio::test]
    async fn test_fetch_quotes_bypasses_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brainyquote/QUOTEBR"))
            .and(header("cache-control", "no-store"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(feed(&[item("Seneca", "\"Luck is what happens when preparation meets opportunity.\"")])),
            )
            .mount(&server)
            .await;

        let client = QuoteFeedClient::with_feed_url(format!("{}/brainyquote/QUOTEBR", server.uri()))
            .with_retry_config(RetryConfig::none());

        let quotes = client.fetch_quotes().await.unwrap();

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].as_ref().unwrap().author, "Seneca");
    }

    #[tokio::test]
    async fn test_fetch_quotes_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[item("Plato", "\"Be kind.\"")])))
            .mount(&server)
            .await;

        let client = QuoteFeedClient::with_feed_url(format!("{}/feed", server.uri())).with_retry_config(RetryConfig {
            max_retries: 2,
            initial_delay_ms: 5,
            max_delay_ms: 10,
            backoff_multiplier: 2.0,
        });

        let quotes = client.fetch_quotes().await.unwrap();

        assert_eq!(quotes[0].as_ref().unwrap().quote, "Be kind.");
    }
}
