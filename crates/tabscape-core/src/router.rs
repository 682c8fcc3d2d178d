// Request routing - named actions in, one item out
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tabscape_cache::{HitThreshold, RefreshCache};
use tracing::{debug, warn};

use crate::{
    config::Config,
    models::{BackgroundImage, Item, Quote},
    providers::{QuoteFeedProvider, RedditImageProvider},
    Error, Result,
};

/// The two things the display side can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    GetBackgroundImage,
    GetQuote,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetBackgroundImage => "GET_BACKGROUND_IMAGE",
            Action::GetQuote => "GET_QUOTE",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET_BACKGROUND_IMAGE" => Ok(Action::GetBackgroundImage),
            "GET_QUOTE" => Ok(Action::GetQuote),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

/// One line of the serve protocol: `{"id": 7, "action": "GET_QUOTE"}`
///
/// The action stays a plain string so an unknown one can still be answered
/// with the caller's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<u64>,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseBody {
    Ok { item: Item },
    Error { error: String },
}

impl Response {
    fn from_result(id: Option<u64>, result: Result<Item>) -> Self {
        let body = match result {
            Ok(item) => ResponseBody::Ok { item },
            Err(err) => ResponseBody::Error {
                error: err.to_string(),
            },
        };
        Self { id, body }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.body, ResponseBody::Ok { .. })
    }
}

/// Owns one cache per item kind and answers actions from them
///
/// Each action is a single pass-through to its cache. Nothing is retried
/// here; the caches and their fetchers own that.
pub struct Router {
    images: RefreshCache<BackgroundImage>,
    quotes: RefreshCache<Quote>,
}

impl Router {
    pub fn new(images: RefreshCache<BackgroundImage>, quotes: RefreshCache<Quote>) -> Self {
        Self { images, quotes }
    }

    /// Builds both caches from config and starts priming them
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config) -> Self {
        let images = RefreshCache::new(
            config.images.cache_options(&config.http),
            RedditImageProvider::from_config(config),
            HitThreshold::new(config.images.hit_threshold),
        );
        let quotes = RefreshCache::new(
            config.quotes.cache_options(&config.http),
            QuoteFeedProvider::from_config(config),
            HitThreshold::new(config.quotes.hit_threshold),
        );

        Self::new(images, quotes)
    }

    pub async fn handle(&self, action: Action) -> Result<Item> {
        debug!("Handling {}", action);
        let item = match action {
            Action::GetBackgroundImage => Item::Image(self.images.get().await?),
            Action::GetQuote => Item::Quote(self.quotes.get().await?),
        };
        Ok(item)
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        let result = match request.action.parse::<Action>() {
            Ok(action) => self.handle(action).await,
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            warn!("Request {:?} failed: {}", request.id, err);
        }
        Response::from_result(request.id, result)
    }

    /// Decodes one JSON request line and answers it
    pub async fn handle_message(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(err) => Self::reject(Error::from(err)),
        }
    }

    /// Like [`Router::handle_message`] for a raw line that may not be UTF-8
    pub async fn handle_bytes(&self, line: &[u8]) -> Response {
        match std::str::from_utf8(line) {
            Ok(line) => self.handle_message(line).await,
            Err(err) => Self::reject(Error::from(err)),
        }
    }

    fn reject(err: Error) -> Response {
        warn!("{}", err);
        Response::from_result(None, Err(err))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tabscape_cache::{BatchFetcher, CacheOptions};

    pub(crate) struct FixedBatch<T>(pub(crate) Vec<Option<T>>);

    #[async_trait]
    impl<T: Clone + Send + Sync + 'static> BatchFetcher<T> for FixedBatch<T> {
        async fn fetch_batch(&self) -> anyhow::Result<Vec<Option<T>>> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn image() -> BackgroundImage {
        BackgroundImage {
            title: "Misty valley".to_string(),
            img_src: "https://i.redd.it/a.jpg".to_string(),
            redditlink: "https://reddit.com//r/EarthPorn/comments/abc/".to_string(),
            copyright: "Image uploaded by reddit user hiker".to_string(),
            user: "hiker".to_string(),
        }
    }

    pub(crate) fn quote() -> Quote {
        Quote {
            quote: "Be kind.".to_string(),
            author: "Plato".to_string(),
            url: "https://www.brainyquote.com/q/plato".to_string(),
            website: "BrainyQuote.com".to_string(),
        }
    }

    pub(crate) fn router(images: Vec<Option<BackgroundImage>>, quote_options: CacheOptions) -> Router {
        Router::new(
            RefreshCache::new(
                CacheOptions::new("images", Duration::from_secs(3600)),
                FixedBatch(images),
                HitThreshold::new(10),
            ),
            RefreshCache::new(quote_options, FixedBatch(vec![None, Some(quote())]), HitThreshold::new(10)),
        )
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!("GET_QUOTE".parse::<Action>().unwrap(), Action::GetQuote);
        assert_eq!(
            serde_json::to_string(&Action::GetBackgroundImage).unwrap(),
            "\"GET_BACKGROUND_IMAGE\""
        );
        assert!(matches!("GET_WEATHER".parse::<Action>(), Err(Error::UnknownAction(_))));
    }

    #[tokio::test]
    async fn test_each_action_reaches_its_cache() {
        let router = router(vec![Some(image())], CacheOptions::new("quotes", Duration::from_secs(3600)));

        assert_eq!(router.handle(Action::GetBackgroundImage).await.unwrap(), Item::Image(image()));
        assert_eq!(router.handle(Action::GetQuote).await.unwrap(), Item::Quote(quote()));
    }

    #[tokio::test]
    async fn test_handle_message_round_trip() {
        let router = router(vec![Some(image())], CacheOptions::new("quotes", Duration::from_secs(3600)));

        let response = router.handle_message(r#"{"id": 7, "action": "GET_QUOTE"}"#).await;
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["item"]["kind"], "quote");
        assert_eq!(json["item"]["author"], "Plato");
    }

    #[tokio::test]
    async fn test_unknown_action_keeps_id() {
        let router = router(vec![Some(image())], CacheOptions::new("quotes", Duration::from_secs(3600)));

        let response = router.handle_message(r#"{"id": 3, "action": "GET_WEATHER"}"#).await;

        assert_eq!(response.id, Some(3));
        assert_eq!(
            response.body,
            ResponseBody::Error {
                error: "Unknown action: GET_WEATHER".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_rejected() {
        let router = router(vec![Some(image())], CacheOptions::new("quotes", Duration::from_secs(3600)));

        let response = router.handle_bytes(b"{\"action\": \"GET_\xff\"}").await;

        assert_eq!(response.id, None);
        match response.body {
            ResponseBody::Error { error } => assert!(error.starts_with("Malformed request")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let router = router(vec![Some(image())], CacheOptions::new("quotes", Duration::from_secs(3600)));

        let response = router.handle_message("GET_QUOTE please").await;

        assert!(!response.is_ok());
        assert_eq!(response.id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_with_read_timeout_reports_error() {
        let router = Router::new(
            RefreshCache::new(
                CacheOptions::new("images", Duration::from_secs(3600)).with_read_timeout(Duration::from_secs(2)),
                FixedBatch(vec![None, None]),
                HitThreshold::new(10),
            ),
            RefreshCache::new(
                CacheOptions::new("quotes", Duration::from_secs(3600)),
                FixedBatch(vec![Some(quote())]),
                HitThreshold::new(10),
            ),
        );

        let response = router
            .handle_request(Request {
                id: Some(1),
                action: "GET_BACKGROUND_IMAGE".to_string(),
            })
            .await;

        match response.body {
            ResponseBody::Error { error } => assert!(error.contains("No item became available")),
            other => panic!("expected error, got {:?}", other),
        }
        // The other kind is unaffected
        assert!(router.handle(Action::GetQuote).await.is_ok());
    }
}
