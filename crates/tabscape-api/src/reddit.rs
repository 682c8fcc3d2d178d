use std::io::Cursor;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::retry::{is_retryable_status, with_retry, RetryConfig, Transient};

const REDDIT_LISTING_URL: &str = "https://www.reddit.com/r/EarthPorn.json";
const REDDIT_IMAGE_HOST: &str = "https://i.redd.it/";

/// How many posts to ask reddit for
pub const DEFAULT_LISTING_LIMIT: u32 = 40;
/// How many of the surviving candidates get downloaded
pub const DEFAULT_DOWNLOAD_LIMIT: usize = 10;

// Tags like "[OC]" or "[4000x3000]" in post titles
static TITLE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]").expect("valid title tag pattern"));

#[derive(Error, Debug)]
pub enum RedditError {
    #[error("Reddit returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl Transient for RedditError {
    fn is_transient(&self) -> bool {
        match self {
            RedditError::Status(status) => is_retryable_status(*status),
            RedditError::NetworkError(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            RedditError::ParseError(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RedditError>;

/// A landscape picked from a reddit listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedditImage {
    pub title: String,
    pub img_src: String,
    pub redditlink: String,
    pub copyright: String,
    pub user: String,
}

/// Listing envelope: `{"data": {"children": [{"data": {...}}]}}`
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditPost,
}

/// The parts of a reddit post we care about
#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    pub over_18: Option<bool>,
    pub preview: Option<Preview>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Preview {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewImage {
    pub source: PreviewSource,
}

/// Dimensions are occasionally missing or null on individual posts
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewSource {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

pub fn width_within_range(width: u32) -> bool {
    width > 1000 && width < 4000
}

pub fn height_within_range(height: u32) -> bool {
    height > 1000 && height < 2500
}

/// Strips bracketed tags from a post title
pub fn clean_title(title: &str) -> String {
    TITLE_TAGS.replace_all(title, "").trim().to_string()
}

impl RedditPost {
    /// SFW post with a usable preview of background-sized dimensions,
    /// hosted on `image_host`
    fn is_candidate(&self, image_host: &str) -> bool {
        if self.over_18 != Some(false) {
            return false;
        }

        let Some(preview) = &self.preview else {
            return false;
        };
        if !preview.enabled {
            return false;
        }
        let Some(first) = preview.images.first() else {
            return false;
        };

        first.source.width.is_some_and(width_within_range)
            && first.source.height.is_some_and(height_within_range)
            && self.url.starts_with(image_host)
    }

    fn into_image(self) -> RedditImage {
        RedditImage {
            title: clean_title(&self.title),
            copyright: format!("Image uploaded by reddit user {}", self.author),
            redditlink: format!("https://reddit.com/{}", self.permalink),
            img_src: self.url,
            user: self.author,
        }
    }
}

/// Keeps candidate posts in listing order, capped at `download_limit`
pub fn select_candidates(posts: Vec<RedditPost>, image_host: &str, download_limit: usize) -> Vec<RedditImage> {
    posts
        .into_iter()
        .filter(|post| post.is_candidate(image_host))
        .take(download_limit)
        .map(RedditPost::into_image)
        .collect()
}

/// Reads the pixel dimensions of an encoded image
fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub struct RedditClient {
    client: reqwest::Client,
    listing_url: String,
    image_host: String,
    listing_limit: u32,
    download_limit: usize,
    retry_config: RetryConfig,
}

impl RedditClient {
    pub fn new() -> Self {
        Self::with_listing_url(REDDIT_LISTING_URL.to_string())
    }

    /// For another subreddit or testing with a local server
    pub fn with_listing_url(listing_url: String) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Tabscape/0.1.0"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            listing_url,
            image_host: REDDIT_IMAGE_HOST.to_string(),
            listing_limit: DEFAULT_LISTING_LIMIT,
            download_limit: DEFAULT_DOWNLOAD_LIMIT,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_limits(mut self, listing_limit: u32, download_limit: usize) -> Self {
        self.listing_limit = listing_limit;
        self.download_limit = download_limit;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Only image URLs under this prefix are accepted
    pub fn with_image_host(mut self, image_host: String) -> Self {
        self.image_host = image_host;
        self
    }

    /// Fetch the listing and keep the posts worth downloading
    pub async fn fetch_candidates(&self) -> Result<Vec<RedditImage>> {
        let posts = with_retry(&self.retry_config, || self.fetch_listing()).await?;

        let total = posts.len();
        let candidates = select_candidates(posts, &self.image_host, self.download_limit);
        debug!("Reddit listing: {} posts, {} candidates", total, candidates.len());
        Ok(candidates)
    }

    async fn fetch_listing(&self) -> Result<Vec<RedditPost>> {
        let response = self
            .client
            .get(&self.listing_url)
            .query(&[("limit", self.listing_limit)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RedditError::Status(response.status()));
        }

        let body = response.bytes().await?;
        let listing: Listing = serde_json::from_slice(&body)?;
        Ok(listing.data.children.into_iter().map(|child| child.data).collect())
    }

    /// Download the image and make sure it is real
    ///
    /// Reddit answers missing images with a small placeholder, so anything
    /// that doesn't decode to a background-sized width is rejected.
    pub async fn validate(&self, image: RedditImage) -> Option<RedditImage> {
        let bytes = match self.download(&image.img_src).await {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("Dropping {}: {}", image.img_src, err);
                return None;
            }
        };

        match image_dimensions(&bytes) {
            Some((width, _)) if width_within_range(width) => Some(image),
            Some((width, height)) => {
                debug!("Dropping {}: unexpected size {}x{}", image.img_src, width, height);
                None
            }
            None => {
                debug!("Dropping {}: not a decodable image", image.img_src);
                None
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RedditError::Status(response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// One batch of images, broken downloads marked as `None`
    pub async fn fetch_images(&self) -> Result<Vec<Option<RedditImage>>> {
        let candidates = self.fetch_candidates().await?;

        let checks = candidates.into_iter().map(|image| self.validate(image));
        let images = futures::future::join_all(checks).await;

        info!(
            "Fetched {} reddit images ({} usable)",
            images.len(),
            images.iter().filter(|image| image.is_some()).count()
        );
        Ok(images)
    }
}

impl Default for RedditClient {
    fn default() -> Self {
        Self::new()
    }
}
