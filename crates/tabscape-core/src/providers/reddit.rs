// Reddit provider - bridges the listing client with the BatchFetcher trait
use async_trait::async_trait;
use tabscape_api::{RedditClient, RedditImage};
use tabscape_cache::BatchFetcher;

use crate::{config::Config, models::BackgroundImage};

/// Wrapper around RedditClient that feeds the image cache
pub struct RedditImageProvider {
    client: RedditClient,
}

impl RedditImageProvider {
    pub fn new(client: RedditClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Self {
        let images = &config.images;
        let client = RedditClient::with_listing_url(images.listing_url.clone())
            .with_image_host(images.image_host.clone())
            .with_limits(images.listing_limit, images.download_limit)
            .with_retry_config(config.http.retry_config());

        Self::new(client)
    }
}

#[async_trait]
impl BatchFetcher<BackgroundImage> for RedditImageProvider {
    async fn fetch_batch(&self) -> anyhow::Result<Vec<Option<BackgroundImage>>> {
        let images = self.client.fetch_images().await?;
        Ok(images
            .into_iter()
            .map(|image| image.map(reddit_to_background))
            .collect())
    }
}

fn reddit_to_background(image: RedditImage) -> BackgroundImage {
    BackgroundImage {
        title: image.title,
        img_src: image.img_src,
        redditlink: image.redditlink,
        copyright: image.copyright,
        user: image.user,
    }
}
