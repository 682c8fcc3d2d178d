// Quote feed provider - bridges the RSS client with the BatchFetcher trait
use async_trait::async_trait;
use tabscape_api::{FeedQuote, QuoteFeedClient};
use tabscape_cache::BatchFetcher;

use crate::{config::Config, models::Quote};

/// Wrapper around QuoteFeedClient that feeds the quote cache
pub struct QuoteFeedProvider {
    client: QuoteFeedClient,
}

impl QuoteFeedProvider {
    pub fn new(client: QuoteFeedClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = QuoteFeedClient::with_feed_url(config.quotes.feed_url.clone())
            .with_max_quotes(config.quotes.max_quotes)
            .with_retry_config(config.http.retry_config());

        Self::new(client)
    }
}

#[async_trait]
impl BatchFetcher<Quote> for QuoteFeedProvider {
    async fn fetch_batch(&self) -> anyhow::Result<Vec<Option<Quote>>> {
        let quotes = self.client.fetch_quotes().await?;
        Ok(quotes.into_iter().map(|quote| quote.map(feed_to_quote)).collect())
    }
}

fn feed_to_quote(quote: FeedQuote) -> Quote {
    Quote {
        quote: quote.quote,
        author: quote.author,
        url: quote.url,
        website: quote.website,
    }
}
