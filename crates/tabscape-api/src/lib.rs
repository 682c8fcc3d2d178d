// Remote sources for the two item kinds
pub mod brainyquote;
pub mod reddit;
pub mod retry;

// Re-export common types
pub use brainyquote::{FeedQuote, QuoteFeedClient, QuoteFeedError};
pub use reddit::{RedditClient, RedditError, RedditImage};
pub use retry::{RetryConfig, Transient};
