// Batch fetchers backed by the API clients
pub mod brainyquote;
pub mod reddit;

pub use brainyquote::QuoteFeedProvider;
pub use reddit::RedditImageProvider;
