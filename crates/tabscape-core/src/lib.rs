// Item models, sources and request routing for the two caches
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod router;
pub mod serve;

pub use config::Config;
pub use error::Error;
pub use models::{BackgroundImage, Item, Quote};
pub use router::{Action, Request, Response, Router};
pub use serve::serve;

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
