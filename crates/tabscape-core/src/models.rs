use serde::{Deserialize, Serialize};

/// Background image shown behind the new tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundImage {
    pub title: String,
    pub img_src: String,
    pub redditlink: String,
    pub copyright: String,
    pub user: String,
}

/// Quote rendered over the background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub quote: String,
    pub author: String,
    pub url: String,
    pub website: String,
}

/// Anything the router hands back to the display side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Image(BackgroundImage),
    Quote(Quote),
}

impl From<BackgroundImage> for Item {
    fn from(image: BackgroundImage) -> Self {
        Item::Image(image)
    }
}

impl From<Quote> for Item {
    fn from(quote: Quote) -> Self {
        Item::Quote(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_is_tagged_by_kind() {
        let item = Item::from(Quote {
            quote: "Be kind.".to_string(),
            author: "Plato".to_string(),
            url: "https://example.com".to_string(),
            website: "BrainyQuote.com".to_string(),
        });

        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["kind"], "quote");
        assert_eq!(value["author"], "Plato");
    }
}
