//! Feed parsers: source document text in, normalized items out.
//!
//! Parsers are selected from a fixed registry keyed by feed type and the
//! view's mapping variant. Each parser is a pure function over one staged
//! record's text.

mod atom;
mod google_trends;
mod rss;

pub use atom::AtomParser;
pub use google_trends::{GoogleTrendsParser, TrendsIdentity};
pub use rss::RssParser;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ParseError, ProcessError};
use crate::item::NormalizedItem;

/// Feed type of scraped sources whose parser depends on the view mapping
pub const SCRAPER_FEED_TYPE: &str = "web.scraper.python_custom";

/// Mapping variant: Google Trends topics, one group per trend
pub const MAPPING_GOOGLE_TRENDS: &str = "google_trends";
/// Mapping variant: Google Trends news items identified by their URL
pub const MAPPING_GOOGLE_TRENDS_NEWS: &str = "google_trends_news";
/// Mapping variant: RSS 2.0 channel
pub const MAPPING_RSS: &str = "rss";
/// Mapping variant: Atom feed
pub const MAPPING_ATOM: &str = "atom";

/// Converts one source document into items
pub trait FeedParser: Send + Sync {
    /// Parse `data` into items; parsing the same text twice yields the same items
    fn parse(&self, data: &str) -> Result<Vec<NormalizedItem>, ParseError>;
}

/// Parsers by `(feed_type, mapping)`, with a default mapping per feed type
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<(String, String), Arc<dyn FeedParser>>,
    default_mappings: HashMap<String, String>,
}

impl ParserRegistry {
    /// Registry with the built-in parsers
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(
            SCRAPER_FEED_TYPE,
            MAPPING_GOOGLE_TRENDS,
            Arc::new(GoogleTrendsParser::new(TrendsIdentity::Content)),
        );
        registry.register(
            SCRAPER_FEED_TYPE,
            MAPPING_GOOGLE_TRENDS_NEWS,
            Arc::new(GoogleTrendsParser::new(TrendsIdentity::NewsUrl)),
        );
        registry.register(SCRAPER_FEED_TYPE, MAPPING_RSS, Arc::new(RssParser));
        registry.register(SCRAPER_FEED_TYPE, MAPPING_ATOM, Arc::new(AtomParser));
        registry.set_default(SCRAPER_FEED_TYPE, MAPPING_GOOGLE_TRENDS);
        registry
    }

    /// Register `parser` for a feed type and mapping, replacing any previous one
    pub fn register(&mut self, feed_type: &str, mapping: &str, parser: Arc<dyn FeedParser>) {
        self.parsers
            .insert((feed_type.to_string(), mapping.to_string()), parser);
    }

    /// Mapping used when a view names none
    pub fn set_default(&mut self, feed_type: &str, mapping: &str) {
        self.default_mappings
            .insert(feed_type.to_string(), mapping.to_string());
    }

    /// Parser for a job's feed type and the view's mapping
    ///
    /// # Errors
    ///
    /// [`ProcessError::UnsupportedFeedType`] if nothing is registered for the
    /// feed type, [`ProcessError::UnknownMapping`] if the mapping is not.
    pub fn select(
        &self,
        feed_type: &str,
        mapping: Option<&str>,
    ) -> Result<Arc<dyn FeedParser>, ProcessError> {
        if !self.parsers.keys().any(|(known, _)| known == feed_type) {
            return Err(ProcessError::UnsupportedFeedType {
                feed_type: feed_type.to_string(),
            });
        }
        let mapping = mapping
            .or_else(|| self.default_mappings.get(feed_type).map(String::as_str))
            .unwrap_or_default();
        self.parsers
            .get(&(feed_type.to_string(), mapping.to_string()))
            .cloned()
            .ok_or_else(|| ProcessError::UnknownMapping {
                feed_type: feed_type.to_string(),
                mapping: mapping.to_string(),
            })
    }
}

/// Epoch seconds of an RFC 2822 date, as found in RSS `pubDate`
pub(crate) fn rfc2822_seconds(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.timestamp())
}

/// Epoch seconds of an RFC 3339 date, as found in `dc:date` and Atom
pub(crate) fn rfc3339_seconds(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|date| date.timestamp())
}
