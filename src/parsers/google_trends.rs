//! Google Trends "trending now" RSS.
//!
//! Each channel item is a trending topic carrying `ht:` extension elements:
//! traffic estimate, picture and a list of `ht:news_item`. Every news item
//! becomes one item grouped under its topic.

use std::collections::BTreeMap;

use rss::extension::Extension;

use super::{FeedParser, rfc2822_seconds};
use crate::error::ParseError;
use crate::item::{DataIdBasis, ItemGroup, NormalizedItem, URL_ROLE_MAIN, URL_ROLE_PICTURE};

/// Namespace of the `ht:` extension elements
pub const TRENDS_NAMESPACE: &str = "https://trends.google.com/trending/rss";

/// How news item identifiers are derived
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrendsIdentity {
    /// From label, date and values
    Content,
    /// From label, news URL and date
    NewsUrl,
}

/// Parser for Google Trends RSS documents
#[derive(Clone, Copy, Debug)]
pub struct GoogleTrendsParser {
    identity: TrendsIdentity,
}

impl GoogleTrendsParser {
    /// Create a parser with the given item identity
    pub fn new(identity: TrendsIdentity) -> Self {
        Self { identity }
    }
}

/// Extension children are keyed by local name; tolerate prefixed keys too
fn child<'a>(ext: &'a Extension, local: &str) -> Option<&'a Extension> {
    ext.children()
        .iter()
        .find(|(name, _)| {
            name.as_str() == local || name.rsplit_once(':').is_some_and(|(_, l)| l == local)
        })
        .and_then(|(_, values)| values.first())
}

fn child_text(ext: &Extension, local: &str) -> Option<String> {
    child(ext, local)
        .and_then(Extension::value)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FeedParser for GoogleTrendsParser {
    fn parse(&self, data: &str) -> Result<Vec<NormalizedItem>, ParseError> {
        let channel = data
            .parse::<rss::Channel>()
            .map_err(|e| ParseError::InvalidDocument {
                format: "google trends rss",
                reason: e.to_string(),
            })?;

        let prefix = channel
            .namespaces()
            .iter()
            .find(|(_, uri)| uri.as_str() == TRENDS_NAMESPACE)
            .map(|(prefix, _)| prefix.as_str())
            .unwrap_or("ht");

        let mut items = Vec::new();
        for topic in channel.items() {
            let Some(label) = topic.title() else {
                continue;
            };
            let Some(pub_date) = topic.pub_date().and_then(rfc2822_seconds) else {
                tracing::warn!(topic = label, "Trend without a parsable pubDate, skipping");
                continue;
            };
            let ht = topic.extensions().get(prefix);
            let first = |local: &str| {
                ht.and_then(|map| map.get(local))
                    .and_then(|values| values.first())
            };
            let text = |local: &str| {
                first(local)
                    .and_then(Extension::value)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };

            let group = ItemGroup {
                label: Some(label.to_string()),
                pub_date: Some(pub_date),
                other: text("approx_traffic")
                    .map(|traffic| BTreeMap::from([("approx_traffic".to_string(), traffic)])),
            };
            let group_picture = text("picture");

            let news_items = ht
                .and_then(|map| map.get("news_item"))
                .map(Vec::as_slice)
                .unwrap_or_default();
            for news in news_items {
                let Some(title) = child_text(news, "news_item_title") else {
                    continue;
                };
                let mut item = NormalizedItem::new(title, pub_date);
                item.group = Some(group.clone());

                let url = child_text(news, "news_item_url");
                if let Some(url) = &url {
                    item.associated_urls
                        .insert(url.clone(), URL_ROLE_MAIN.to_string());
                }
                if let Some(picture) =
                    child_text(news, "news_item_picture").or_else(|| group_picture.clone())
                {
                    item.associated_urls
                        .insert(picture, URL_ROLE_PICTURE.to_string());
                }
                if let Some(source) = child_text(news, "news_item_source") {
                    item.data_str = Some(BTreeMap::from([("source".to_string(), source)]));
                }
                if let (TrendsIdentity::NewsUrl, Some(url)) = (self.identity, url) {
                    item.id_basis = DataIdBasis::SampleUrl(url);
                }
                items.push(item);
            }
        }
        Ok(items)
    }
}
