//! Atom feeds.

use std::collections::BTreeMap;

use super::FeedParser;
use crate::error::ParseError;
use crate::item::{NormalizedItem, URL_ROLE_MAIN, URL_ROLE_PICTURE};

/// Parser for Atom feeds
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomParser;

impl FeedParser for AtomParser {
    fn parse(&self, data: &str) -> Result<Vec<NormalizedItem>, ParseError> {
        let feed = atom_syndication::Feed::read_from(data.as_bytes()).map_err(|e| {
            ParseError::InvalidDocument {
                format: "atom",
                reason: e.to_string(),
            }
        })?;

        let items = feed
            .entries()
            .iter()
            .filter_map(|entry| {
                let label = entry.title().as_str().trim();
                if label.is_empty() {
                    return None;
                }
                // Prefer published, fallback to updated
                let date = entry.published().unwrap_or(entry.updated()).timestamp();
                let mut item = NormalizedItem::new(label, date);

                let main = entry
                    .links()
                    .iter()
                    .find(|link| link.rel() == "alternate")
                    .or_else(|| entry.links().first());
                if let Some(link) = main {
                    item.associated_urls
                        .insert(link.href().to_string(), URL_ROLE_MAIN.to_string());
                }
                for link in entry.links().iter().filter(|link| {
                    link.rel() == "enclosure"
                        && link.mime_type().is_some_and(|t| t.starts_with("image/"))
                }) {
                    item.associated_urls
                        .entry(link.href().to_string())
                        .or_insert_with(|| URL_ROLE_PICTURE.to_string());
                }

                if let Some(summary) = entry.summary() {
                    let summary = summary.as_str().trim();
                    if !summary.is_empty() {
                        item.data_str = Some(BTreeMap::from([(
                            "summary".to_string(),
                            summary.to_string(),
                        )]));
                    }
                }
                Some(item)
            })
            .collect();
        Ok(items)
    }
}
