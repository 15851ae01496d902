//! Generic RSS 2.0 feeds (news sites, blogs).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use rss::extension::ExtensionMap;

use super::{FeedParser, rfc2822_seconds, rfc3339_seconds};
use crate::error::ParseError;
use crate::item::{NormalizedItem, URL_ROLE_MAIN, URL_ROLE_PICTURE};

const MEDIA_NAMESPACE: &str = "http://search.yahoo.com/mrss/";
const SLASH_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/slash/";

static FIRST_PARAGRAPH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").ok());
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

/// Parser for RSS 2.0 channels
#[derive(Clone, Copy, Debug, Default)]
pub struct RssParser;

fn strip_tags(html: &str) -> String {
    let text = match TAG.as_ref() {
        Some(tag) => tag.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of the first `<p>` of an HTML description
fn first_paragraph(html: &str) -> Option<String> {
    let captures = FIRST_PARAGRAPH.as_ref()?.captures(html)?;
    let text = strip_tags(captures.get(1)?.as_str());
    (!text.is_empty()).then_some(text)
}

fn prefix_for<'a>(namespaces: &'a BTreeMap<String, String>, uri: &str, fallback: &'a str) -> &'a str {
    namespaces
        .iter()
        .find(|(_, known)| known.as_str() == uri)
        .map(|(prefix, _)| prefix.as_str())
        .unwrap_or(fallback)
}

/// Image URLs from `media:content` (images only) and `media:thumbnail`
fn media_pictures(extensions: &ExtensionMap, prefix: &str) -> Vec<String> {
    let Some(media) = extensions.get(prefix) else {
        return Vec::new();
    };
    let contents = media.get("content").into_iter().flatten().filter(|ext| {
        let attrs = ext.attrs();
        attrs.get("medium").is_some_and(|m| m == "image")
            || attrs.get("type").is_some_and(|t| t.starts_with("image/"))
    });
    let thumbnails = media.get("thumbnail").into_iter().flatten();
    contents
        .chain(thumbnails)
        .filter_map(|ext| ext.attrs().get("url").cloned())
        .collect()
}

impl FeedParser for RssParser {
    fn parse(&self, data: &str) -> Result<Vec<NormalizedItem>, ParseError> {
        let channel = data
            .parse::<rss::Channel>()
            .map_err(|e| ParseError::InvalidDocument {
                format: "rss",
                reason: e.to_string(),
            })?;
        let media_prefix = prefix_for(channel.namespaces(), MEDIA_NAMESPACE, "media");
        let slash_prefix = prefix_for(channel.namespaces(), SLASH_NAMESPACE, "slash");

        let mut items = Vec::new();
        for entry in channel.items() {
            let Some(label) = entry.title().map(str::trim).filter(|t| !t.is_empty()) else {
                continue;
            };
            let date = entry.pub_date().and_then(rfc2822_seconds).or_else(|| {
                entry
                    .dublin_core_ext()
                    .and_then(|dc| dc.dates().first())
                    .and_then(|d| rfc3339_seconds(d))
            });
            let Some(date) = date else {
                tracing::warn!(title = label, "RSS item without a parsable date, skipping");
                continue;
            };

            let mut item = NormalizedItem::new(label, date);
            if let Some(link) = entry.link() {
                item.associated_urls
                    .insert(link.to_string(), URL_ROLE_MAIN.to_string());
            }
            let enclosure_picture = entry
                .enclosure()
                .filter(|enc| enc.mime_type().starts_with("image/"))
                .map(|enc| enc.url().to_string());
            for picture in media_pictures(entry.extensions(), media_prefix)
                .into_iter()
                .chain(enclosure_picture)
            {
                item.associated_urls
                    .entry(picture)
                    .or_insert_with(|| URL_ROLE_PICTURE.to_string());
            }

            let mut data_str = BTreeMap::new();
            if let Some(description) = entry.description() {
                let text = strip_tags(description);
                if !text.is_empty() {
                    data_str.insert("description".to_string(), text);
                }
                if let Some(snippet) = first_paragraph(description) {
                    data_str.insert("snippet".to_string(), snippet);
                }
            }
            let categories: Vec<&str> = entry.categories().iter().map(|c| c.name()).collect();
            if !categories.is_empty() {
                data_str.insert("subject".to_string(), categories.join(", "));
            }
            if !data_str.is_empty() {
                item.data_str = Some(data_str);
            }

            let comments = entry
                .extensions()
                .get(slash_prefix)
                .and_then(|slash| slash.get("comments"))
                .and_then(|values| values.first())
                .and_then(|ext| ext.value())
                .and_then(|v| v.trim().parse::<i64>().ok());
            if let Some(comments) = comments {
                item.data_number = Some(BTreeMap::from([(
                    "comments".to_string(),
                    serde_json::Number::from(comments),
                )]));
            }

            items.push(item);
        }
        Ok(items)
    }
}
