//! Normalized items produced by feed parsers, and their deterministic identifiers.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// URL role for the primary link of an item
pub const URL_ROLE_MAIN: &str = "main";
/// URL role for an image; matched against the staged file map
pub const URL_ROLE_PICTURE: &str = "picture";

/// Digest a JSON value into a hex identifier.
///
/// Object keys are serialized in sorted order, so equal values always
/// produce equal identifiers.
pub fn hash_to_id(value: &serde_json::Value) -> String {
    // serde_json::Map is ordered by key without the preserve_order feature
    let canonical = value.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}")
}

/// Grouping shared by several items (e.g. a trending topic and its news items)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemGroup {
    /// Group label
    pub label: Option<String>,
    /// Group publication date, epoch seconds
    pub pub_date: Option<i64>,
    /// Other group attributes
    pub other: Option<BTreeMap<String, String>>,
}

impl ItemGroup {
    /// Identifier shared by every item of the group
    pub fn group_id(&self) -> String {
        hash_to_id(&json!(self))
    }
}

/// Which fields the item identifier is derived from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DataIdBasis {
    /// `[label, date, data_str, data_number]`
    #[default]
    Content,
    /// `[label, url, date]`, for items derived from sampled links
    SampleUrl(String),
}

/// An item with data associated to a specific date, e.g. a publication date
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedItem {
    /// Title or short description
    pub label: String,
    /// Item date, epoch seconds
    pub date: i64,
    /// String values
    pub data_str: Option<BTreeMap<String, String>>,
    /// Numeric values
    pub data_number: Option<BTreeMap<String, serde_json::Number>>,
    /// URLs found in the item mapped to their role (main, picture, ...)
    pub associated_urls: BTreeMap<String, String>,
    /// Parent grouping, for grouped items only
    pub group: Option<ItemGroup>,
    /// Identifier derivation
    pub id_basis: DataIdBasis,
}

impl NormalizedItem {
    /// Create an ungrouped item with only label and date
    pub fn new(label: impl Into<String>, date: i64) -> Self {
        Self {
            label: label.into(),
            date,
            ..Self::default()
        }
    }

    /// Deterministic identifier; re-parsing the same source yields the same id
    pub fn data_id(&self) -> String {
        match &self.id_basis {
            DataIdBasis::Content => hash_to_id(&json!([
                self.label,
                self.date,
                self.data_str,
                self.data_number
            ])),
            DataIdBasis::SampleUrl(url) => hash_to_id(&json!([self.label, url, self.date])),
        }
    }

    /// Identifier of the item's group, if grouped
    pub fn group_id(&self) -> Option<String> {
        self.group.as_ref().map(ItemGroup::group_id)
    }

    /// Picture attached to the upload
    ///
    /// URLs are kept sorted, so when a parser found several pictures the
    /// smallest URL in byte order is chosen, independent of the order the
    /// parser inserted them in. Repeated runs therefore attach the same file.
    pub fn picture_url(&self) -> Option<&str> {
        self.associated_urls
            .iter()
            .find(|(_, role)| role.as_str() == URL_ROLE_PICTURE)
            .map(|(url, _)| url.as_str())
    }

    /// Cleartext document that gets encrypted and uploaded
    pub fn cleartext(&self) -> serde_json::Value {
        let urls = if self.associated_urls.is_empty() {
            serde_json::Value::Null
        } else {
            json!(self.associated_urls)
        };
        let mut doc = json!({
            "label": self.label,
            "date": self.date,
            "data_str": self.data_str,
            "data_number": self.data_number,
            "urls": urls,
        });
        if let (Some(group), Some(map)) = (&self.group, doc.as_object_mut()) {
            map.insert("group".to_string(), json!(group));
        }
        doc
    }
}
