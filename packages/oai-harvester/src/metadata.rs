//! Schema-agnostic metadata container.
//!
//! Values are keyed by qualified name (`prefix:local`, or just `local` for
//! unprefixed elements). Keys keep the order in which they were first seen
//! and values keep document order within a key, so the first value is the
//! canonical one for single-value lookups.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataValue {
    /// Trimmed text content of the element.
    pub value: String,

    /// `xml:lang` of the element, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl MetadataValue {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Ordered multi-map from qualified field name to values.
///
/// Lookups never fail: an unknown key yields `None` or an empty list.
///
/// # Examples
/// ```
/// use oai_harvester::Metadata;
///
/// let metadata = Metadata::from_pairs([
///     ("dc:title", "Sample Paper"),
///     ("dc:creator", "Alice"),
///     ("dc:creator", "Bob"),
/// ]);
///
/// assert_eq!(metadata.get("dc:title"), Some("Sample Paper"));
/// assert_eq!(metadata.get_all("dc:creator"), vec!["Alice", "Bob"]);
/// assert!(metadata.get_all("dc:subject").is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    fields: IndexMap<String, Vec<MetadataValue>>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a container from `(qualified name, value)` pairs in order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<MetadataValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut metadata = Self::new();
        for (key, value) in pairs {
            metadata.push(key, value);
        }
        metadata
    }

    /// Append a value; only the decoder and constructors mutate a container.
    pub(crate) fn push(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.fields.entry(key.into()).or_default().push(value.into());
    }

    /// First value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|values| values.first())
            .map(|v| v.value.as_str())
    }

    /// All values for a key in document order; empty if absent.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.values(key).iter().map(|v| v.value.as_str()).collect()
    }

    /// All values for a key including their language tags.
    #[must_use]
    pub fn values(&self, key: &str) -> &[MetadataValue] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Qualified names in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `(qualified name, values)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MetadataValue])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct qualified names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Snapshot as qualified name → list of strings.
    #[must_use]
    pub fn to_mapping(&self) -> IndexMap<String, Vec<String>> {
        self.fields
            .iter()
            .map(|(k, values)| {
                (
                    k.clone(),
                    values.iter().map(|v| v.value.clone()).collect(),
                )
            })
            .collect()
    }

    /// Snapshot with only the first value per qualified name.
    #[must_use]
    pub fn to_flat_mapping(&self) -> IndexMap<String, String> {
        self.fields
            .iter()
            .filter_map(|(k, values)| values.first().map(|v| (k.clone(), v.value.clone())))
            .collect()
    }
}
