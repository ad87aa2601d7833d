//! Core data types for harvested records and listing pages.
//!
//! A [`Record`] is an immutable value built by the decoder. Its typed
//! accessors (`title`, `creators`, ...) look a logical field up across
//! schema variants using a fixed priority order:
//!
//! 1. `dc:<name>`
//! 2. `dcterms:<name>`
//! 3. bare `<name>` (unprefixed elements)
//! 4. field-specific extras, e.g. `dcterms:abstract` for descriptions
//! 5. any other `<prefix>:<name>` key, in the order keys were first seen
//!
//! Single-value accessors return the first value of the first key present
//! in that order. All-values accessors flatten every matching key in the
//! same order and drop exact duplicates.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::config::Granularity;
use crate::metadata::Metadata;

/// Namespace prefixes tried, in order, before extras and suffix matches.
const PRIORITY_PREFIXES: [&str; 3] = ["dc", "dcterms", ""];

/// A logical field and the extra qualified names that also feed it.
#[derive(Debug, Clone, Copy)]
struct LogicalField {
    name: &'static str,
    extras: &'static [&'static str],
}

impl LogicalField {
    const fn plain(name: &'static str) -> Self {
        Self { name, extras: &[] }
    }

    const fn with_extras(name: &'static str, extras: &'static [&'static str]) -> Self {
        Self { name, extras }
    }
}

const TITLE: LogicalField = LogicalField::plain("title");
const CREATOR: LogicalField = LogicalField::plain("creator");
const CONTRIBUTOR: LogicalField = LogicalField::plain("contributor");
const SUBJECT: LogicalField = LogicalField::plain("subject");
const DESCRIPTION: LogicalField = LogicalField::with_extras("description", &["dcterms:abstract"]);
const PUBLISHER: LogicalField = LogicalField::plain("publisher");
const DATE: LogicalField = LogicalField::with_extras("date", &["dcterms:issued"]);
const TYPE: LogicalField = LogicalField::plain("type");
const FORMAT: LogicalField = LogicalField::plain("format");
const IDENTIFIER: LogicalField = LogicalField::plain("identifier");
const LANGUAGE: LogicalField = LogicalField::plain("language");
const RIGHTS: LogicalField = LogicalField::with_extras("rights", &["dcterms:license"]);
const SOURCE: LogicalField = LogicalField::plain("source");
const RELATION: LogicalField = LogicalField::plain("relation");

/// Header of an OAI-PMH record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub identifier: String,
    pub datestamp: String,
    pub set_specs: Vec<String>,
    pub deleted: bool,
}

/// A harvested record or deletion tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Repository-assigned identifier, unique within the source repository.
    pub identifier: String,

    /// Last-modified datestamp as sent by the repository.
    pub datestamp: String,

    /// Sets this record belongs to, in document order without duplicates.
    pub set_specs: Vec<String>,

    /// True for tombstones; only header information is valid then.
    pub deleted: bool,

    /// Metadata fields; always empty when `deleted`.
    pub metadata: Metadata,

    /// The original `<record>` XML, kept only when the decoder is asked to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_xml: Option<String>,
}

impl Record {
    /// Create a record from its header and metadata.
    ///
    /// Metadata is discarded for deleted headers.
    #[must_use]
    pub fn new(header: Header, metadata: Metadata) -> Self {
        let metadata = if header.deleted {
            Metadata::new()
        } else {
            metadata
        };
        Self {
            identifier: header.identifier,
            datestamp: header.datestamp,
            set_specs: header.set_specs,
            deleted: header.deleted,
            metadata,
            raw_xml: None,
        }
    }

    /// Create a header-only record (ListIdentifiers, tombstones).
    #[must_use]
    pub fn from_header(header: Header) -> Self {
        Self::new(header, Metadata::new())
    }

    #[must_use]
    pub fn with_raw_xml(mut self, raw_xml: impl Into<String>) -> Self {
        self.raw_xml = Some(raw_xml.into());
        self
    }

    /// Parse the datestamp into UTC, accepting both OAI granularities.
    #[must_use]
    pub fn datestamp_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.datestamp) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(&self.datestamp, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Granularity of the datestamp, if it is a valid OAI datestamp.
    #[must_use]
    pub fn datestamp_granularity(&self) -> Option<Granularity> {
        crate::config::validate_oai_date(&self.datestamp).ok()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.first(TITLE)
    }

    #[must_use]
    pub fn titles(&self) -> Vec<&str> {
        self.all(TITLE)
    }

    #[must_use]
    pub fn creators(&self) -> Vec<&str> {
        self.all(CREATOR)
    }

    #[must_use]
    pub fn contributors(&self) -> Vec<&str> {
        self.all(CONTRIBUTOR)
    }

    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        self.all(SUBJECT)
    }

    /// First description, falling back to `dcterms:abstract`.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.first(DESCRIPTION)
    }

    #[must_use]
    pub fn descriptions(&self) -> Vec<&str> {
        self.all(DESCRIPTION)
    }

    #[must_use]
    pub fn publisher(&self) -> Option<&str> {
        self.first(PUBLISHER)
    }

    /// First date, falling back to `dcterms:issued`.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.first(DATE)
    }

    #[must_use]
    pub fn dates(&self) -> Vec<&str> {
        self.all(DATE)
    }

    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        self.all(TYPE)
    }

    #[must_use]
    pub fn formats(&self) -> Vec<&str> {
        self.all(FORMAT)
    }

    /// Identifier-like metadata values (DOI, URI, ISBN, ...).
    ///
    /// These come from the metadata body, not the OAI header identifier.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.all(IDENTIFIER)
    }

    #[must_use]
    pub fn languages(&self) -> Vec<&str> {
        self.all(LANGUAGE)
    }

    #[must_use]
    pub fn rights(&self) -> Vec<&str> {
        self.all(RIGHTS)
    }

    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        self.all(SOURCE)
    }

    #[must_use]
    pub fn relations(&self) -> Vec<&str> {
        self.all(RELATION)
    }

    /// Qualified names feeding a logical field, in priority order.
    fn matching_keys(&self, field: LogicalField) -> Vec<&str> {
        let mut keys: IndexSet<&str> = IndexSet::new();

        for prefix in PRIORITY_PREFIXES {
            let candidate = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{prefix}:{}", field.name)
            };
            if let Some(key) = self.metadata.keys().find(|k| *k == candidate) {
                keys.insert(key);
            }
        }

        for extra in field.extras {
            if let Some(key) = self.metadata.keys().find(|k| k == extra) {
                keys.insert(key);
            }
        }

        for key in self.metadata.keys() {
            if let Some((_, local)) = key.split_once(':') {
                if local == field.name {
                    keys.insert(key);
                }
            }
        }

        keys.into_iter().collect()
    }

    fn first(&self, field: LogicalField) -> Option<&str> {
        if self.deleted {
            return None;
        }
        self.matching_keys(field)
            .into_iter()
            .find_map(|key| self.metadata.get(key))
    }

    fn all(&self, field: LogicalField) -> Vec<&str> {
        if self.deleted {
            return Vec::new();
        }
        let values: IndexSet<&str> = self
            .matching_keys(field)
            .into_iter()
            .flat_map(|key| self.metadata.get_all(key))
            .collect();
        values.into_iter().collect()
    }
}

/// Pagination details carried by a `<resumptionToken>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionInfo {
    /// Opaque continuation cursor; `None` when absent or empty.
    pub token: Option<String>,
    pub complete_list_size: Option<u64>,
    pub cursor: Option<u64>,
    pub expiration_date: Option<String>,
}

impl ResumptionInfo {
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// One HTTP response worth of listing results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub resumption: ResumptionInfo,
}

/// A page of records from ListRecords or ListIdentifiers.
pub type RecordPage = Page<Record>;

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, resumption: ResumptionInfo) -> Self {
        Self { items, resumption }
    }

    /// True when a non-empty resumption token was issued.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.resumption.has_more()
    }

    #[must_use]
    pub fn resumption_token(&self) -> Option<&str> {
        self.resumption.token.as_deref().filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn complete_list_size(&self) -> Option<u64> {
        self.resumption.complete_list_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl Page<Record> {
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.items
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// How a repository keeps track of deletions (Identify `deletedRecord`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletedRecordPolicy {
    No,
    Transient,
    Persistent,
    Unknown(String),
}

impl DeletedRecordPolicy {
    #[must_use]
    pub fn from_identify(text: &str) -> Self {
        match text.trim() {
            "no" => Self::No,
            "transient" => Self::Transient,
            "persistent" => Self::Persistent,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::No => "no",
            Self::Transient => "transient",
            Self::Persistent => "persistent",
            Self::Unknown(other) => other,
        }
    }
}

/// Repository descriptor returned by Identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub repository_name: String,
    pub base_url: String,
    pub protocol_version: String,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: String,
    pub deleted_record: DeletedRecordPolicy,
    /// `None` when the advertised granularity is not one of the two legal values.
    pub granularity: Option<Granularity>,
}

/// A set advertised by ListSets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInfo {
    pub set_spec: String,
    pub set_name: String,
}

/// A metadata format advertised by ListMetadataFormats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFormat {
    pub prefix: String,
    pub namespace: String,
    pub schema: String,
}
