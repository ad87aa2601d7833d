//! Field mapping from harvested records to DSpace item documents.
//!
//! The exporter is a lossy projection: every qualified name in a record's
//! metadata is looked up in a [`FieldMapping`]; mapped values are appended
//! under the target field in source order, unmapped names are dropped.
//! No network I/O happens here; see [`crate::submit`] for that.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};
use crate::record::Record;

/// Default submission section for workspace patches.
pub const DEFAULT_PATCH_SECTION: &str = "traditionalpageone";

/// Built-in mapping from qualified source names to DSpace fields.
const DEFAULT_MAPPING: &[(&str, &str)] = &[
    // Dublin Core and DC terms
    ("dc:title", "dc.title"),
    ("dcterms:title", "dc.title"),
    ("title", "dc.title"),
    ("dc:creator", "dc.contributor.author"),
    ("dcterms:creator", "dc.contributor.author"),
    ("creator", "dc.contributor.author"),
    ("dc:contributor", "dc.contributor.other"),
    ("dcterms:contributor", "dc.contributor.other"),
    ("contributor", "dc.contributor.other"),
    ("dc:subject", "dc.subject"),
    ("dcterms:subject", "dc.subject"),
    ("subject", "dc.subject"),
    ("dc:description", "dc.description"),
    ("dcterms:description", "dc.description"),
    ("description", "dc.description"),
    ("dcterms:abstract", "dc.description.abstract"),
    ("dc:publisher", "dc.publisher"),
    ("dcterms:publisher", "dc.publisher"),
    ("publisher", "dc.publisher"),
    ("dc:date", "dc.date.issued"),
    ("dcterms:date", "dc.date.issued"),
    ("dcterms:issued", "dc.date.issued"),
    ("date", "dc.date.issued"),
    ("dc:type", "dc.type"),
    ("dcterms:type", "dc.type"),
    ("type", "dc.type"),
    ("dc:format", "dc.format"),
    ("dcterms:format", "dc.format"),
    ("format", "dc.format"),
    ("dc:identifier", "dc.identifier"),
    ("dcterms:identifier", "dc.identifier.uri"),
    ("identifier", "dc.identifier"),
    ("dc:source", "dc.source"),
    ("dcterms:source", "dc.source"),
    ("source", "dc.source"),
    ("dc:language", "dc.language.iso"),
    ("dcterms:language", "dc.language.iso"),
    ("language", "dc.language.iso"),
    ("dc:rights", "dc.rights"),
    ("dcterms:rights", "dc.rights"),
    ("dcterms:license", "dc.rights.license"),
    ("dcterms:accessRights", "dc.rights.accessRights"),
    ("rights", "dc.rights"),
    ("dc:relation", "dc.relation"),
    ("dcterms:relation", "dc.relation"),
    ("relation", "dc.relation"),
    ("dc:coverage", "dc.coverage"),
    ("dcterms:coverage", "dc.coverage"),
    ("dcterms:spatial", "dc.coverage.spatial"),
    ("dcterms:temporal", "dc.coverage.temporal"),
    // OpenAIRE
    ("oaire:resourceType", "dc.type"),
    ("oaire:version", "dc.description.version"),
    ("oaire:citationTitle", "oaire.citation.title"),
    ("oaire:citationVolume", "oaire.citation.volume"),
    ("oaire:citationIssue", "oaire.citation.issue"),
    ("oaire:citationStartPage", "oaire.citation.startPage"),
    ("oaire:citationEndPage", "oaire.citation.endPage"),
    ("oaire:file", "dc.identifier.uri"),
    ("oaire:fundingStream", "oaire.fundingStream"),
    ("oaire:awardNumber", "oaire.awardNumber"),
    ("oaire:awardTitle", "oaire.awardTitle"),
    ("oaire:awardURI", "oaire.awardURI"),
    // DataCite
    ("datacite:identifier", "dc.identifier"),
    ("datacite:creator", "dc.contributor.author"),
    ("datacite:title", "dc.title"),
    ("datacite:subject", "dc.subject"),
    ("datacite:date", "dc.date.issued"),
    ("datacite:rights", "dc.rights"),
];

/// Qualified source name → target field path.
///
/// # Examples
/// ```
/// use oai_harvester::FieldMapping;
///
/// let mapping = FieldMapping::default()
///     .with_override("dc:title", "local.title")
///     .with_override("local:category", "local.category");
///
/// assert_eq!(mapping.get("dc:title"), Some("local.title"));
/// assert_eq!(mapping.get("dc:creator"), Some("dc.contributor.author"));
/// assert_eq!(mapping.get("unknown:field"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    entries: IndexMap<String, String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            entries: DEFAULT_MAPPING
                .iter()
                .map(|(source, target)| (source.to_string(), target.to_string()))
                .collect(),
        }
    }
}

impl FieldMapping {
    /// A mapping without any entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// The built-in table merged with `overrides`; overrides win.
    pub fn with_overrides<K, V, I>(overrides: I) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut mapping = Self::default();
        mapping.merge(overrides)?;
        Ok(mapping)
    }

    /// Load overrides from a JSON object file and merge them over the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let overrides: IndexMap<String, String> = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            entries = overrides.len(),
            "Loaded field mapping overrides"
        );
        Self::with_overrides(overrides)
    }

    /// Add one entry, replacing any existing target for `source`.
    #[must_use]
    pub fn with_override(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.insert(source.into(), target.into());
        self
    }

    /// Merge entries into this mapping; later entries win.
    ///
    /// Empty source names or target paths are rejected and leave the
    /// mapping unchanged.
    pub fn merge<K, V, I>(&mut self, overrides: I) -> Result<()>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let overrides: Vec<(String, String)> = overrides
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (source, target) in &overrides {
            validate_entry(source, target)?;
        }
        self.entries.extend(overrides);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry(source: &str, target: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(HarvesterError::InvalidParameter(
            "mapping source field must not be empty".to_string(),
        ));
    }
    if target.trim().is_empty() {
        return Err(HarvesterError::InvalidParameter(format!(
            "mapping target for '{source}' must not be empty"
        )));
    }
    Ok(())
}

/// One value of a DSpace metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub value: String,
    pub language: Option<String>,
    pub authority: Option<String>,
    pub confidence: i32,
}

impl MetadataEntry {
    #[must_use]
    pub fn new(value: impl Into<String>, language: Option<String>) -> Self {
        Self {
            value: value.into(),
            language,
            authority: None,
            confidence: -1,
        }
    }
}

/// Item document accepted by `POST /api/core/collections/{id}/items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDocument {
    pub name: String,
    pub metadata: IndexMap<String, Vec<MetadataEntry>>,
    pub in_archive: bool,
    pub discoverable: bool,
    pub withdrawn: bool,
    #[serde(rename = "type")]
    pub item_type: String,
}

impl ItemDocument {
    /// Values under a target field; empty if the field is absent.
    #[must_use]
    pub fn values(&self, field: &str) -> Vec<&str> {
        self.metadata
            .get(field)
            .map(|entries| entries.iter().map(|e| e.value.as_str()).collect())
            .unwrap_or_default()
    }
}

/// A JSON-Patch operation for a workspace item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Vec<MetadataEntry>,
}

/// Converts records into DSpace item documents.
#[derive(Debug, Clone, Default)]
pub struct ItemExporter {
    mapping: FieldMapping,
}

impl ItemExporter {
    #[must_use]
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    #[must_use]
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Convert one record.
    ///
    /// # Errors
    /// `CannotExportDeleted` for deletion tombstones.
    pub fn export_record(&self, record: &Record) -> Result<ItemDocument> {
        Ok(ItemDocument {
            name: record.title().unwrap_or_default().to_string(),
            metadata: self.build_metadata(record)?,
            in_archive: true,
            discoverable: true,
            withdrawn: false,
            item_type: "item".to_string(),
        })
    }

    /// Convert records in order; the first deleted record aborts the batch.
    pub fn export_records<'r, I>(&self, records: I) -> Result<Vec<ItemDocument>>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        records
            .into_iter()
            .map(|record| self.export_record(record))
            .collect()
    }

    /// Pretty-printed JSON array of item documents.
    pub fn to_json(&self, records: &[Record]) -> Result<String> {
        let items = self.export_records(records)?;
        Ok(serde_json::to_string_pretty(&items)?)
    }

    /// Write the JSON array of item documents to `path` as UTF-8.
    pub fn save(&self, records: &[Record], path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json(records)?;
        fs::write(path.as_ref(), json)?;
        tracing::info!(
            path = %path.as_ref().display(),
            items = records.len(),
            "Saved item documents"
        );
        Ok(())
    }

    /// JSON-Patch `add` operations for `PATCH /api/submission/workspaceitems/{id}`.
    pub fn to_workspace_patch(
        &self,
        record: &Record,
        section: &str,
    ) -> Result<Vec<PatchOperation>> {
        let metadata = self.build_metadata(record)?;
        Ok(metadata
            .into_iter()
            .map(|(field, value)| PatchOperation {
                op: "add".to_string(),
                path: format!("/sections/{section}/{field}"),
                value,
            })
            .collect())
    }

    fn build_metadata(&self, record: &Record) -> Result<IndexMap<String, Vec<MetadataEntry>>> {
        if record.deleted {
            return Err(HarvesterError::CannotExportDeleted(record.identifier.clone()));
        }

        let mut result: IndexMap<String, Vec<MetadataEntry>> = IndexMap::new();
        for (source, values) in record.metadata.iter() {
            let Some(target) = self.mapping.get(source) else {
                tracing::trace!(field = source, "No mapping, dropping field");
                continue;
            };
            result.entry(target.to_string()).or_default().extend(
                values
                    .iter()
                    .map(|v| MetadataEntry::new(v.value.clone(), v.language.clone())),
            );
        }
        Ok(result)
    }
}

/// Columns of the flat CSV listing.
const CSV_HEADER: [&str; 9] = [
    "identifier",
    "datestamp",
    "deleted",
    "sets",
    "title",
    "creators",
    "subjects",
    "date",
    "description",
];

/// Write one CSV row per record; multi-valued cells are joined with `; `.
pub fn write_records_csv<W: std::io::Write>(records: &[Record], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for record in records {
        let sets = record.set_specs.join("; ");
        let creators = record.creators().join("; ");
        let subjects = record.subjects().join("; ");
        csv.write_record([
            record.identifier.as_str(),
            record.datestamp.as_str(),
            if record.deleted { "true" } else { "false" },
            sets.as_str(),
            record.title().unwrap_or_default(),
            creators.as_str(),
            subjects.as_str(),
            record.date().unwrap_or_default(),
            record.description().unwrap_or_default(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}
