//! Decoding of OAI-PMH response documents.
//!
//! Metadata extraction is schema-agnostic: every leaf element below
//! `<metadata>` becomes a value under its `prefix:local` name, in document
//! order. Nothing branches on the metadata prefix, so `oai_dc`,
//! `oai_openaire`, DataCite and site-specific schemas all decode the same
//! way. Attributes other than `xml:lang` are ignored.
//!
//! Decoding is strict about the envelope and lenient about the payload: a
//! response that does not parse, lacks the verb element, or contains a
//! `<record>` without a usable header fails as a whole with
//! [`HarvesterError::MalformedResponse`]. Unknown metadata elements never
//! fail.

use roxmltree::{Document, Node};

use crate::config::Granularity;
use crate::error::{HarvesterError, OaiErrorCode, Result};
use crate::metadata::{Metadata, MetadataValue};
use crate::record::{
    DeletedRecordPolicy, Header, MetadataFormat, Page, Record, RecordPage, RepositoryInfo,
    ResumptionInfo, SetInfo,
};
use crate::xml::{
    child_text, find_child, find_children, get_tag_name, get_text, is_leaf, is_oai,
    qualified_name, source_text, xml_lang,
};

/// Decoder for OAI-PMH responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    /// Keep the source XML of each `<record>` in [`Record::raw_xml`].
    pub preserve_raw: bool,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_preserve_raw(mut self, preserve_raw: bool) -> Self {
        self.preserve_raw = preserve_raw;
        self
    }

    /// Decode a ListRecords response.
    pub fn decode_records(&self, xml: &str) -> Result<RecordPage> {
        let doc = parse_document(xml)?;
        let list = verb_element(&doc, "ListRecords")?;

        let records = find_children(list, "record")
            .map(|node| self.decode_record(node))
            .collect::<Result<Vec<_>>>()?;
        let resumption = decode_resumption(list);

        tracing::debug!(
            records = records.len(),
            has_more = resumption.has_more(),
            "Decoded ListRecords page"
        );
        Ok(Page::new(records, resumption))
    }

    /// Decode a ListIdentifiers response; records carry headers only.
    pub fn decode_identifiers(&self, xml: &str) -> Result<RecordPage> {
        let doc = parse_document(xml)?;
        let list = verb_element(&doc, "ListIdentifiers")?;

        let records = find_children(list, "header")
            .map(|node| decode_header(node).map(Record::from_header))
            .collect::<Result<Vec<_>>>()?;
        let resumption = decode_resumption(list);

        tracing::debug!(
            headers = records.len(),
            has_more = resumption.has_more(),
            "Decoded ListIdentifiers page"
        );
        Ok(Page::new(records, resumption))
    }

    /// Decode a GetRecord response.
    ///
    /// Returns `None` when the response carries no `<record>`.
    pub fn decode_get_record(&self, xml: &str) -> Result<Option<Record>> {
        let doc = parse_document(xml)?;
        let get_record = verb_element(&doc, "GetRecord")?;
        find_child(get_record, "record")
            .map(|node| self.decode_record(node))
            .transpose()
    }

    /// Decode one `<record>` element into a [`Record`].
    ///
    /// Deleted records keep their header only.
    pub fn decode_record(&self, node: Node<'_, '_>) -> Result<Record> {
        let header_node = find_child(node, "header").ok_or_else(|| {
            HarvesterError::MalformedResponse("<record> without <header>".to_string())
        })?;
        let header = decode_header(header_node)?;

        let mut metadata = Metadata::new();
        if !header.deleted {
            if let Some(metadata_root) = find_child(node, "metadata") {
                extract_metadata(metadata_root, &mut metadata);
            }
        }

        let record = Record::new(header, metadata);
        if self.preserve_raw {
            Ok(record.with_raw_xml(source_text(node)))
        } else {
            Ok(record)
        }
    }

    /// Decode an Identify response.
    pub fn decode_identify(&self, xml: &str) -> Result<RepositoryInfo> {
        let doc = parse_document(xml)?;
        let identify = verb_element(&doc, "Identify")?;

        let admin_emails = find_children(identify, "adminEmail")
            .map(get_text)
            .filter(|e| !e.is_empty())
            .collect();

        Ok(RepositoryInfo {
            repository_name: child_text(identify, "repositoryName"),
            base_url: child_text(identify, "baseURL"),
            protocol_version: child_text(identify, "protocolVersion"),
            admin_emails,
            earliest_datestamp: child_text(identify, "earliestDatestamp"),
            deleted_record: DeletedRecordPolicy::from_identify(&child_text(
                identify,
                "deletedRecord",
            )),
            granularity: Granularity::from_identify(&child_text(identify, "granularity")),
        })
    }

    /// Decode a ListSets response.
    pub fn decode_sets(&self, xml: &str) -> Result<Page<SetInfo>> {
        let doc = parse_document(xml)?;
        let list = verb_element(&doc, "ListSets")?;

        let sets = find_children(list, "set")
            .map(|set| SetInfo {
                set_spec: child_text(set, "setSpec"),
                set_name: child_text(set, "setName"),
            })
            .collect();

        Ok(Page::new(sets, decode_resumption(list)))
    }

    /// Decode a ListMetadataFormats response.
    pub fn decode_formats(&self, xml: &str) -> Result<Page<MetadataFormat>> {
        let doc = parse_document(xml)?;
        let list = verb_element(&doc, "ListMetadataFormats")?;

        let formats = find_children(list, "metadataFormat")
            .map(|format| MetadataFormat {
                prefix: child_text(format, "metadataPrefix"),
                namespace: child_text(format, "metadataNamespace"),
                schema: child_text(format, "schema"),
            })
            .collect();

        Ok(Page::new(formats, decode_resumption(list)))
    }
}

/// Parse a response body.
pub fn parse_document(xml: &str) -> Result<Document<'_>> {
    Ok(Document::parse(xml)?)
}

/// Check the `<OAI-PMH>` envelope and surface any `<error>` element.
///
/// Only the first error is reported; repositories rarely send more than one.
pub fn check_envelope<'a, 'input>(doc: &'a Document<'input>) -> Result<Node<'a, 'input>> {
    let root = doc.root_element();
    if !is_oai(root, "OAI-PMH") {
        return Err(HarvesterError::MalformedResponse(format!(
            "expected <OAI-PMH> root element, found <{}>",
            get_tag_name(root)
        )));
    }

    if let Some(error) = find_child(root, "error") {
        let code = OaiErrorCode::from_code(error.attribute("code").unwrap_or("unknown"));
        return Err(HarvesterError::Protocol {
            code,
            message: get_text(error),
        });
    }

    Ok(root)
}

/// Find the verb-specific element below a valid, error-free envelope.
fn verb_element<'a, 'input>(doc: &'a Document<'input>, verb: &str) -> Result<Node<'a, 'input>> {
    let root = check_envelope(doc)?;
    find_child(root, verb).ok_or_else(|| {
        HarvesterError::MalformedResponse(format!("<{verb}> element not found in response"))
    })
}

/// Decode a record `<header>`.
pub fn decode_header(node: Node<'_, '_>) -> Result<Header> {
    let identifier = child_text(node, "identifier");
    if identifier.is_empty() {
        return Err(HarvesterError::MalformedResponse(
            "<header> without <identifier>".to_string(),
        ));
    }

    let mut set_specs: Vec<String> = Vec::new();
    for spec in find_children(node, "setSpec").map(get_text) {
        if !spec.is_empty() && !set_specs.contains(&spec) {
            set_specs.push(spec);
        }
    }

    Ok(Header {
        identifier,
        datestamp: child_text(node, "datestamp"),
        set_specs,
        deleted: node.attribute("status") == Some("deleted"),
    })
}

/// Walk every leaf below `root` in document order into `metadata`.
fn extract_metadata(root: Node<'_, '_>, metadata: &mut Metadata) {
    for node in root.descendants().skip(1).filter(|n| is_leaf(*n)) {
        let text = leaf_text(node);
        if text.is_empty() {
            continue;
        }
        let mut value = MetadataValue::new(text);
        if let Some(lang) = xml_lang(node) {
            value = value.with_language(lang);
        }
        metadata.push(qualified_name(node), value);
    }
}

/// Concatenated, trimmed text of a leaf (text and CDATA nodes).
fn leaf_text(node: Node<'_, '_>) -> String {
    let text: String = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.trim().to_string()
}

/// Decode the `<resumptionToken>` child of a list element.
pub fn decode_resumption(list: Node<'_, '_>) -> ResumptionInfo {
    let Some(token) = find_child(list, "resumptionToken") else {
        return ResumptionInfo::default();
    };

    let text = get_text(token);
    ResumptionInfo {
        token: (!text.is_empty()).then_some(text),
        complete_list_size: numeric_attribute(token, "completeListSize"),
        cursor: numeric_attribute(token, "cursor"),
        expiration_date: token
            .attribute("expirationDate")
            .map(str::to_string)
            .filter(|s| !s.is_empty()),
    }
}

fn numeric_attribute(node: Node<'_, '_>, name: &str) -> Option<u64> {
    let raw = node.attribute(name)?.trim();
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(attribute = name, value = raw, "Ignoring non-numeric attribute");
            None
        }
    }
}
