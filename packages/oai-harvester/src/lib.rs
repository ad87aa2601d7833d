//! OAI-PMH harvester - harvest metadata records and export them as DSpace items.
//!
//! This crate harvests records from repositories that implement OAI-PMH 2.0,
//! stores their metadata schema-agnostically, and maps it onto the item
//! format of the DSpace REST API.
//!
//! # Example
//!
//! ```
//! use oai_harvester::{Decoder, ItemExporter};
//!
//! let xml = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
//!   <ListRecords>
//!     <record>
//!       <header><identifier>oai:repo:1</identifier><datestamp>2024-01-15</datestamp></header>
//!       <metadata>
//!         <oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/"
//!                    xmlns:dc="http://purl.org/dc/elements/1.1/">
//!           <dc:title>Sample Paper</dc:title>
//!           <dc:creator>Alice</dc:creator>
//!           <dc:creator>Bob</dc:creator>
//!         </oai_dc:dc>
//!       </metadata>
//!     </record>
//!   </ListRecords>
//! </OAI-PMH>"#;
//!
//! let page = Decoder::new().decode_records(xml).unwrap();
//! let record = &page.records()[0];
//! assert_eq!(record.title(), Some("Sample Paper"));
//! assert_eq!(record.creators(), vec!["Alice", "Bob"]);
//!
//! let item = ItemExporter::default().export_record(record).unwrap();
//! assert_eq!(item.values("dc.contributor.author"), vec!["Alice", "Bob"]);
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration constants, client options and validation
//! - [`error`]: Error types and Result alias
//! - [`metadata`]: Ordered multi-map of qualified field names to values
//! - [`record`]: Records, pages and repository descriptors
//! - [`xml`]: XML utilities
//! - [`decoder`]: OAI-PMH response decoding
//! - [`resumption`]: Resumption-token state machine
//! - [`http`]: HTTP transport with retries
//! - [`harvester`]: Harvest client and lazy list iterators
//! - [`exporter`]: Field mapping to DSpace item documents
//! - [`submit`]: DSpace REST submission
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod exporter;
pub mod harvester;
pub mod http;
pub mod metadata;
pub mod record;
pub mod resumption;
pub mod submit;
pub mod xml;

// Re-export commonly used items
pub use config::{ClientConfig, Granularity, HttpMethod};
pub use decoder::Decoder;
pub use error::{HarvesterError, OaiErrorCode, Result};
pub use exporter::{FieldMapping, ItemDocument, ItemExporter, MetadataEntry, PatchOperation};
pub use harvester::{ListOptions, OaiClient, Pager, RawResponse};
pub use metadata::{Metadata, MetadataValue};
pub use record::{
    DeletedRecordPolicy, Header, MetadataFormat, Page, Record, RecordPage, RepositoryInfo,
    ResumptionInfo, SetInfo,
};
pub use resumption::{ListRequest, ListVerb, Resumption, ResumptionState};
pub use submit::{DSpaceClient, DSpaceObject, ItemSubmitter};
