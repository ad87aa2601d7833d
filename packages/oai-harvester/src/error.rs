//! Error types for the harvester.
//!
//! Transient transport failures are absorbed by the retry loop in
//! [`crate::http`] and surface as [`HarvesterError::TransportFailure`] once
//! retries are exhausted. Transport errors that a retry cannot fix, such as
//! redirect loops, surface as the same variant after one attempt. Every
//! other variant propagates immediately.

use std::fmt;

use thiserror::Error;

/// Error codes defined by OAI-PMH 2.0 for the `<error code="...">` element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OaiErrorCode {
    BadArgument,
    BadVerb,
    BadResumptionToken,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoRecordsMatch,
    NoMetadataFormats,
    NoSetHierarchy,
    /// A code outside the protocol's fixed vocabulary.
    Other(String),
}

impl OaiErrorCode {
    /// Parse the `code` attribute of an `<error>` element.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "badArgument" => Self::BadArgument,
            "badVerb" => Self::BadVerb,
            "badResumptionToken" => Self::BadResumptionToken,
            "cannotDisseminateFormat" => Self::CannotDisseminateFormat,
            "idDoesNotExist" => Self::IdDoesNotExist,
            "noRecordsMatch" => Self::NoRecordsMatch,
            "noMetadataFormats" => Self::NoMetadataFormats,
            "noSetHierarchy" => Self::NoSetHierarchy,
            other => Self::Other(other.to_string()),
        }
    }

    /// Get the wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::BadArgument => "badArgument",
            Self::BadVerb => "badVerb",
            Self::BadResumptionToken => "badResumptionToken",
            Self::CannotDisseminateFormat => "cannotDisseminateFormat",
            Self::IdDoesNotExist => "idDoesNotExist",
            Self::NoRecordsMatch => "noRecordsMatch",
            Self::NoMetadataFormats => "noMetadataFormats",
            Self::NoSetHierarchy => "noSetHierarchy",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for OaiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Transport-level failure, after every retry or at once when not retryable.
    #[error("Request failed after {attempts} attempt(s): {message}")]
    TransportFailure {
        attempts: u32,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Non-retryable HTTP status (4xx and other non-success codes).
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The repository answered with an OAI-PMH `<error>` element.
    #[error("OAI-PMH error [{code}]{}", format_message(.message))]
    Protocol { code: OaiErrorCode, message: String },

    /// The response body is not a well-formed OAI-PMH document.
    #[error("Malformed OAI-PMH response: {0}")]
    MalformedResponse(String),

    /// A caller-supplied parameter failed local validation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The repository rejected a resumption token; the harvest must restart.
    #[error("Resumption token '{token}' was rejected{}", format_message(.message))]
    ExpiredToken { token: String, message: String },

    /// No record with this identifier exists in the repository.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record exists but cannot be disseminated in the requested format.
    #[error("Record {identifier} is not available as '{metadata_prefix}'")]
    NoMetadataForFormat {
        identifier: String,
        metadata_prefix: String,
    },

    /// Deleted records have no metadata and cannot become items.
    #[error("Cannot export deleted record {0}")]
    CannotExportDeleted(String),

    /// The target repository refused a login or an item submission.
    #[error("Submission to {endpoint} failed: {message}")]
    Submission { endpoint: String, message: String },

    /// HTTP client error outside the retry loop (client construction, submission).
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization error.
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),
}

impl From<roxmltree::Error> for HarvesterError {
    fn from(err: roxmltree::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

impl HarvesterError {
    /// The OAI-PMH error code, if this is a protocol error.
    #[must_use]
    pub fn oai_code(&self) -> Option<&OaiErrorCode> {
        match self {
            Self::Protocol { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the repository reported an empty result set.
    #[must_use]
    pub fn is_no_records_match(&self) -> bool {
        matches!(self.oai_code(), Some(OaiErrorCode::NoRecordsMatch))
    }
}

fn format_message(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for code in [
            "badArgument",
            "badVerb",
            "badResumptionToken",
            "cannotDisseminateFormat",
            "idDoesNotExist",
            "noRecordsMatch",
            "noMetadataFormats",
            "noSetHierarchy",
        ] {
            assert_eq!(OaiErrorCode::from_code(code).as_str(), code);
        }
    }

    #[test]
    fn test_unknown_error_code() {
        let code = OaiErrorCode::from_code("tooBusy");
        assert_eq!(code, OaiErrorCode::Other("tooBusy".to_string()));
        assert_eq!(code.to_string(), "tooBusy");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = HarvesterError::Protocol {
            code: OaiErrorCode::BadArgument,
            message: "Illegal argument 'foo'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "OAI-PMH error [badArgument]: Illegal argument 'foo'"
        );
    }

    #[test]
    fn test_protocol_error_display_without_message() {
        let err = HarvesterError::Protocol {
            code: OaiErrorCode::NoSetHierarchy,
            message: String::new(),
        };
        assert_eq!(err.to_string(), "OAI-PMH error [noSetHierarchy]");
    }

    #[test]
    fn test_is_no_records_match() {
        let err = HarvesterError::Protocol {
            code: OaiErrorCode::NoRecordsMatch,
            message: String::new(),
        };
        assert!(err.is_no_records_match());
        assert!(!HarvesterError::NotFound("x".to_string()).is_no_records_match());
    }

    #[test]
    fn test_xml_error_is_malformed_response() {
        let err: HarvesterError = roxmltree::Document::parse("<unclosed>")
            .map(|_| ())
            .unwrap_err()
            .into();
        assert!(matches!(err, HarvesterError::MalformedResponse(_)));
    }
}
