//! Resumption-token state machine for OAI-PMH list verbs.
//!
//! ```text
//! Initial ──next_request──▶ AwaitingFirstPage ──record_page──▶ HasToken ──┐
//!                                    │                            ▲       │
//!                                    │                            └───────┘
//!                                    └──────────record_page───────▶ Exhausted
//! ```
//!
//! Tokens are opaque: they are stored and sent back verbatim, never parsed
//! or constructed. A follow-up request carries only the verb and the token.
//! The machine tracks cursor state only; transport retries happen below it
//! in [`crate::http`].

use crate::config::{validate_date_range, validate_metadata_prefix};
use crate::error::{HarvesterError, Result};

/// The four OAI-PMH verbs that return paginated lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListVerb {
    ListRecords,
    ListIdentifiers,
    ListSets,
    ListMetadataFormats,
}

impl ListVerb {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListRecords => "ListRecords",
            Self::ListIdentifiers => "ListIdentifiers",
            Self::ListSets => "ListSets",
            Self::ListMetadataFormats => "ListMetadataFormats",
        }
    }

    /// Whether the verb requires a `metadataPrefix` on its first request.
    #[must_use]
    pub fn requires_metadata_prefix(&self) -> bool {
        matches!(self, Self::ListRecords | Self::ListIdentifiers)
    }
}

/// Filter parameters of the first request of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub metadata_prefix: Option<String>,
    pub set_spec: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    /// Only meaningful for ListMetadataFormats.
    pub identifier: Option<String>,
}

impl ListRequest {
    #[must_use]
    pub fn records(metadata_prefix: impl Into<String>) -> Self {
        Self {
            metadata_prefix: Some(metadata_prefix.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_set(mut self, set_spec: impl Into<String>) -> Self {
        self.set_spec = Some(set_spec.into());
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_until(mut self, until: impl Into<String>) -> Self {
        self.until = Some(until.into());
        self
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Check the parameters against a verb before any request is sent.
    pub fn validate(&self, verb: ListVerb) -> Result<()> {
        if verb.requires_metadata_prefix() {
            let prefix = self.metadata_prefix.as_deref().ok_or_else(|| {
                HarvesterError::InvalidParameter(format!(
                    "{} requires a metadata prefix",
                    verb.as_str()
                ))
            })?;
            validate_metadata_prefix(prefix)?;
            validate_date_range(self.from.as_deref(), self.until.as_deref())?;
        }
        if let Some(identifier) = &self.identifier {
            if identifier.trim().is_empty() {
                return Err(HarvesterError::InvalidParameter(
                    "identifier must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Wire parameters for the first request of `verb`.
    ///
    /// Only the parameters the verb accepts are emitted.
    #[must_use]
    pub fn to_params(&self, verb: ListVerb) -> Vec<(String, String)> {
        let mut params = vec![("verb".to_string(), verb.as_str().to_string())];
        let mut push = |key: &str, value: &Option<String>| {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                params.push((key.to_string(), value.to_string()));
            }
        };

        match verb {
            ListVerb::ListRecords | ListVerb::ListIdentifiers => {
                push("metadataPrefix", &self.metadata_prefix);
                push("set", &self.set_spec);
                push("from", &self.from);
                push("until", &self.until);
            }
            ListVerb::ListMetadataFormats => push("identifier", &self.identifier),
            ListVerb::ListSets => {}
        }
        params
    }
}

/// Pagination cursor state of one listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumptionState {
    /// No request issued yet.
    Initial,
    /// The first request has been issued; its response is pending.
    AwaitingFirstPage,
    /// A token was issued and must be redeemed to continue.
    HasToken(String),
    /// Terminal: the last response carried no (or an empty) token.
    Exhausted,
}

/// Drives one paginated listing from its first request to exhaustion.
#[derive(Debug, Clone)]
pub struct Resumption {
    verb: ListVerb,
    request: ListRequest,
    state: ResumptionState,
    /// A request has been handed out and its page not yet recorded.
    in_flight: bool,
    requests_issued: u32,
}

impl Resumption {
    /// Start a listing; fails with `InvalidParameter` before any request.
    pub fn new(verb: ListVerb, request: ListRequest) -> Result<Self> {
        request.validate(verb)?;
        Ok(Self {
            verb,
            request,
            state: ResumptionState::Initial,
            in_flight: false,
            requests_issued: 0,
        })
    }

    /// Start a ListSets listing, which takes no filters.
    #[must_use]
    pub fn sets() -> Self {
        Self {
            verb: ListVerb::ListSets,
            request: ListRequest::default(),
            state: ResumptionState::Initial,
            in_flight: false,
            requests_issued: 0,
        }
    }

    /// Continue a listing from a token obtained earlier.
    #[must_use]
    pub fn from_token(verb: ListVerb, token: impl Into<String>) -> Self {
        Self {
            verb,
            request: ListRequest::default(),
            state: ResumptionState::HasToken(token.into()),
            in_flight: false,
            requests_issued: 0,
        }
    }

    #[must_use]
    pub fn verb(&self) -> ListVerb {
        self.verb
    }

    #[must_use]
    pub fn state(&self) -> &ResumptionState {
        &self.state
    }

    /// The token the next request will redeem, if any.
    #[must_use]
    pub fn pending_token(&self) -> Option<&str> {
        match &self.state {
            ResumptionState::HasToken(token) => Some(token),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == ResumptionState::Exhausted
    }

    #[must_use]
    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }

    /// Parameters for the next request, or `None` if the listing is
    /// exhausted or a request is still outstanding.
    pub fn next_request(&mut self) -> Option<Vec<(String, String)>> {
        if self.in_flight {
            return None;
        }

        let params = match &self.state {
            ResumptionState::Initial => {
                self.state = ResumptionState::AwaitingFirstPage;
                self.request.to_params(self.verb)
            }
            ResumptionState::HasToken(token) => vec![
                ("verb".to_string(), self.verb.as_str().to_string()),
                ("resumptionToken".to_string(), token.clone()),
            ],
            ResumptionState::AwaitingFirstPage | ResumptionState::Exhausted => return None,
        };

        self.in_flight = true;
        self.requests_issued += 1;
        tracing::debug!(
            verb = self.verb.as_str(),
            request = self.requests_issued,
            "Issuing list request"
        );
        Some(params)
    }

    /// Record the token of the page that answered the outstanding request.
    pub fn record_page(&mut self, token: Option<&str>) {
        self.in_flight = false;
        self.state = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => ResumptionState::HasToken(token.to_string()),
            None => ResumptionState::Exhausted,
        };
        tracing::debug!(verb = self.verb.as_str(), state = ?self.state, "Listing advanced");
    }

    /// Stop the listing after a failed request; nothing more is issued.
    pub fn abort(&mut self) {
        self.in_flight = false;
        self.state = ResumptionState::Exhausted;
    }
}
