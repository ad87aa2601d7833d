//! Configuration constants, client options and parameter validation.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarvesterError, Result};

/// Default metadata prefix; every OAI-PMH repository must support it.
pub const DEFAULT_METADATA_PREFIX: &str = "oai_dc";

/// HTTP timeout in seconds, applied per round trip.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Retries after the first attempt for transient transport failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Upper bound for a single backoff or `Retry-After` wait (seconds).
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

/// User agent string identifying this harvester.
pub const USER_AGENT: &str = concat!("oai-harvester/", env!("CARGO_PKG_VERSION"));

/// OAI-PMH day granularity: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DAY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// OAI-PMH seconds granularity: YYYY-MM-DDThh:mm:ssZ.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SECOND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").expect("valid regex"));

/// Characters OAI-PMH allows in a metadataPrefix (URI unreserved set).
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static METADATA_PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.!~*'()\-]+$").expect("valid regex"));

/// HTTP method used for OAI-PMH requests.
///
/// The protocol allows both; parameters travel in the query string for GET
/// and in a urlencoded form body for POST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = HarvesterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(HarvesterError::InvalidParameter(format!(
                "HTTP method must be GET or POST, got '{s}'"
            ))),
        }
    }
}

/// Date granularity supported by OAI-PMH selective harvesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// YYYY-MM-DD
    Day,
    /// YYYY-MM-DDThh:mm:ssZ
    Second,
}

impl Granularity {
    /// Parse the `<granularity>` value advertised by Identify.
    #[must_use]
    pub fn from_identify(text: &str) -> Option<Self> {
        match text.trim() {
            "YYYY-MM-DD" => Some(Self::Day),
            "YYYY-MM-DDThh:mm:ssZ" => Some(Self::Second),
            _ => None,
        }
    }

    /// The format string as advertised by Identify.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "YYYY-MM-DD",
            Self::Second => "YYYY-MM-DDThh:mm:ssZ",
        }
    }
}

/// Options for an [`crate::OaiClient`].
///
/// Everything except `base_url` has a documented default; see the
/// constants in this module.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub http_method: HttpMethod,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
    /// Honour `Retry-After` on 503 responses instead of the backoff delay.
    pub respect_retry_after: bool,
    pub accept_invalid_certs: bool,
    pub extra_headers: Vec<(String, String)>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_method: HttpMethod::Get,
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_retry_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
            respect_retry_after: true,
            accept_invalid_certs: false,
            extra_headers: Vec::new(),
            user_agent: USER_AGENT.to_string(),
        }
    }

    pub fn with_http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.max_retry_delay = max;
        self
    }

    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Check the options before a client is built from them.
    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.base_url)?;
        if self.timeout.is_zero() {
            return Err(HarvesterError::InvalidParameter(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.retry_base_delay > self.max_retry_delay {
            return Err(HarvesterError::InvalidParameter(format!(
                "retry base delay ({:?}) exceeds maximum retry delay ({:?})",
                self.retry_base_delay, self.max_retry_delay
            )));
        }
        Ok(())
    }

    /// Maximum number of attempts for one request.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Validate an OAI-PMH endpoint URL.
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_base_url;
///
/// assert!(validate_base_url("https://repo.example.org/oai").is_ok());
/// assert!(validate_base_url("ftp://repo.example.org/oai").is_err());
/// assert!(validate_base_url("").is_err());
/// ```
pub fn validate_base_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(HarvesterError::InvalidParameter(
            "URL must not be empty".to_string(),
        ));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(HarvesterError::InvalidParameter(format!(
            "URL must start with http:// or https://, got '{url}'"
        )));
    }
    Ok(())
}

/// Validate a metadata prefix.
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_metadata_prefix;
///
/// assert!(validate_metadata_prefix("oai_dc").is_ok());
/// assert!(validate_metadata_prefix("").is_err());
/// assert!(validate_metadata_prefix("oai dc").is_err());
/// ```
pub fn validate_metadata_prefix(prefix: &str) -> Result<()> {
    if METADATA_PREFIX_PATTERN.is_match(prefix) {
        Ok(())
    } else {
        Err(HarvesterError::InvalidParameter(format!(
            "Invalid metadata prefix: '{prefix}'"
        )))
    }
}

/// Validate an OAI-PMH datestamp and return its granularity.
///
/// Both the shape and the calendar value are checked, so `2024-02-30`
/// is rejected.
///
/// # Examples
/// ```
/// use oai_harvester::config::{validate_oai_date, Granularity};
///
/// assert_eq!(validate_oai_date("2024-01-31").unwrap(), Granularity::Day);
/// assert_eq!(validate_oai_date("2024-01-31T12:00:00Z").unwrap(), Granularity::Second);
/// assert!(validate_oai_date("2024-13-01").is_err());
/// assert!(validate_oai_date("31-01-2024").is_err());
/// ```
pub fn validate_oai_date(date_str: &str) -> Result<Granularity> {
    let invalid = || {
        HarvesterError::InvalidParameter(format!(
            "Invalid date '{date_str}'. Expected YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ"
        ))
    };

    if DAY_PATTERN.is_match(date_str) {
        chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| invalid())?;
        Ok(Granularity::Day)
    } else if SECOND_PATTERN.is_match(date_str) {
        chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%SZ")
            .map_err(|_| invalid())?;
        Ok(Granularity::Second)
    } else {
        Err(invalid())
    }
}

/// Validate optional `from`/`until` selective-harvesting bounds.
///
/// Each bound must be a valid datestamp; when both are given they must
/// share a granularity and `from` must not be after `until`.
pub fn validate_date_range(from: Option<&str>, until: Option<&str>) -> Result<()> {
    let from_granularity = from.map(validate_oai_date).transpose()?;
    let until_granularity = until.map(validate_oai_date).transpose()?;

    if let (Some(from), Some(until), Some(fg), Some(ug)) =
        (from, until, from_granularity, until_granularity)
    {
        if fg != ug {
            return Err(HarvesterError::InvalidParameter(format!(
                "from ({from}) and until ({until}) must use the same granularity"
            )));
        }
        // Same granularity ISO strings order lexicographically
        if from > until {
            return Err(HarvesterError::InvalidParameter(format!(
                "from ({from}) must not be after until ({until})"
            )));
        }
    }

    Ok(())
}
