//! Harvest client that ties transport, decoder and resumption together.

use std::collections::VecDeque;

use crate::config::{validate_metadata_prefix, ClientConfig, DEFAULT_METADATA_PREFIX};
use crate::decoder::{check_envelope, parse_document, Decoder};
use crate::error::{HarvesterError, OaiErrorCode, Result};
use crate::http::HttpTransport;
use crate::record::{MetadataFormat, Page, Record, RecordPage, RepositoryInfo, SetInfo};
use crate::resumption::{ListRequest, ListVerb, Resumption};

/// Filters for ListRecords and ListIdentifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub metadata_prefix: String,
    pub set_spec: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_PREFIX)
    }
}

impl ListOptions {
    #[must_use]
    pub fn new(metadata_prefix: impl Into<String>) -> Self {
        Self {
            metadata_prefix: metadata_prefix.into(),
            set_spec: None,
            from: None,
            until: None,
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

    fn to_request(&self) -> ListRequest {
        ListRequest {
            metadata_prefix: Some(self.metadata_prefix.clone()),
            set_spec: self.set_spec.clone(),
            from: self.from.clone(),
            until: self.until.clone(),
            identifier: None,
        }
    }
}

/// Undecoded response of an arbitrary request sent through [`OaiClient::harvest`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub params: Vec<(String, String)>,
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl RawResponse {
    /// The `verb` parameter of the request, if one was sent.
    #[must_use]
    pub fn verb(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == "verb")
            .map(|(_, value)| value.as_str())
    }

    /// Check that the body is an OAI-PMH envelope without an `<error>`.
    pub fn check(&self) -> Result<()> {
        let doc = parse_document(&self.body)?;
        check_envelope(&doc).map(|_| ())
    }

    /// Decode the body as a ListRecords page.
    pub fn records(&self) -> Result<RecordPage> {
        Decoder::new().decode_records(&self.body)
    }
}

/// OAI-PMH client bound to one repository.
///
/// Requests are strictly sequential: list iterators fetch the next page
/// only once the current one is consumed.
///
/// # Examples
/// ```no_run
/// use oai_harvester::{ClientConfig, ListOptions, OaiClient};
///
/// let client = OaiClient::new(ClientConfig::new("https://repo.example.org/oai"))?;
/// for record in client.list_records(&ListOptions::new("oai_dc").with_set("col_1"))? {
///     let record = record?;
///     println!("{} {:?}", record.identifier, record.title());
/// }
/// # Ok::<(), oai_harvester::HarvesterError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OaiClient {
    transport: HttpTransport,
    decoder: Decoder,
}

impl OaiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(&config)?,
            decoder: Decoder::new(),
        })
    }

    /// Client with default options for `base_url`.
    pub fn from_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(ClientConfig::new(base_url))
    }

    /// Keep the source XML of each harvested record.
    #[must_use]
    pub fn with_preserve_raw(mut self, preserve_raw: bool) -> Self {
        self.decoder = self.decoder.with_preserve_raw(preserve_raw);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Describe the repository.
    pub fn identify(&self) -> Result<RepositoryInfo> {
        let body = self.fetch(&[param("verb", "Identify")])?;
        self.decoder.decode_identify(&body)
    }

    /// Fetch one record.
    ///
    /// # Errors
    /// `NotFound` when the repository does not know `identifier`,
    /// `NoMetadataForFormat` when it cannot disseminate `metadata_prefix`
    /// for that record.
    pub fn get_record(&self, identifier: &str, metadata_prefix: &str) -> Result<Record> {
        if identifier.trim().is_empty() {
            return Err(HarvesterError::InvalidParameter(
                "identifier must not be empty".to_string(),
            ));
        }
        validate_metadata_prefix(metadata_prefix)?;

        let params = [
            param("verb", "GetRecord"),
            param("identifier", identifier),
            param("metadataPrefix", metadata_prefix),
        ];
        let record = self
            .fetch(&params)
            .and_then(|body| self.decoder.decode_get_record(&body))
            .map_err(|err| match err.oai_code() {
                Some(OaiErrorCode::IdDoesNotExist) => {
                    HarvesterError::NotFound(identifier.to_string())
                }
                Some(OaiErrorCode::CannotDisseminateFormat) => {
                    HarvesterError::NoMetadataForFormat {
                        identifier: identifier.to_string(),
                        metadata_prefix: metadata_prefix.to_string(),
                    }
                }
                _ => err,
            })?;

        record.ok_or_else(|| HarvesterError::NotFound(identifier.to_string()))
    }

    /// First page of a ListRecords listing; exactly one round trip.
    pub fn list_records_page(&self, options: &ListOptions) -> Result<RecordPage> {
        self.first_page(ListVerb::ListRecords, &options.to_request(), Decoder::decode_records)
    }

    /// Redeem a ListRecords resumption token from an earlier page.
    ///
    /// # Errors
    /// `ExpiredToken` when the repository rejects the token; the harvest
    /// has to be restarted from the first page.
    pub fn resume(&self, token: &str) -> Result<RecordPage> {
        self.resume_page(ListVerb::ListRecords, token, Decoder::decode_records)
    }

    /// First page of a ListIdentifiers listing.
    pub fn list_identifiers_page(&self, options: &ListOptions) -> Result<RecordPage> {
        self.first_page(
            ListVerb::ListIdentifiers,
            &options.to_request(),
            Decoder::decode_identifiers,
        )
    }

    /// Redeem a ListIdentifiers resumption token.
    pub fn resume_identifiers(&self, token: &str) -> Result<RecordPage> {
        self.resume_page(ListVerb::ListIdentifiers, token, Decoder::decode_identifiers)
    }

    /// One page of sets: the first one, or the one behind `token`.
    pub fn list_sets_page(&self, token: Option<&str>) -> Result<Page<SetInfo>> {
        match token {
            Some(token) => self.resume_page(ListVerb::ListSets, token, Decoder::decode_sets),
            None => self.first_page(
                ListVerb::ListSets,
                &ListRequest::default(),
                Decoder::decode_sets,
            ),
        }
    }

    /// One page of metadata formats, optionally for a single item.
    pub fn list_metadata_formats_page(
        &self,
        identifier: Option<&str>,
        token: Option<&str>,
    ) -> Result<Page<MetadataFormat>> {
        match token {
            Some(token) => {
                self.resume_page(ListVerb::ListMetadataFormats, token, Decoder::decode_formats)
            }
            None => self.first_page(
                ListVerb::ListMetadataFormats,
                &formats_request(identifier),
                Decoder::decode_formats,
            ),
        }
    }

    /// Lazily iterate every record of a listing across all pages.
    ///
    /// Parameters are validated before any request is sent. Calling this
    /// again starts a fresh harvest from the first page.
    pub fn list_records(&self, options: &ListOptions) -> Result<Pager<'_, Record>> {
        let resumption = Resumption::new(ListVerb::ListRecords, options.to_request())?;
        Ok(Pager::new(self, resumption, Decoder::decode_records))
    }

    /// Lazily iterate record headers; metadata is never decoded.
    pub fn list_identifiers(&self, options: &ListOptions) -> Result<Pager<'_, Record>> {
        let resumption = Resumption::new(ListVerb::ListIdentifiers, options.to_request())?;
        Ok(Pager::new(self, resumption, Decoder::decode_identifiers))
    }

    /// Lazily iterate every set of the repository.
    #[must_use]
    pub fn list_sets(&self) -> Pager<'_, SetInfo> {
        let resumption = Resumption::sets();
        Pager::new(self, resumption, Decoder::decode_sets)
    }

    /// Lazily iterate metadata formats, optionally for a single item.
    pub fn list_metadata_formats(
        &self,
        identifier: Option<&str>,
    ) -> Result<Pager<'_, MetadataFormat>> {
        let resumption =
            Resumption::new(ListVerb::ListMetadataFormats, formats_request(identifier))?;
        Ok(Pager::new(self, resumption, Decoder::decode_formats))
    }

    /// Send arbitrary parameters and return the undecoded response.
    ///
    /// Transport retries still apply; the body is not checked.
    pub fn harvest<K, V>(&self, params: &[(K, V)]) -> Result<RawResponse>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| param(k.as_ref(), v.as_ref()))
            .collect();
        let response = self.transport.send(&params)?;
        Ok(RawResponse {
            params,
            status: response.status,
            url: response.url,
            body: response.body,
        })
    }

    fn fetch(&self, params: &[(String, String)]) -> Result<String> {
        Ok(self.transport.send(params)?.body)
    }

    fn first_page<T>(
        &self,
        verb: ListVerb,
        request: &ListRequest,
        decode: DecodeFn<T>,
    ) -> Result<Page<T>> {
        request.validate(verb)?;
        let body = self.fetch(&request.to_params(verb))?;
        decode(&self.decoder, &body)
    }

    fn resume_page<T>(&self, verb: ListVerb, token: &str, decode: DecodeFn<T>) -> Result<Page<T>> {
        if token.trim().is_empty() {
            return Err(HarvesterError::InvalidParameter(
                "resumption token must not be empty".to_string(),
            ));
        }
        let params = [param("verb", verb.as_str()), param("resumptionToken", token)];
        self.fetch(&params)
            .and_then(|body| decode(&self.decoder, &body))
            .map_err(|err| token_error(err, Some(token)))
    }
}

type DecodeFn<T> = fn(&Decoder, &str) -> Result<Page<T>>;

/// Lazy, forward-only iterator over a paginated listing.
///
/// One HTTP request is issued per page, and only when the items of the
/// previous page have been consumed. After an error the iterator yields
/// that error once and then ends.
pub struct Pager<'a, T> {
    client: &'a OaiClient,
    resumption: Resumption,
    decode: DecodeFn<T>,
    buffer: VecDeque<T>,
    pages_fetched: u32,
    complete_list_size: Option<u64>,
}

impl<'a, T> Pager<'a, T> {
    fn new(client: &'a OaiClient, resumption: Resumption, decode: DecodeFn<T>) -> Self {
        Self {
            client,
            resumption,
            decode,
            buffer: VecDeque::new(),
            pages_fetched: 0,
            complete_list_size: None,
        }
    }

    /// Number of pages fetched so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// `completeListSize` of the most recent page that advertised one.
    #[must_use]
    pub fn complete_list_size(&self) -> Option<u64> {
        self.complete_list_size
    }

    /// Token that the next request would redeem.
    ///
    /// Callers that want to continue an interrupted harvest later keep this.
    #[must_use]
    pub fn resumption_token(&self) -> Option<&str> {
        self.resumption.pending_token()
    }

    fn fetch_next_page(&mut self) -> Option<Result<()>> {
        let params = self.resumption.next_request()?;
        let token = self.resumption.pending_token().map(str::to_string);

        let page = self
            .client
            .fetch(&params)
            .and_then(|body| (self.decode)(&self.client.decoder, &body))
            .map_err(|err| token_error(err, token.as_deref()));

        match page {
            Ok(page) => {
                self.resumption.record_page(page.resumption_token());
                self.pages_fetched += 1;
                if let Some(size) = page.complete_list_size() {
                    self.complete_list_size = Some(size);
                }
                self.buffer.extend(page.items);
                Some(Ok(()))
            }
            Err(err) => {
                self.resumption.abort();
                Some(Err(err))
            }
        }
    }
}

impl<T> Iterator for Pager<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if let Err(err) = self.fetch_next_page()? {
                return Some(Err(err));
            }
        }
    }
}

impl<T> std::fmt::Debug for Pager<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("resumption", &self.resumption)
            .field("buffered", &self.buffer.len())
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}

fn param(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn formats_request(identifier: Option<&str>) -> ListRequest {
    ListRequest {
        identifier: identifier.map(str::to_string),
        ..ListRequest::default()
    }
}

/// A rejected token while redeeming one means the listing expired.
fn token_error(err: HarvesterError, token: Option<&str>) -> HarvesterError {
    match (token, err) {
        (
            Some(token),
            HarvesterError::Protocol {
                code: OaiErrorCode::BadResumptionToken,
                message,
            },
        ) => HarvesterError::ExpiredToken {
            token: token.to_string(),
            message,
        },
        (_, err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_to_request() {
        let options = ListOptions::new("oai_dc")
            .with_set("col_1")
            .with_from("2024-01-01");
        let request = options.to_request();
        assert_eq!(request.metadata_prefix.as_deref(), Some("oai_dc"));
        assert_eq!(request.set_spec.as_deref(), Some("col_1"));
        assert_eq!(request.from.as_deref(), Some("2024-01-01"));
        assert_eq!(request.until, None);
    }

    #[test]
    fn test_default_list_options_use_oai_dc() {
        assert_eq!(ListOptions::default().metadata_prefix, "oai_dc");
    }

    #[test]
    fn test_token_error_maps_bad_resumption_token() {
        let err = HarvesterError::Protocol {
            code: OaiErrorCode::BadResumptionToken,
            message: "expired".to_string(),
        };
        match token_error(err, Some("abc")) {
            HarvesterError::ExpiredToken { token, message } => {
                assert_eq!(token, "abc");
                assert_eq!(message, "expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_token_error_keeps_other_errors() {
        let err = HarvesterError::Protocol {
            code: OaiErrorCode::BadResumptionToken,
            message: String::new(),
        };
        assert!(matches!(
            token_error(err, None),
            HarvesterError::Protocol { .. }
        ));

        let err = HarvesterError::MalformedResponse("x".to_string());
        assert!(matches!(
            token_error(err, Some("abc")),
            HarvesterError::MalformedResponse(_)
        ));
    }

    #[test]
    fn test_list_records_validates_before_request() {
        let client = OaiClient::from_url("http://127.0.0.1:9/oai").unwrap();
        let result = client.list_records(&ListOptions::new("oai_dc").with_from("not-a-date"));
        assert!(matches!(result, Err(HarvesterError::InvalidParameter(_))));
    }

    #[test]
    fn test_get_record_rejects_empty_identifier() {
        let client = OaiClient::from_url("http://127.0.0.1:9/oai").unwrap();
        assert!(matches!(
            client.get_record(" ", "oai_dc"),
            Err(HarvesterError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_raw_response_verb_and_check() {
        let raw = RawResponse {
            params: vec![param("verb", "Identify")],
            status: 200,
            url: "http://repo/oai?verb=Identify".to_string(),
            body: r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><error code="badVerb">no</error></OAI-PMH>"#.to_string(),
        };
        assert_eq!(raw.verb(), Some("Identify"));
        assert!(matches!(raw.check(), Err(HarvesterError::Protocol { .. })));
    }
}
