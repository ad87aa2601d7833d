//! HTTP transport for OAI-PMH requests with retry logic.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::{ClientConfig, HttpMethod};
use crate::error::{HarvesterError, Result};

/// A successful (2xx) response body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

/// Blocking transport bound to one OAI-PMH base URL.
///
/// Connection errors, timeouts, 429 and 5xx responses are retried with
/// exponential backoff. Any other non-success status fails immediately.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    method: HttpMethod,
    max_attempts: u32,
    retry_base_delay: Duration,
    max_retry_delay: Duration,
    respect_retry_after: bool,
}

impl HttpTransport {
    /// Build a transport from validated client options.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(header_map(&config.extra_headers)?)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            method: config.http_method,
            max_attempts: config.max_attempts(),
            retry_base_delay: config.retry_base_delay,
            max_retry_delay: config.max_retry_delay,
            respect_retry_after: config.respect_retry_after,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Send one OAI-PMH request and return the response body.
    ///
    /// Parameters go into the query string for GET and into a form body
    /// for POST.
    pub fn send(&self, params: &[(String, String)]) -> Result<HttpResponse> {
        let mut last_error: Option<(String, Option<reqwest::Error>)> = None;
        let mut next_delay = Duration::ZERO;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tracing::debug!(
                    attempt,
                    delay_ms = next_delay.as_millis() as u64,
                    "Retrying after delay"
                );
                thread::sleep(next_delay);
            }
            next_delay = self.backoff_delay(attempt);

            tracing::debug!(
                method = self.method.as_str(),
                attempt,
                verb = params.iter().find(|(k, _)| k == "verb").map(|(_, v)| v.as_str()),
                "Sending OAI-PMH request"
            );

            let response = match self.request(params).send() {
                Ok(response) => response,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Connection error, will retry"
                    );
                    last_error = Some((e.to_string(), Some(e)));
                    continue;
                }
                Err(e) => {
                    return Err(HarvesterError::TransportFailure {
                        attempts: attempt,
                        message: e.to_string(),
                        source: Some(e),
                    });
                }
            };

            let status = response.status();
            if is_retryable(status) {
                if let Some(delay) = self.retry_after(&response) {
                    next_delay = delay;
                }
                tracing::warn!(
                    status = %status,
                    attempt,
                    max_attempts = self.max_attempts,
                    "Server error, will retry"
                );
                last_error = Some((format!("Server error: {status}"), None));
                continue;
            }

            if !status.is_success() {
                return Err(HarvesterError::HttpStatus {
                    status: status.as_u16(),
                    url: response.url().to_string(),
                });
            }

            let url = response.url().to_string();
            let body = match response.text() {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Failed to read response body, will retry");
                    last_error = Some((e.to_string(), Some(e)));
                    continue;
                }
            };
            return Ok(HttpResponse {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let (message, source) =
            last_error.unwrap_or_else(|| ("no attempt was made".to_string(), None));
        Err(HarvesterError::TransportFailure {
            attempts: self.max_attempts,
            message,
            source,
        })
    }

    fn request(&self, params: &[(String, String)]) -> reqwest::blocking::RequestBuilder {
        match self.method {
            HttpMethod::Get => self.client.get(&self.base_url).query(params),
            HttpMethod::Post => self.client.post(&self.base_url).form(params),
        }
    }

    /// Exponential backoff after `attempt`: base, 2x base, 4x base, ... capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }

    /// `Retry-After` in seconds on a 503 or 429, capped at the maximum delay.
    fn retry_after(&self, response: &Response) -> Option<Duration> {
        if !self.respect_retry_after {
            return None;
        }
        let status = response.status();
        if status != StatusCode::SERVICE_UNAVAILABLE && status != StatusCode::TOO_MANY_REQUESTS {
            return None;
        }
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(self.max_retry_delay))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            HarvesterError::InvalidParameter(format!("invalid header name '{name}'"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            HarvesterError::InvalidParameter(format!("invalid value for header '{name}'"))
        })?;
        map.append(name, value);
    }
    Ok(map)
}
