//! Submission of item documents to a DSpace 7+ REST API.
//!
//! Authentication is a single form login that yields a bearer token.
//! Nothing on this side is retried; a failed call surfaces as
//! [`HarvesterError::Submission`].

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::config::{validate_base_url, HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::error::{HarvesterError, Result};
use crate::exporter::ItemDocument;

const XSRF_HEADER: &str = "DSPACE-XSRF-TOKEN";

/// Something that can create items in a target repository.
pub trait ItemSubmitter {
    /// Create one item in a collection and return the repository's response.
    fn create_item(
        &mut self,
        collection_id: &str,
        item: &ItemDocument,
    ) -> Result<serde_json::Value>;

    /// Create items in order, reporting `(done, total)` after each one.
    ///
    /// Stops at the first failure.
    fn upload_items<F>(
        &mut self,
        collection_id: &str,
        items: &[ItemDocument],
        mut on_progress: F,
    ) -> Result<Vec<serde_json::Value>>
    where
        F: FnMut(usize, usize),
    {
        let total = items.len();
        let mut created = Vec::with_capacity(total);
        for (index, item) in items.iter().enumerate() {
            created.push(self.create_item(collection_id, item)?);
            on_progress(index + 1, total);
        }
        Ok(created)
    }
}

/// A collection or community as listed by DSpace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DSpaceObject {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Embedded,
}

#[derive(Debug, Default, Deserialize)]
struct Embedded {
    #[serde(default)]
    collections: Vec<DSpaceObject>,
    #[serde(default)]
    communities: Vec<DSpaceObject>,
}

/// Blocking DSpace REST client.
#[derive(Debug)]
pub struct DSpaceClient {
    client: Client,
    base_url: String,
    email: String,
    password: String,
    auth_token: Option<String>,
    xsrf_token: Option<String>,
    accept_invalid_certs: bool,
}

impl DSpaceClient {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        Ok(Self {
            client: build_client(false)?,
            base_url,
            email: email.into(),
            password: password.into(),
            auth_token: None,
            xsrf_token: None,
            accept_invalid_certs: false,
        })
    }

    /// Skip TLS certificate verification, for test servers with
    /// self-signed certificates.
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Result<Self> {
        if accept != self.accept_invalid_certs {
            self.client = build_client(accept)?;
            self.accept_invalid_certs = accept;
        }
        Ok(self)
    }

    #[must_use]
    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some() || self.xsrf_token.is_some()
    }

    /// Log in with the configured credentials.
    pub fn login(&mut self) -> Result<()> {
        let endpoint = format!("{}/api/authn/login", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .form(&[("user", self.email.as_str()), ("password", self.password.as_str())])
            .send()?;
        let response = check_status(&endpoint, response)?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.auth_token = header(reqwest::header::AUTHORIZATION.as_str());
        self.xsrf_token = header(XSRF_HEADER);

        if !self.is_authenticated() {
            return Err(HarvesterError::Submission {
                endpoint,
                message: "login response carried no token".to_string(),
            });
        }
        tracing::info!(base_url = %self.base_url, "Logged in to DSpace");
        Ok(())
    }

    /// One page of collections.
    pub fn list_collections(&mut self, page: u32, size: u32) -> Result<Vec<DSpaceObject>> {
        Ok(self.list("collections", page, size)?.collections)
    }

    /// One page of communities.
    pub fn list_communities(&mut self, page: u32, size: u32) -> Result<Vec<DSpaceObject>> {
        Ok(self.list("communities", page, size)?.communities)
    }

    fn list(&mut self, kind: &str, page: u32, size: u32) -> Result<Embedded> {
        self.ensure_authenticated()?;
        let endpoint = format!("{}/api/core/{kind}", self.base_url);
        let response = self
            .authorized(self.client.get(&endpoint))
            .query(&[("page", page), ("size", size)])
            .send()?;
        let response = check_status(&endpoint, response)?;
        let list: ListResponse = response.json()?;
        Ok(list.embedded)
    }

    fn ensure_authenticated(&mut self) -> Result<()> {
        if !self.is_authenticated() {
            self.login()?;
        }
        Ok(())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.auth_token {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, token),
            None => request,
        };
        match &self.xsrf_token {
            Some(token) => request.header("X-XSRF-TOKEN", token),
            None => request,
        }
    }
}

impl ItemSubmitter for DSpaceClient {
    fn create_item(
        &mut self,
        collection_id: &str,
        item: &ItemDocument,
    ) -> Result<serde_json::Value> {
        self.ensure_authenticated()?;
        let endpoint = format!("{}/api/core/collections/{collection_id}/items", self.base_url);
        tracing::debug!(collection = collection_id, name = %item.name, "Creating item");

        let response = self
            .authorized(self.client.post(&endpoint))
            .json(item)
            .send()?;
        let response = check_status(&endpoint, response).map_err(|err| match err {
            HarvesterError::Submission { endpoint, message } => HarvesterError::Submission {
                endpoint,
                message: format!("failed to create '{}': {message}", item.name),
            },
            other => other,
        })?;
        Ok(response.json()?)
    }
}

fn build_client(accept_invalid_certs: bool) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?)
}

fn check_status(endpoint: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(HarvesterError::Submission {
        endpoint: endpoint.to_string(),
        message: if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        },
    })
}
