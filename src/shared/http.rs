use crate::errors::{BrokerFailure, PluginError};
use crate::shared::constants::REQUEST_TIMEOUT_SECS;
use crate::shared::models::ResourcePage;
use crate::shared::resolver::PageSource;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Status and raw body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Numeric `status` field embedded in a JSON body, if any
    pub fn body_status(&self) -> Option<u16> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        let status = value.get("status")?;
        status
            .as_u64()
            .or_else(|| status.as_f64().map(|f| f as u64))
            .and_then(|s| u16::try_from(s).ok())
    }
}

/// HTTP client owned by the caller, configured once with the TLS policy
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(skip_ssl_validation: bool) -> Result<Self, PluginError> {
        if skip_ssl_validation {
            warn!("TLS certificate validation is disabled by plugin configuration (skipSslFlag)");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(skip_ssl_validation)
            .build()?;

        Ok(Self { client })
    }

    /// Send a JSON request with the given authorization header value
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        authorization: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse, PluginError> {
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        Self::collect(request.send().await?).await
    }

    /// Send a form-encoded POST, as used by the OAuth token endpoint
    pub async fn post_form(
        &self,
        url: &str,
        authorization: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, PluginError> {
        debug!(url = %url, "Sending form request");

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        Self::collect(response).await
    }

    async fn collect(response: reqwest::Response) -> Result<HttpResponse, PluginError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status = %status, bytes = body.len(), "Received response");
        Ok(HttpResponse { status, body })
    }
}

/// Paginated resource listings of the platform API
#[derive(Debug, Clone)]
pub struct PlatformApi {
    http: HttpClient,
    api_endpoint: String,
    authorization: String,
}

impl PlatformApi {
    /// `authorization` is sent verbatim, e.g. the session's `bearer ...` token
    pub fn new(http: HttpClient, api_endpoint: &str, authorization: String) -> Self {
        Self {
            http,
            api_endpoint: api_endpoint.trim_end_matches('/').to_string(),
            authorization,
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.api_endpoint, path)
        }
    }
}

impl PageSource for PlatformApi {
    async fn fetch_page(&self, path: &str) -> Result<ResourcePage, PluginError> {
        let response = self
            .http
            .send(Method::GET, &self.url_for(path), &self.authorization, None)
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(PluginError::ApiCall {
                path: path.to_string(),
                failure: BrokerFailure::from_body(response.status, &response.body),
            });
        }
        response.json()
    }
}
