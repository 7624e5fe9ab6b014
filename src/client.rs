//! HTTP client with retry logic and typed error classification.
//!
//! The [`Client`] type is the main entry point for making requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    config::ClientConfig,
    metadata::{RequestBody, RequestMetadata},
    response::{decode_body, AsyncOperation, Outcome, Response},
    retry::{RetryOnRetryable, RetryPolicy, RetryPredicate},
    Error, ErrorKind, Result,
};
use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// An HTTP client for the NFE.io API.
///
/// Every request is authenticated with the configured API key, bounded by the
/// configured timeout and retried according to the retry policy. The client is
/// cheap to clone and meant to be shared.
///
/// # Examples
///
/// ```no_run
/// use nfeio_http::{Client, Outcome, RetryPolicy};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), nfeio_http::Error> {
/// let client = Client::builder()
///     .api_key("my-api-key")
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy {
///         max_retries: 3,
///         base_delay: Duration::from_millis(500),
///         max_delay: Duration::from_secs(10),
///         backoff_multiplier: 2.0,
///     })
///     .build()?;
///
/// match client.post("/companies/c1/serviceinvoices", json!({"servicesAmount": 10.0})).await? {
///     Outcome::Complete(response) => println!("created: {:?}", response.body),
///     Outcome::Accepted(operation) => println!("poll {}", operation.location),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    config: RwLock<Arc<ClientConfig>>,
    retry_predicate: Box<dyn RetryPredicate>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client with default settings for the given API key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder().api_key(api_key).build()
    }

    /// Creates a client from `NFE_API_KEY` and friends.
    ///
    /// See [`ClientConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the environment is incomplete.
    pub fn from_env() -> Result<Self> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }

    /// Returns the current configuration snapshot.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.inner.config.read().clone()
    }

    /// Replaces the configuration.
    ///
    /// Requests already in flight finish with the snapshot they started with;
    /// later requests see the new value. The configuration is never partially
    /// updated.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, and keeps the old configuration, if the
    /// new one is invalid.
    pub fn set_config(&self, config: ClientConfig) -> Result<()> {
        config.validate()?;
        tracing::info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout.as_millis(),
            max_retries = config.retry.max_retries,
            "Client configuration replaced"
        );
        *self.inner.config.write() = Arc::new(config);
        Ok(())
    }

    /// Makes a request, retrying transient failures.
    ///
    /// Attempts run strictly one after another, at most
    /// `max_retries + 1` times. A failure stops the loop when the ceiling is
    /// reached or the retry predicate rejects it, and is then returned
    /// unchanged.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use nfeio_http::{Client, metadata::RequestMetadata};
    /// use http::Method;
    ///
    /// # async fn example() -> Result<(), nfeio_http::Error> {
    /// let client = Client::new("my-api-key")?;
    ///
    /// let metadata = RequestMetadata::new(Method::GET, "/companies")
    ///     .with_query_param("pageCount", "10")
    ///     .with_query_param("pageIndex", "1");
    ///
    /// let response = client.call(metadata).await?.into_response()?;
    /// println!("{:?}", response.body);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call(&self, metadata: RequestMetadata) -> Result<Outcome> {
        let config = self.config();
        let max_retries = config.retry.max_retries;
        let start_time = Instant::now();
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match self
                .execute_request(&config, &metadata, attempt + 1, start_time)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        kind = %e.kind(),
                        attempt = attempt + 1,
                        method = %metadata.method,
                        path = %metadata.path,
                        "Request failed"
                    );

                    if attempt >= max_retries
                        || !self.inner.retry_predicate.should_retry(&e, attempt)
                    {
                        return Err(e);
                    }

                    let delay = config.retry.delay_for_attempt(attempt);
                    tracing::info!(
                        delay_ms = delay.as_millis(),
                        attempt = attempt + 1,
                        "Retrying request after delay"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::connection("Request failed after all retry attempts")))
    }

    /// Executes a single request attempt.
    async fn execute_request(
        &self,
        config: &ClientConfig,
        metadata: &RequestMetadata,
        attempt: u32,
        start_time: Instant,
    ) -> Result<Outcome> {
        let url = build_url(&config.base_url, metadata);

        tracing::debug!(
            method = %metadata.method,
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let (accept_name, accept_value) = metadata.accept_header();
        let mut request = self
            .inner
            .http_client
            .request(metadata.method.clone(), url)
            .basic_auth(&config.api_key, Some(""))
            .header(header::USER_AGENT, config.user_agent.as_str())
            .header(accept_name, accept_value)
            .timeout(config.timeout);

        // Multipart sets its own content type with the boundary.
        match &metadata.body {
            Some(RequestBody::Json(value)) => request = request.json(value),
            Some(RequestBody::Multipart(form)) => request = request.multipart(form.to_form()?),
            None => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, config.timeout))?;

        self.parse_response(response, start_time.elapsed(), attempt, config.timeout)
            .await
    }

    /// Turns a raw response into an [`Outcome`] or a classified error.
    async fn parse_response(
        &self,
        response: reqwest::Response,
        latency: Duration,
        attempt: u32,
        timeout: Duration,
    ) -> Result<Outcome> {
        let status = response.status();
        let headers = response.headers().clone();

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            attempt = attempt,
            "Received HTTP response"
        );

        if status == StatusCode::ACCEPTED {
            if let Some(location) = location_header(&headers) {
                return Ok(Outcome::Accepted(AsyncOperation {
                    location,
                    attempts: attempt,
                }));
            }

            let body = error_body(response).await;
            tracing::error!(response = %body, "202 Accepted without a Location header");
            return Err(Error::new(
                ErrorKind::Generic,
                "Received 202 Accepted without a Location header",
            )
            .with_status(status)
            .with_details(body));
        }

        if !status.is_success() {
            let body = error_body(response).await;

            if status.is_client_error() {
                tracing::error!(
                    status = status.as_u16(),
                    response = %body,
                    "Client error (4xx)"
                );
            } else if status.is_server_error() {
                tracing::warn!(
                    status = status.as_u16(),
                    response = %body,
                    "Server error (5xx)"
                );
            }

            return Err(Error::from_response(status, body));
        }

        let content_type = content_type(&headers);
        let raw_body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        match decode_body(content_type.as_deref(), raw_body.clone()) {
            Ok(body) => Ok(Outcome::Complete(Response::new(
                body, status, headers, latency, attempt,
            ))),
            Err(e) => {
                let raw_response = String::from_utf8_lossy(&raw_body).into_owned();
                tracing::error!(
                    error = %e,
                    raw_response = %raw_response,
                    "Failed to decode response body"
                );

                Err(Error::new(
                    ErrorKind::Generic,
                    format!("Failed to decode response (status {status}): {e}"),
                )
                .with_status(status)
                .with_details(Value::String(raw_response))
                .with_source(e))
            }
        }
    }

    /// Makes a GET request to the specified path.
    pub async fn get(&self, path: impl Into<String>) -> Result<Outcome> {
        self.call(RequestMetadata::new(Method::GET, path)).await
    }

    /// Makes a POST request with a JSON or multipart body.
    pub async fn post(
        &self,
        path: impl Into<String>,
        body: impl Into<RequestBody>,
    ) -> Result<Outcome> {
        let metadata = RequestMetadata::new(Method::POST, path).with_body(body.into());
        self.call(metadata).await
    }

    /// Makes a PUT request with a JSON or multipart body.
    pub async fn put(
        &self,
        path: impl Into<String>,
        body: impl Into<RequestBody>,
    ) -> Result<Outcome> {
        let metadata = RequestMetadata::new(Method::PUT, path).with_body(body.into());
        self.call(metadata).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete(&self, path: impl Into<String>) -> Result<Outcome> {
        self.call(RequestMetadata::new(Method::DELETE, path)).await
    }

    /// Downloads a binary document, e.g. with `accept` set to
    /// `application/pdf` or `application/xml`.
    ///
    /// # Errors
    ///
    /// Besides request failures, returns a [`ErrorKind::Generic`] error when
    /// the server answers with JSON instead of a document.
    pub async fn download(&self, path: impl Into<String>, accept: &str) -> Result<Bytes> {
        let metadata = RequestMetadata::new(Method::GET, path).with_accept(accept)?;
        let response = self.call(metadata).await?.into_response()?;
        let status = response.status;
        response.bytes().ok_or_else(|| {
            Error::new(ErrorKind::Generic, format!("Expected a {accept} document"))
                .with_status(status)
                .with_details(response.body.to_value())
        })
    }
}

/// Classifies a reqwest failure, naming the configured deadline on timeouts.
fn transport_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::timeout(timeout).with_source(err)
    } else {
        Error::from_transport(err)
    }
}

/// Joins the base URL with a request path and its query parameters.
///
/// Paths that already start with the base URL's path prefix are not prefixed
/// again, so server-provided locations such as `/v1/companies/...` resolve
/// against `https://api.nfe.io/v1` correctly.
fn build_url(base_url: &Url, metadata: &RequestMetadata) -> Url {
    let base_path = base_url.path().trim_end_matches('/');
    let path = if metadata.path.starts_with('/') {
        metadata.path.clone()
    } else {
        format!("/{}", metadata.path)
    };
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (path.clone(), None),
    };

    let already_prefixed =
        !base_path.is_empty() && (path == base_path || path.starts_with(&format!("{base_path}/")));
    let full_path = if already_prefixed {
        path
    } else {
        format!("{base_path}{path}")
    };

    let mut url = base_url.clone();
    url.set_path(&full_path);
    url.set_query(query.as_deref());

    if !metadata.query_params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &metadata.query_params {
            pairs.append_pair(key, value);
        }
    }

    url
}

fn location_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .map(str::to_owned)
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Reads an error body as JSON when possible, otherwise as a string.
async fn error_body(response: reqwest::Response) -> Value {
    let is_json = content_type(response.headers())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
    let raw = response.text().await.unwrap_or_default();

    if raw.trim().is_empty() {
        return Value::Null;
    }
    if is_json {
        if let Ok(value) = serde_json::from_str(&raw) {
            return value;
        }
    }
    Value::String(raw)
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use nfeio_http::{ClientBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), nfeio_http::Error> {
/// let client = ClientBuilder::new()
///     .api_key("my-api-key")
///     .base_url("https://api.nfe.io/v1")?
///     .timeout(Duration::from_secs(10))
///     .retry_policy(RetryPolicy::none())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    api_key: Option<String>,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            config: None,
            api_key: None,
            base_url: None,
            timeout: None,
            retry_policy: None,
            retry_predicate: None,
            user_agent: None,
        }
    }

    /// Starts from a complete configuration. Individual setters still apply
    /// on top of it.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets a custom retry predicate.
    ///
    /// By default, requests are retried based on [`Error::is_retryable`].
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Overrides the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no API key was provided or the
    /// resulting configuration is invalid. No request is made.
    pub fn build(self) -> Result<Client> {
        let mut config = match (self.config, self.api_key) {
            (Some(mut config), api_key) => {
                if let Some(api_key) = api_key {
                    config.api_key = api_key;
                }
                config
            }
            (None, Some(api_key)) => ClientConfig::new(api_key)?,
            (None, None) => return Err(Error::configuration("API key is required")),
        };
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retry) = self.retry_policy {
            config.retry = retry;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        config.validate()?;

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::configuration(format!("Failed to build HTTP client: {}", e)).with_source(e)
        })?;

        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(RetryOnRetryable));

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                config: RwLock::new(Arc::new(config)),
                retry_predicate,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(base: &str, metadata: RequestMetadata) -> String {
        build_url(&Url::parse(base).unwrap(), &metadata).to_string()
    }

    #[test]
    fn test_build_url_prefixes_base_path() {
        assert_eq!(
            url("https://api.nfe.io/v1", RequestMetadata::new(Method::GET, "/companies")),
            "https://api.nfe.io/v1/companies"
        );
        assert_eq!(
            url("https://api.nfe.io/v1/", RequestMetadata::new(Method::GET, "companies")),
            "https://api.nfe.io/v1/companies"
        );
        assert_eq!(
            url("http://127.0.0.1:8080", RequestMetadata::new(Method::GET, "/companies")),
            "http://127.0.0.1:8080/companies"
        );
    }

    #[test]
    fn test_build_url_keeps_prefixed_location() {
        assert_eq!(
            url(
                "https://api.nfe.io/v1",
                RequestMetadata::new(Method::GET, "/v1/companies/c1/serviceinvoices/i1")
            ),
            "https://api.nfe.io/v1/companies/c1/serviceinvoices/i1"
        );
        assert_eq!(
            url("https://api.nfe.io/v1", RequestMetadata::new(Method::GET, "/v10/things")),
            "https://api.nfe.io/v1/v10/things"
        );
    }

    #[test]
    fn test_build_url_query() {
        let metadata = RequestMetadata::new(Method::GET, "/companies?status=active")
            .with_query_param("pageCount", "10")
            .with_query_param("pageIndex", "2");
        assert_eq!(
            url("https://api.nfe.io/v1", metadata),
            "https://api.nfe.io/v1/companies?status=active&pageCount=10&pageIndex=2"
        );
    }

    #[test]
    fn test_builder_requires_api_key() {
        let err = Client::builder().build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_rejects_invalid_base_url() {
        let err = Client::builder().base_url("::not a url::").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_applies_overrides() {
        let client = Client::builder()
            .api_key("key")
            .base_url("http://localhost:9999/api")
            .unwrap()
            .timeout(Duration::from_millis(1500))
            .retry_policy(RetryPolicy::none())
            .user_agent("tests/1.0")
            .build()
            .unwrap();

        let config = client.config();
        assert_eq!(config.base_url.as_str(), "http://localhost:9999/api");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.user_agent, "tests/1.0");
    }

    #[test]
    fn test_set_config_swaps_whole_value() {
        let client = Client::new("old-key").unwrap();
        let before = client.config();

        let mut next = (*before).clone();
        next.api_key = "new-key".to_string();
        next.timeout = Duration::from_secs(5);
        client.set_config(next).unwrap();

        let after = client.config();
        assert_eq!(after.api_key, "new-key");
        assert_eq!(after.timeout, Duration::from_secs(5));
        // The earlier snapshot is untouched.
        assert_eq!(before.api_key, "old-key");
        assert_eq!(before.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_set_config_rejects_invalid() {
        let client = Client::new("key").unwrap();
        let mut next = (*client.config()).clone();
        next.api_key = String::new();

        let err = client.set_config(next).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(client.config().api_key, "key");
    }
}
