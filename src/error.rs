//! Error taxonomy for API calls.
//!
//! Every failure surfaced by this crate is an [`Error`] carrying an explicit
//! [`ErrorKind`]. HTTP responses and transport failures are classified by the
//! factory functions in this module, which are pure and deterministic: the same
//! status and body always produce the same kind and message.

use http::StatusCode;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The closed set of error categories.
///
/// Callers branch on this value instead of on concrete error types.
///
/// # Examples
///
/// ```
/// use nfeio_http::ErrorKind;
///
/// assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
/// assert_eq!(ErrorKind::from_status(418), ErrorKind::Validation);
/// assert_eq!(ErrorKind::from_status(302), ErrorKind::Generic);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The API key was rejected (HTTP 401).
    Authentication,
    /// The request was malformed or failed validation (400 and other 4xx).
    Validation,
    /// The resource does not exist (HTTP 404).
    NotFound,
    /// The request conflicts with the current resource state (HTTP 409).
    Conflict,
    /// Too many requests (HTTP 429).
    RateLimit,
    /// The server failed to handle the request (5xx).
    Server,
    /// The connection could not be established or was interrupted.
    Connection,
    /// No response arrived within the configured timeout.
    Timeout,
    /// The client was configured incorrectly. Raised before any I/O.
    Configuration,
    /// An asynchronous operation did not reach a terminal state in time.
    PollingTimeout,
    /// An asynchronous operation reached a failure state.
    InvoiceProcessing,
    /// Anything that fits no other category.
    Generic,
}

impl ErrorKind {
    /// Maps an HTTP status code to its error kind.
    ///
    /// Codes outside the 4xx and 5xx ranges map to [`ErrorKind::Generic`].
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimit,
            500 | 502 | 503 | 504 => ErrorKind::Server,
            400..=499 => ErrorKind::Validation,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Generic,
        }
    }

    /// A stable identifier for logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Server => "server",
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Configuration => "configuration",
            ErrorKind::PollingTimeout => "polling_timeout",
            ErrorKind::InvoiceProcessing => "invoice_processing",
            ErrorKind::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for API calls.
///
/// An error always exposes a [`kind`](Error::kind), a human-readable
/// [`message`](Error::message), the HTTP status when one was received, and the
/// raw response body as [`details`](Error::details). Underlying transport
/// errors are kept as the [`source`](std::error::Error::source).
///
/// # Examples
///
/// ```no_run
/// use nfeio_http::{Client, ErrorKind};
///
/// # async fn example() -> Result<(), nfeio_http::Error> {
/// let client = Client::builder().api_key("my-key").build()?;
///
/// match client.get("/companies/c1").await {
///     Ok(outcome) => println!("{:?}", outcome),
///     Err(e) if e.kind() == ErrorKind::NotFound => println!("no such company"),
///     Err(e) => {
///         eprintln!("{} ({}): {}", e.kind(), e.status().map_or(0, |s| s.as_u16()), e);
///         if let Some(details) = e.details() {
///             eprintln!("  details: {}", details);
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
    details: Option<Value>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: None,
            source: None,
        }
    }

    /// Classifies a non-success HTTP response.
    ///
    /// The body is kept verbatim as `details`; the message is taken from the
    /// first string among the `message`, `error`, `detail` and `details` fields,
    /// then from the body itself when it is a string, and finally falls back to
    /// `HTTP {status} error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use http::StatusCode;
    /// use nfeio_http::{Error, ErrorKind};
    /// use serde_json::json;
    ///
    /// let err = Error::from_response(StatusCode::BAD_REQUEST, json!({"message": "CNPJ invalid"}));
    /// assert_eq!(err.kind(), ErrorKind::Validation);
    /// assert_eq!(err.message(), "CNPJ invalid");
    /// ```
    pub fn from_response(status: StatusCode, body: Value) -> Self {
        let message = resolve_message(&body, status);
        Self {
            kind: ErrorKind::from_status(status.as_u16()),
            message,
            status: Some(status),
            details: Some(body),
            source: None,
        }
    }

    /// Classifies a transport-level failure from `reqwest`.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let (kind, message) = if err.is_timeout() {
            (ErrorKind::Timeout, "Request timed out".to_string())
        } else if err.is_connect() {
            (ErrorKind::Connection, format!("Failed to connect: {err}"))
        } else {
            (ErrorKind::Connection, format!("Request failed: {err}"))
        };
        Self::new(kind, message).with_source(err)
    }

    /// A timeout raised when the per-request deadline expires.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timed out after {}ms", after.as_millis()),
        )
    }

    /// A configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// A connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Attaches the HTTP status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a diagnostic payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status code if this error came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the raw diagnostic payload, usually the response body.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Rate limits are always retryable. Other 4xx responses are caller
    /// mistakes and are not, except 401, which is treated as a transient
    /// credential race. Server, connection, timeout and generic failures are
    /// retryable. Configuration and polling errors never are.
    ///
    /// # Examples
    ///
    /// ```
    /// use http::StatusCode;
    /// use nfeio_http::Error;
    /// use serde_json::Value;
    ///
    /// assert!(Error::from_response(StatusCode::SERVICE_UNAVAILABLE, Value::Null).is_retryable());
    /// assert!(Error::from_response(StatusCode::UNAUTHORIZED, Value::Null).is_retryable());
    /// assert!(!Error::from_response(StatusCode::NOT_FOUND, Value::Null).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::RateLimit => true,
            ErrorKind::Configuration | ErrorKind::PollingTimeout | ErrorKind::InvoiceProcessing => {
                false
            }
            _ => match self.status {
                Some(status) if status.is_client_error() => status == StatusCode::UNAUTHORIZED,
                _ => true,
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::from_transport(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::configuration(format!("Invalid URL: {err}")).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Generic, format!("JSON error: {err}")).with_source(err)
    }
}

/// Picks the most useful message out of an error body.
pub(crate) fn resolve_message(body: &Value, status: StatusCode) -> String {
    if let Value::Object(map) = body {
        for field in ["message", "error", "detail", "details"] {
            if let Some(Value::String(s)) = map.get(field) {
                return s.clone();
            }
        }
    }
    match body {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        _ => format!("HTTP {} error", status.as_u16()),
    }
}

/// A specialized `Result` type for API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn test_named_status_codes() {
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Authentication);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(409), ErrorKind::Conflict);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimit);
        for code in [500, 502, 503, 504] {
            assert_eq!(ErrorKind::from_status(code), ErrorKind::Server);
        }
    }

    #[test]
    fn test_status_ranges() {
        for code in [402, 403, 405, 408, 410, 422, 451, 499] {
            assert_eq!(ErrorKind::from_status(code), ErrorKind::Validation, "{code}");
        }
        for code in [501, 505, 507, 511, 599] {
            assert_eq!(ErrorKind::from_status(code), ErrorKind::Server, "{code}");
        }
        for code in [100, 200, 202, 204, 301, 304, 600, 0] {
            assert_eq!(ErrorKind::from_status(code), ErrorKind::Generic, "{code}");
        }
    }

    #[test]
    fn test_generic_keeps_original_status() {
        let err = Error::from_response(status(302), Value::Null);
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert_eq!(err.status(), Some(status(302)));
    }

    #[test]
    fn test_message_field_precedence() {
        let body = json!({"details": "d", "detail": "c", "error": "b", "message": "a"});
        assert_eq!(resolve_message(&body, status(400)), "a");

        let body = json!({"details": "d", "detail": "c", "error": "b"});
        assert_eq!(resolve_message(&body, status(400)), "b");

        let body = json!({"details": "d", "detail": "c"});
        assert_eq!(resolve_message(&body, status(400)), "c");

        let body = json!({"details": "d"});
        assert_eq!(resolve_message(&body, status(400)), "d");
    }

    #[test]
    fn test_non_string_fields_are_skipped() {
        let body = json!({"message": {"nested": true}, "error": "fallback"});
        assert_eq!(resolve_message(&body, status(422)), "fallback");

        let body = json!({"errors": [{"code": 1}]});
        assert_eq!(resolve_message(&body, status(422)), "HTTP 422 error");
    }

    #[test]
    fn test_string_body_used_as_message() {
        let body = Value::String("Service Unavailable".to_string());
        assert_eq!(resolve_message(&body, status(503)), "Service Unavailable");
    }

    #[test]
    fn test_fallback_message() {
        assert_eq!(resolve_message(&Value::Null, status(500)), "HTTP 500 error");
        assert_eq!(
            resolve_message(&Value::String(String::new()), status(502)),
            "HTTP 502 error"
        );
    }

    #[test]
    fn test_details_always_preserved() {
        let body = json!({"message": "CNPJ invalid", "field": "federalTaxNumber"});
        let err = Error::from_response(status(400), body.clone());
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "CNPJ invalid");
        assert_eq!(err.to_string(), "CNPJ invalid");
        assert_eq!(err.details(), Some(&body));
    }

    #[test]
    fn test_retryability() {
        let retryable = [401, 429, 500, 502, 503, 504, 599];
        for code in retryable {
            assert!(Error::from_response(status(code), Value::Null).is_retryable(), "{code}");
        }
        let fatal = [400, 403, 404, 409, 422];
        for code in fatal {
            assert!(!Error::from_response(status(code), Value::Null).is_retryable(), "{code}");
        }

        assert!(Error::timeout(Duration::from_secs(1)).is_retryable());
        assert!(Error::connection("reset").is_retryable());
        assert!(!Error::configuration("missing api key").is_retryable());
        assert!(!Error::new(ErrorKind::PollingTimeout, "late").is_retryable());
    }

    #[test]
    fn test_source_chain() {
        let inner = Error::connection("socket closed");
        let outer = Error::new(ErrorKind::PollingTimeout, "Polling failed").with_source(inner);
        let source = std::error::Error::source(&outer).unwrap();
        assert_eq!(source.to_string(), "socket closed");
    }

    #[test]
    fn test_url_parse_error_is_configuration() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());
    }
}
