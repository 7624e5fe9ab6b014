//! Response envelopes returned by the client.
//!
//! A request resolves to an [`Outcome`]: either a decoded [`Response`], or an
//! [`AsyncOperation`] handle when the server accepted the work with `202` and
//! a `Location` to poll.

use crate::{Error, ErrorKind, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// A decoded response body.
///
/// The variant is chosen from the response `Content-Type`: JSON is parsed,
/// PDF and XML are kept as raw bytes, and everything else is text.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// An `application/json` body.
    Json(Value),
    /// An `application/pdf` or `application/xml` body.
    Binary(Bytes),
    /// Any other body.
    Text(String),
}

impl ResponseBody {
    /// Returns the body as a JSON value. Text bodies become JSON strings and
    /// binary bodies are lossily decoded as UTF-8.
    pub fn to_value(&self) -> Value {
        match self {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Text(text) => Value::String(text.clone()),
            ResponseBody::Binary(bytes) => {
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// A successful HTTP response.
///
/// # Examples
///
/// ```no_run
/// use nfeio_http::{Client, Outcome};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Company {
///     id: String,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), nfeio_http::Error> {
/// let client = Client::builder().api_key("my-key").build()?;
///
/// if let Outcome::Complete(response) = client.get("/companies/c1").await? {
///     let company: Company = response.json()?;
///     println!("{} took {:?}", company.name, response.latency);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The decoded body.
    pub body: ResponseBody,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers. Lookups are case-insensitive.
    pub headers: HeaderMap,

    /// The total latency of the request, including all retry attempts.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    pub attempts: u32,
}

impl Response {
    /// Creates a new `Response`.
    pub fn new(
        body: ResponseBody,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Deserializes a JSON body into `T`.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::Generic`] error if the body is not JSON or does
    /// not match `T`. The body is attached as `details`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Json(value) => T::deserialize(value).map_err(|e| {
                tracing::error!(
                    error = %e,
                    status = self.status.as_u16(),
                    "Failed to deserialize response"
                );
                Error::new(ErrorKind::Generic, format!("Failed to deserialize response: {e}"))
                    .with_status(self.status)
                    .with_details(value.clone())
                    .with_source(e)
            }),
            other => Err(Error::new(ErrorKind::Generic, "Response body is not JSON")
                .with_status(self.status)
                .with_details(other.to_value())),
        }
    }

    /// Returns the body bytes for binary downloads, or the UTF-8 bytes of a
    /// text body. JSON bodies return `None`.
    pub fn bytes(&self) -> Option<Bytes> {
        match &self.body {
            ResponseBody::Binary(bytes) => Some(bytes.clone()),
            ResponseBody::Text(text) => Some(Bytes::from(text.clone())),
            ResponseBody::Json(_) => None,
        }
    }

    /// Returns the body if it was decoded as text.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use nfeio_http::response::{Response, ResponseBody};
    /// # use http::{HeaderMap, HeaderValue, StatusCode};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = Response::new(
    ///     ResponseBody::Text(String::new()),
    ///     StatusCode::OK,
    ///     headers,
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// assert_eq!(response.header("Content-Type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A handle to work the server accepted but has not finished.
///
/// Produced only for `202 Accepted` responses carrying a non-empty `Location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncOperation {
    /// The `Location` header value, as sent by the server.
    pub location: String,

    /// The number of attempts made before the server accepted the request.
    pub attempts: u32,
}

impl AsyncOperation {
    /// Always `202`.
    pub fn code(&self) -> StatusCode {
        StatusCode::ACCEPTED
    }

    /// Always `"pending"`.
    pub fn status(&self) -> &'static str {
        "pending"
    }

    /// The handle as `{"code": 202, "status": "pending", "location": ...}`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "code": self.code().as_u16(),
            "status": self.status(),
            "location": self.location,
        })
    }
}

/// The result of a successful request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The server returned the resource.
    Complete(Response),
    /// The server accepted the request; poll the location for the result.
    Accepted(AsyncOperation),
}

impl Outcome {
    /// Returns the response, or a [`ErrorKind::Generic`] error if the server
    /// only accepted the request.
    ///
    /// # Errors
    ///
    /// Fails for [`Outcome::Accepted`].
    pub fn into_response(self) -> Result<Response> {
        match self {
            Outcome::Complete(response) => Ok(response),
            Outcome::Accepted(operation) => Err(Error::new(
                ErrorKind::Generic,
                format!("Expected a response, got 202 Accepted for {}", operation.location),
            )
            .with_status(StatusCode::ACCEPTED)),
        }
    }
}

/// Decodes a body according to its content type.
pub(crate) fn decode_body(
    content_type: Option<&str>,
    raw: Bytes,
) -> std::result::Result<ResponseBody, serde_json::Error> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("application/json") {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResponseBody::Json(Value::Null));
        }
        serde_json::from_slice(&raw).map(ResponseBody::Json)
    } else if content_type.contains("application/pdf") || content_type.contains("application/xml") {
        Ok(ResponseBody::Binary(raw))
    } else {
        Ok(ResponseBody::Text(String::from_utf8_lossy(&raw).into_owned()))
    }
}
