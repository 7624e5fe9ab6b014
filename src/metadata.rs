//! Request descriptors and body payloads.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method};
use serde_json::Value;

/// Describes a single API request.
///
/// A descriptor holds the method, path, query parameters, optional body and
/// optional `Accept` override. The client never mutates it, so the same
/// descriptor is replayed unchanged on every retry attempt.
///
/// # Examples
///
/// ```
/// use nfeio_http::metadata::{RequestBody, RequestMetadata};
/// use http::Method;
/// use serde_json::json;
///
/// let metadata = RequestMetadata::new(Method::POST, "/companies/c1/serviceinvoices")
///     .with_body(RequestBody::Json(json!({"servicesAmount": 100.0})));
/// assert_eq!(metadata.path, "/companies/c1/serviceinvoices");
/// ```
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path, relative to the base URL. May carry a query string.
    pub path: String,

    /// Query parameters, appended in order.
    pub query_params: Vec<(String, String)>,

    /// The request body, if any.
    pub body: Option<RequestBody>,

    /// Overrides the default `Accept: application/json` header.
    pub accept: Option<HeaderValue>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query_params: Vec::new(),
            body: None,
            accept: None,
        }
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Adds multiple query parameters to the request.
    pub fn with_query_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Overrides the `Accept` header, e.g. for PDF or XML downloads.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value is not a valid header value.
    pub fn with_accept(mut self, accept: impl AsRef<str>) -> Result<Self, crate::Error> {
        let value = HeaderValue::try_from(accept.as_ref())
            .map_err(|e| crate::Error::configuration(format!("Invalid header value: {}", e)))?;
        self.accept = Some(value);
        Ok(self)
    }

    pub(crate) fn accept_header(&self) -> (HeaderName, HeaderValue) {
        let value = self
            .accept
            .clone()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        (http::header::ACCEPT, value)
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

/// A request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Sent as `application/json`.
    Json(Value),
    /// Sent as `multipart/form-data`; the boundary is chosen by the transport.
    Multipart(FormPayload),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<FormPayload> for RequestBody {
    fn from(form: FormPayload) -> Self {
        RequestBody::Multipart(form)
    }
}

/// A multipart form that can be rebuilt for every attempt.
///
/// `reqwest` consumes a form when sending it, so the parts are kept here and a
/// fresh form is produced for each retry.
///
/// # Examples
///
/// ```
/// use nfeio_http::metadata::FormPayload;
///
/// let form = FormPayload::new()
///     .file("file", "certificate.pfx", vec![0x30, 0x82], Some("application/x-pkcs12"))
///     .text("password", "secret");
/// assert_eq!(form.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormPayload {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone)]
enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content: Bytes,
        mime: Option<String>,
    },
}

impl FormPayload {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
        mime: Option<&str>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            content: content.into(),
            mime: mime.map(str::to_owned),
        });
        self
    }

    /// Returns the number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if the form has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn to_form(&self) -> crate::Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    file_name,
                    content,
                    mime,
                } => {
                    let mut file = reqwest::multipart::Part::bytes(content.to_vec())
                        .file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime).map_err(|e| {
                            crate::Error::configuration(format!("Invalid MIME type {mime}: {e}"))
                        })?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accept_is_json() {
        let metadata = RequestMetadata::new(Method::GET, "/companies");
        let (name, value) = metadata.accept_header();
        assert_eq!(name, http::header::ACCEPT);
        assert_eq!(value, "application/json");
    }

    #[test]
    fn test_accept_override() {
        let metadata = RequestMetadata::new(Method::GET, "/invoices/i1/pdf")
            .with_accept("application/pdf")
            .unwrap();
        assert_eq!(metadata.accept_header().1, "application/pdf");
    }

    #[test]
    fn test_invalid_accept_rejected() {
        let err = RequestMetadata::new(Method::GET, "/")
            .with_accept("bad\nvalue")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_query_params_keep_order() {
        let metadata = RequestMetadata::new(Method::GET, "/companies")
            .with_query_param("pageCount", "10")
            .with_query_params(vec![("pageIndex".to_string(), "2".to_string())]);
        assert_eq!(
            metadata.query_params,
            vec![
                ("pageCount".to_string(), "10".to_string()),
                ("pageIndex".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_rebuilds() {
        let form = FormPayload::new()
            .file("file", "cert.pfx", vec![1u8, 2, 3], Some("application/x-pkcs12"))
            .text("password", "pw");
        assert!(form.to_form().is_ok());
        assert!(form.to_form().is_ok());
    }

    #[test]
    fn test_form_invalid_mime() {
        let form = FormPayload::new().file("file", "cert.pfx", vec![1u8], Some("not a mime"));
        assert!(form.to_form().is_err());
    }
}
