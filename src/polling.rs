//! Polling for asynchronous operations.
//!
//! When the API accepts work with `202 Accepted`, the resource named by the
//! `Location` header eventually reaches a terminal status. [`Client::poll`]
//! re-fetches it until the status is in the completion set (the resource is
//! returned) or the failure set (an [`ErrorKind::InvoiceProcessing`] error),
//! or until the attempt ceiling or the wall-clock timeout runs out (an
//! [`ErrorKind::PollingTimeout`] error).
//!
//! Each fetch goes through the client's retry loop.

use crate::{Client, Error, ErrorKind, Outcome, Result};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

/// Limits for one polling call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Maximum number of fetches.
    pub max_attempts: u32,
    /// Pause between fetches. There is no pause before the first one.
    pub interval: Duration,
    /// Wall-clock budget measured from the start of the call.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Where a fetched resource stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// The operation finished successfully.
    Completed,
    /// The operation finished and will not succeed.
    Failed,
    /// Anything else.
    InProgress,
}

/// Partitions a resource's status values into completed, failed and in
/// progress.
///
/// Values are compared case-insensitively. A resource without the status
/// field, or whose value is not a string, is in progress.
///
/// # Examples
///
/// ```
/// use nfeio_http::polling::{PollStatus, StatusClassifier};
/// use serde_json::json;
///
/// let classifier = StatusClassifier::service_invoice();
/// assert_eq!(classifier.classify(&json!({"status": "Issued"})), PollStatus::Completed);
/// assert_eq!(classifier.classify(&json!({"status": "IssueFailed"})), PollStatus::Failed);
/// assert_eq!(classifier.classify(&json!({"status": "WaitingSend"})), PollStatus::InProgress);
/// ```
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    field: String,
    completed: Vec<String>,
    failed: Vec<String>,
}

impl StatusClassifier {
    /// Creates a classifier reading `field`.
    pub fn new<S: AsRef<str>>(
        field: impl Into<String>,
        completed: impl IntoIterator<Item = S>,
        failed: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            field: field.into(),
            completed: lowercase_all(completed),
            failed: lowercase_all(failed),
        }
    }

    /// Status sets for any resource created through `202 Accepted`.
    pub fn generic() -> Self {
        Self::new(
            "status",
            ["completed", "issued"],
            ["failed", "cancelled", "error"],
        )
    }

    /// Status sets for service invoices.
    pub fn service_invoice() -> Self {
        Self::new(
            "status",
            ["issued"],
            ["issuefailed", "failed", "cancelled", "error"],
        )
    }

    /// Classifies a fetched resource.
    pub fn classify(&self, resource: &Value) -> PollStatus {
        let Some(status) = self.status_of(resource) else {
            return PollStatus::InProgress;
        };
        let status = status.to_ascii_lowercase();
        if self.completed.contains(&status) {
            PollStatus::Completed
        } else if self.failed.contains(&status) {
            PollStatus::Failed
        } else {
            PollStatus::InProgress
        }
    }

    fn status_of<'a>(&self, resource: &'a Value) -> Option<&'a str> {
        resource.get(&self.field)?.as_str()
    }
}

fn lowercase_all<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.as_ref().to_ascii_lowercase())
        .collect()
}

/// Reduces a `Location` header to a path plus query.
///
/// Absolute URLs lose their scheme and host; relative references are
/// returned verbatim.
///
/// # Examples
///
/// ```
/// use nfeio_http::polling::location_path;
///
/// assert_eq!(
///     location_path("https://api.nfe.io/v1/companies/c1/serviceinvoices/i1?x=1"),
///     "/v1/companies/c1/serviceinvoices/i1?x=1"
/// );
/// assert_eq!(location_path("/operations/o1"), "/operations/o1");
/// ```
pub fn location_path(location: &str) -> String {
    match Url::parse(location) {
        Ok(url) if url.has_host() => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        _ => location.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Exhaustion {
    Attempts,
    Deadline,
}

impl Client {
    /// Polls `location` until the resource reaches a terminal status.
    ///
    /// The wall-clock deadline is checked at the top of every iteration,
    /// before sleeping, so an expired deadline is reported without waiting out
    /// another interval. A failed fetch is retried on the next iteration,
    /// unless it was the last allowed attempt; it is then reported as a
    /// [`ErrorKind::PollingTimeout`] error with the fetch error as its source.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvoiceProcessing`] when the status is in the failure
    ///   set; `details` holds the resource.
    /// - [`ErrorKind::PollingTimeout`] when attempts or time run out; `details`
    ///   holds the last resource seen, or `null`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use nfeio_http::{Client, Outcome};
    /// use nfeio_http::polling::{PollOptions, StatusClassifier};
    /// use serde_json::json;
    ///
    /// # async fn example() -> Result<(), nfeio_http::Error> {
    /// let client = Client::new("my-api-key")?;
    ///
    /// let created = client.post("/companies/c1/serviceinvoices", json!({})).await?;
    /// if let Outcome::Accepted(operation) = created {
    ///     let classifier = StatusClassifier::service_invoice();
    ///     let invoice = client
    ///         .poll(&operation.location, &classifier, &PollOptions::default())
    ///         .await?;
    ///     println!("issued: {}", invoice["id"]);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn poll(
        &self,
        location: &str,
        classifier: &StatusClassifier,
        options: &PollOptions,
    ) -> Result<Value> {
        let location_path = location_path(location);
        let started_at = Instant::now();
        let mut last_seen: Option<Value> = None;
        let mut attempt: u32 = 0;

        let exhaustion = loop {
            if started_at.elapsed() >= options.timeout {
                break Exhaustion::Deadline;
            }
            if attempt >= options.max_attempts {
                break Exhaustion::Attempts;
            }
            if attempt > 0 {
                tokio::time::sleep(options.interval).await;
            }
            attempt += 1;

            tracing::debug!(path = %location_path, attempt = attempt, "Polling operation");

            match self.get(location_path.clone()).await {
                Ok(Outcome::Complete(response)) => {
                    let resource = response.body.to_value();
                    match classifier.classify(&resource) {
                        PollStatus::Completed => {
                            tracing::info!(
                                path = %location_path,
                                attempts = attempt,
                                elapsed_ms = started_at.elapsed().as_millis(),
                                "Operation completed"
                            );
                            return Ok(resource);
                        }
                        PollStatus::Failed => {
                            let status = classifier.status_of(&resource).unwrap_or_default();
                            tracing::warn!(
                                path = %location_path,
                                status = %status,
                                "Operation failed"
                            );
                            return Err(Error::new(
                                ErrorKind::InvoiceProcessing,
                                format!("Operation at {location_path} failed with status {status}"),
                            )
                            .with_details(resource));
                        }
                        PollStatus::InProgress => last_seen = Some(resource),
                    }
                }
                Ok(Outcome::Accepted(_)) => {
                    tracing::debug!(
                        path = %location_path,
                        "Operation still accepted, not yet available"
                    );
                }
                Err(e) if attempt >= options.max_attempts => {
                    return Err(Error::new(
                        ErrorKind::PollingTimeout,
                        format!("Polling {location_path} failed on final attempt {attempt}: {e}"),
                    )
                    .with_details(last_seen.unwrap_or(Value::Null))
                    .with_source(e));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %location_path,
                        attempt = attempt,
                        "Poll fetch failed, will try again"
                    );
                }
            }
        };

        let elapsed = started_at.elapsed();
        let message = match exhaustion {
            Exhaustion::Attempts => format!(
                "Operation at {location_path} did not complete after {attempt} attempts"
            ),
            Exhaustion::Deadline => format!(
                "Operation at {location_path} did not complete within {}ms ({attempt} attempts)",
                options.timeout.as_millis()
            ),
        };
        tracing::warn!(
            path = %location_path,
            attempts = attempt,
            elapsed_ms = elapsed.as_millis(),
            "Polling gave up"
        );

        Err(Error::new(ErrorKind::PollingTimeout, message)
            .with_details(last_seen.unwrap_or(Value::Null)))
    }

    /// POSTs `body` to `path` and returns the finished resource.
    ///
    /// A `202 Accepted` answer is polled with `classifier`. An immediate 2xx
    /// answer is classified once: a status in the failure set is an error, any
    /// other body is returned as-is.
    ///
    /// # Errors
    ///
    /// Everything [`Client::poll`] returns, plus
    /// [`ErrorKind::InvoiceProcessing`] for an immediate failed resource.
    pub async fn create_and_wait(
        &self,
        path: &str,
        body: Value,
        classifier: &StatusClassifier,
        options: &PollOptions,
    ) -> Result<Value> {
        match self.post(path, body).await? {
            Outcome::Accepted(operation) => {
                tracing::info!(
                    location = %operation.location,
                    "Request accepted, polling for result"
                );
                self.poll(&operation.location, classifier, options).await
            }
            Outcome::Complete(response) => {
                let resource = response.body.to_value();
                if classifier.classify(&resource) == PollStatus::Failed {
                    let status = classifier.status_of(&resource).unwrap_or_default();
                    tracing::warn!(path = %path, status = %status, "Resource failed when created");
                    return Err(Error::new(
                        ErrorKind::InvoiceProcessing,
                        format!("Resource created at {path} failed with status {status}"),
                    )
                    .with_status(response.status)
                    .with_details(resource));
                }
                Ok(resource)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generic_classifier() {
        let classifier = StatusClassifier::generic();
        assert_eq!(classifier.classify(&json!({"status": "completed"})), PollStatus::Completed);
        assert_eq!(classifier.classify(&json!({"status": "ISSUED"})), PollStatus::Completed);
        assert_eq!(classifier.classify(&json!({"status": "cancelled"})), PollStatus::Failed);
        assert_eq!(classifier.classify(&json!({"status": "error"})), PollStatus::Failed);
        assert_eq!(classifier.classify(&json!({"status": "pending"})), PollStatus::InProgress);
    }

    #[test]
    fn test_missing_status_is_in_progress() {
        let classifier = StatusClassifier::generic();
        assert_eq!(
            classifier.classify(&json!({"id": "i1", "number": 42})),
            PollStatus::InProgress
        );
        assert_eq!(classifier.classify(&json!({"status": 3})), PollStatus::InProgress);
        assert_eq!(classifier.classify(&Value::Null), PollStatus::InProgress);
        assert_eq!(classifier.classify(&json!("issued")), PollStatus::InProgress);
    }

    #[test]
    fn test_custom_field() {
        let classifier = StatusClassifier::new("flowStatus", ["Issued"], ["IssueFailed"]);
        assert_eq!(
            classifier.classify(&json!({"flowStatus": "issued", "status": "x"})),
            PollStatus::Completed
        );
        assert_eq!(
            classifier.classify(&json!({"status": "issued"})),
            PollStatus::InProgress
        );
    }

    #[test]
    fn test_location_path() {
        assert_eq!(
            location_path("http://localhost:1234/companies/c1/serviceinvoices/i1"),
            "/companies/c1/serviceinvoices/i1"
        );
        assert_eq!(
            location_path("https://api.nfe.io/v1/companies/c1?expand=true"),
            "/v1/companies/c1?expand=true"
        );
        assert_eq!(location_path("companies/c1"), "companies/c1");
        assert_eq!(location_path("/companies/c1?a=b"), "/companies/c1?a=b");
    }
}
