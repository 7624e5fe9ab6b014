//! Bounded fan-out for submitting many creation requests.
//!
//! Items are split into consecutive chunks of `max_concurrent`. The requests
//! of one chunk run concurrently, and the next chunk starts only once every
//! request of the current one has settled. Results always come back in input
//! order.

use crate::polling::{PollOptions, StatusClassifier};
use crate::{Client, Error, Outcome, Result};
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;

/// Controls a batch submission.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Upper bound on requests in flight at once. Must be at least 1.
    pub max_concurrent: usize,
    /// Poll each accepted item until it reaches a terminal status.
    pub wait_for_completion: bool,
    /// Record failures inline instead of aborting the batch.
    pub continue_on_error: bool,
    /// Limits used when `wait_for_completion` is set.
    pub poll: PollOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            wait_for_completion: false,
            continue_on_error: true,
            poll: PollOptions::default(),
        }
    }
}

/// The result for one batch item.
#[derive(Debug)]
pub enum BatchItem {
    /// The created resource, or the pending handle when not waiting.
    Succeeded(Value),
    /// The item failed; `data` is the input that was submitted.
    Failed {
        /// Why the item failed.
        error: Error,
        /// The submitted payload.
        data: Value,
    },
}

impl BatchItem {
    /// Returns `true` for [`BatchItem::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, BatchItem::Succeeded(_))
    }

    /// Returns the created resource, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            BatchItem::Succeeded(value) => Some(value),
            BatchItem::Failed { .. } => None,
        }
    }

    /// Returns the error, if any.
    pub fn error(&self) -> Option<&Error> {
        match self {
            BatchItem::Succeeded(_) => None,
            BatchItem::Failed { error, .. } => Some(error),
        }
    }
}

/// Runs `submit` over `items` in chunks of `options.max_concurrent`.
///
/// # Errors
///
/// Returns a configuration error when `max_concurrent` is zero. Without
/// `continue_on_error`, returns the first failure (in input order) of the
/// first chunk that has one, after that chunk has settled; later chunks are
/// never started.
pub async fn submit_in_chunks<F, Fut>(
    items: Vec<Value>,
    options: &BatchOptions,
    submit: F,
) -> Result<Vec<BatchItem>>
where
    F: Fn(Value) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    if options.max_concurrent == 0 {
        return Err(Error::configuration("max_concurrent must be at least 1"));
    }

    let mut results = Vec::with_capacity(items.len());

    for (index, chunk) in items.chunks(options.max_concurrent).enumerate() {
        tracing::debug!(chunk = index, size = chunk.len(), "Submitting batch chunk");

        let settled = join_all(chunk.iter().cloned().map(&submit)).await;

        for (data, outcome) in chunk.iter().zip(settled) {
            match outcome {
                Ok(value) => results.push(BatchItem::Succeeded(value)),
                Err(error) if options.continue_on_error => {
                    tracing::warn!(error = %error, kind = %error.kind(), "Batch item failed");
                    results.push(BatchItem::Failed {
                        error,
                        data: data.clone(),
                    });
                }
                Err(error) => {
                    tracing::warn!(error = %error, chunk = index, "Aborting batch");
                    return Err(error);
                }
            }
        }
    }

    Ok(results)
}

impl Client {
    /// POSTs every item to `path`, at most `options.max_concurrent` at a time.
    ///
    /// With `wait_for_completion`, each item goes through
    /// [`Client::create_and_wait`] with `classifier`, so both polled and
    /// immediate failures are errors. Otherwise an accepted item yields its
    /// pending handle (`{"code": 202, "status": "pending", "location": ...}`).
    ///
    /// # Errors
    ///
    /// See [`submit_in_chunks`].
    pub async fn create_batch(
        &self,
        path: &str,
        items: Vec<Value>,
        classifier: &StatusClassifier,
        options: &BatchOptions,
    ) -> Result<Vec<BatchItem>> {
        submit_in_chunks(items, options, |item| {
            self.create_one(path, item, classifier, options)
        })
        .await
    }

    async fn create_one(
        &self,
        path: &str,
        item: Value,
        classifier: &StatusClassifier,
        options: &BatchOptions,
    ) -> Result<Value> {
        if options.wait_for_completion {
            return self
                .create_and_wait(path, item, classifier, &options.poll)
                .await;
        }
        match self.post(path, item).await? {
            Outcome::Complete(response) => Ok(response.body.to_value()),
            Outcome::Accepted(operation) => Ok(operation.to_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn options(max_concurrent: usize, continue_on_error: bool) -> BatchOptions {
        BatchOptions {
            max_concurrent,
            continue_on_error,
            ..BatchOptions::default()
        }
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let items = vec![json!(30), json!(10), json!(20)];

        // Earlier items finish last.
        let results = submit_in_chunks(items, &options(2, true), |item| async move {
            let ms = item.as_u64().unwrap();
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({"done": ms}))
        })
        .await
        .unwrap();

        let values: Vec<_> = results.iter().map(|r| r.value().cloned().unwrap()).collect();
        assert_eq!(
            values,
            vec![json!({"done": 30}), json!({"done": 10}), json!({"done": 20})]
        );
    }

    #[tokio::test]
    async fn test_in_flight_bounded_by_chunk() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<Value> = (0..7).map(|i| json!(i)).collect();

        let results = submit_in_chunks(items, &options(3, true), |item| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(item)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 7);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_continue_on_error_keeps_placeholders() {
        let items = vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})];

        let results = submit_in_chunks(items, &options(2, true), |item| async move {
            if item["n"] == 2 {
                Err(Error::new(ErrorKind::Validation, "bad item"))
            } else {
                Ok(item)
            }
        })
        .await
        .unwrap();

        assert!(results[0].is_success());
        assert!(results[2].is_success());
        match &results[1] {
            BatchItem::Failed { error, data } => {
                assert_eq!(error.kind(), ErrorKind::Validation);
                assert_eq!(data, &json!({"n": 2}));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abort_stops_later_chunks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items: Vec<Value> = (0..6).map(|i| json!(i)).collect();

        let result = submit_in_chunks(items, &options(2, false), |item| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if item == json!(1) {
                    Err(Error::new(ErrorKind::Server, "boom"))
                } else {
                    Ok(item)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Server);
        // Only the first chunk ran, and it ran to completion.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let result =
            submit_in_chunks(vec![json!(1)], &options(0, true), |item| async move { Ok(item) })
                .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Configuration);
    }
}
