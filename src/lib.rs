//! # nfeio-http - resilient transport for the NFE.io API
//!
//! A client for a REST API that issues electronic service invoices
//! asynchronously. Requests are authenticated, bounded by a timeout and
//! retried with exponential backoff; failures are classified into a closed set
//! of [`ErrorKind`]s; and work accepted with `202 Accepted` is followed to
//! completion by polling its `Location`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nfeio_http::{Client, RetryPolicy};
//! use nfeio_http::polling::PollOptions;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nfeio_http::Error> {
//!     let client = Client::builder()
//!         .api_key("my-api-key")
//!         .timeout(Duration::from_secs(30))
//!         .retry_policy(RetryPolicy {
//!             max_retries: 3,
//!             base_delay: Duration::from_millis(1000),
//!             max_delay: Duration::from_secs(30),
//!             backoff_multiplier: 2.0,
//!         })
//!         .build()?;
//!
//!     let invoice = client
//!         .service_invoices()
//!         .create_and_wait(
//!             "company-id",
//!             json!({"cityServiceCode": "2690", "servicesAmount": 100.0}),
//!             &PollOptions::default(),
//!         )
//!         .await?;
//!     println!("Issued invoice {}", invoice["id"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every error carries a kind, a message, the HTTP status if any, and the raw
//! response body:
//!
//! ```no_run
//! use nfeio_http::{Client, ErrorKind};
//!
//! # async fn example() -> Result<(), nfeio_http::Error> {
//! # let client = Client::new("my-api-key")?;
//! match client.service_invoices().retrieve("c1", "i1").await {
//!     Ok(invoice) => println!("{}", invoice),
//!     Err(e) => match e.kind() {
//!         ErrorKind::NotFound => eprintln!("no such invoice"),
//!         ErrorKind::Authentication => eprintln!("check the API key"),
//!         kind => eprintln!("{kind}: {e} ({:?})", e.details()),
//!     },
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! Up to `max_retries + 1` attempts are made. Rate limits, 401, 5xx, timeouts
//! and connection failures are retried; other 4xx responses are returned
//! immediately. The delay after attempt `a` is
//! `min(base_delay * backoff_multiplier^a + jitter, max_delay)`.

pub mod batch;
mod client;
pub mod config;
mod error;
pub mod metadata;
pub mod polling;
pub mod resources;
pub mod response;
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
pub use response::{AsyncOperation, Outcome, Response, ResponseBody};
pub use retry::{RetryPolicy, RetryPredicate};
