//! Thin resource wrappers over the client.
//!
//! Each resource only builds paths and payloads; retries, error
//! classification and polling all come from [`Client`].

mod companies;
mod service_invoices;

pub use companies::Companies;
pub use service_invoices::ServiceInvoices;

use crate::{Client, Outcome, Result};
use serde_json::Value;

impl Client {
    /// Service-invoice operations.
    pub fn service_invoices(&self) -> ServiceInvoices<'_> {
        ServiceInvoices::new(self)
    }

    /// Company operations.
    pub fn companies(&self) -> Companies<'_> {
        Companies::new(self)
    }
}

/// Extracts the JSON body of a completed request.
fn into_json(outcome: Outcome) -> Result<Value> {
    Ok(outcome.into_response()?.body.to_value())
}
