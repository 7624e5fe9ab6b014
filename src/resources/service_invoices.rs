use super::into_json;
use crate::batch::{BatchItem, BatchOptions};
use crate::metadata::RequestMetadata;
use crate::polling::{PollOptions, StatusClassifier};
use crate::{Client, Outcome, Result};
use bytes::Bytes;
use http::Method;
use serde_json::Value;

/// Service invoices (NFS-e) of a company.
///
/// # Examples
///
/// ```no_run
/// use nfeio_http::Client;
/// use nfeio_http::polling::PollOptions;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), nfeio_http::Error> {
/// let client = Client::new("my-api-key")?;
///
/// let invoice = client
///     .service_invoices()
///     .create_and_wait("c1", json!({"servicesAmount": 100.0}), &PollOptions::default())
///     .await?;
/// println!("issued invoice {}", invoice["id"]);
///
/// let pdf = client.service_invoices().download_pdf("c1", "i1").await?;
/// println!("{} bytes", pdf.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct ServiceInvoices<'a> {
    client: &'a Client,
}

impl<'a> ServiceInvoices<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn collection_path(company_id: &str) -> String {
        format!("/companies/{company_id}/serviceinvoices")
    }

    fn item_path(company_id: &str, invoice_id: &str) -> String {
        format!("/companies/{company_id}/serviceinvoices/{invoice_id}")
    }

    /// Submits an invoice for issuing.
    ///
    /// The API normally answers `202 Accepted`; the returned
    /// [`Outcome::Accepted`] carries the location to poll.
    pub async fn create(&self, company_id: &str, invoice: Value) -> Result<Outcome> {
        self.client
            .post(Self::collection_path(company_id), invoice)
            .await
    }

    /// Submits an invoice and polls until it is issued.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::InvoiceProcessing`] if issuing fails,
    /// [`crate::ErrorKind::PollingTimeout`] if it does not finish within `options`.
    pub async fn create_and_wait(
        &self,
        company_id: &str,
        invoice: Value,
        options: &PollOptions,
    ) -> Result<Value> {
        self.client
            .create_and_wait(
                &Self::collection_path(company_id),
                invoice,
                &StatusClassifier::service_invoice(),
                options,
            )
            .await
    }

    /// Submits many invoices with bounded concurrency.
    ///
    /// See [`Client::create_batch`].
    pub async fn create_batch(
        &self,
        company_id: &str,
        invoices: Vec<Value>,
        options: &BatchOptions,
    ) -> Result<Vec<BatchItem>> {
        self.client
            .create_batch(
                &Self::collection_path(company_id),
                invoices,
                &StatusClassifier::service_invoice(),
                options,
            )
            .await
    }

    /// Fetches one invoice.
    pub async fn retrieve(&self, company_id: &str, invoice_id: &str) -> Result<Value> {
        into_json(self.client.get(Self::item_path(company_id, invoice_id)).await?)
    }

    /// Lists invoices, one page at a time.
    pub async fn list(
        &self,
        company_id: &str,
        page_count: Option<u32>,
        page_index: Option<u32>,
    ) -> Result<Value> {
        let mut metadata = RequestMetadata::new(Method::GET, Self::collection_path(company_id));
        if let Some(count) = page_count {
            metadata = metadata.with_query_param("pageCount", count.to_string());
        }
        if let Some(index) = page_index {
            metadata = metadata.with_query_param("pageIndex", index.to_string());
        }
        into_json(self.client.call(metadata).await?)
    }

    /// Cancels an issued invoice.
    pub async fn cancel(&self, company_id: &str, invoice_id: &str) -> Result<Value> {
        into_json(self.client.delete(Self::item_path(company_id, invoice_id)).await?)
    }

    /// Downloads the invoice PDF.
    pub async fn download_pdf(&self, company_id: &str, invoice_id: &str) -> Result<Bytes> {
        let path = format!("{}/pdf", Self::item_path(company_id, invoice_id));
        self.client.download(path, "application/pdf").await
    }

    /// Downloads the invoice XML as raw bytes.
    pub async fn download_xml(&self, company_id: &str, invoice_id: &str) -> Result<Bytes> {
        let path = format!("{}/xml", Self::item_path(company_id, invoice_id));
        self.client.download(path, "application/xml").await
    }
}
