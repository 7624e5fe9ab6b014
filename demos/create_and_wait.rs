//! Issues a service invoice and waits for the municipal system to finish.
//!
//! This example shows how to:
//! - Build a client from `NFE_API_KEY` / `NFE_BASE_URL` / `NFE_TIMEOUT_MS`
//! - Submit an invoice and poll its `Location` until it is issued
//! - Download the resulting PDF
//!
//! Run with: `NFE_API_KEY=... cargo run --example create_and_wait -- <company-id>`

use nfeio_http::polling::PollOptions;
use nfeio_http::{Client, Error, ErrorKind};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nfeio_http=debug,create_and_wait=info".into()),
        )
        .init();

    let company_id = std::env::args()
        .nth(1)
        .ok_or_else(|| Error::configuration("usage: create_and_wait <company-id>"))?;

    let client = Client::from_env()?;
    tracing::info!(config = ?client.config(), "Client ready");

    let invoice = json!({
        "cityServiceCode": "2690",
        "description": "Software development consulting",
        "servicesAmount": 1500.0,
        "borrower": {
            "federalTaxNumber": 191,
            "name": "Banco do Brasil SA",
            "email": "exemplo@bb.com.br",
            "address": {
                "country": "BRA",
                "postalCode": "70073901",
                "street": "Outros Quadra 1 Bloco G Lote 32",
                "number": "S/N",
                "district": "Asa Sul",
                "city": { "code": "5300108", "name": "Brasilia" },
                "state": "DF"
            }
        }
    });

    let options = PollOptions {
        max_attempts: 60,
        interval: Duration::from_secs(2),
        timeout: Duration::from_secs(120),
    };

    let issued = match client
        .service_invoices()
        .create_and_wait(&company_id, invoice, &options)
        .await
    {
        Ok(issued) => issued,
        Err(e) if e.kind() == ErrorKind::InvoiceProcessing => {
            eprintln!("Invoice rejected: {e}");
            if let Some(details) = e.details() {
                eprintln!("{details:#}");
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let invoice_id = issued["id"].as_str().unwrap_or_default().to_string();
    println!("Issued invoice {invoice_id} (status {})", issued["status"]);

    let pdf = client
        .service_invoices()
        .download_pdf(&company_id, &invoice_id)
        .await?;
    println!("Downloaded PDF: {} bytes", pdf.len());

    Ok(())
}
