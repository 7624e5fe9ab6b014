use super::into_json;
use crate::metadata::FormPayload;
use crate::{Client, Result};
use bytes::Bytes;
use serde_json::Value;

/// Companies registered on the account.
#[derive(Clone, Copy)]
pub struct Companies<'a> {
    client: &'a Client,
}

impl<'a> Companies<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Fetches one company.
    pub async fn retrieve(&self, company_id: &str) -> Result<Value> {
        into_json(self.client.get(format!("/companies/{company_id}")).await?)
    }

    /// Uploads the company's digital certificate (PKCS#12).
    ///
    /// Sent as `multipart/form-data` with `file` and `password` fields.
    pub async fn upload_certificate(
        &self,
        company_id: &str,
        file_name: &str,
        certificate: impl Into<Bytes>,
        password: &str,
    ) -> Result<Value> {
        let form = FormPayload::new()
            .file("file", file_name, certificate, Some("application/x-pkcs12"))
            .text("password", password);
        into_json(
            self.client
                .post(format!("/companies/{company_id}/certificate"), form)
                .await?,
        )
    }
}
