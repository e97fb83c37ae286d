use crate::auth::AuthContext;
use crate::error::UploadError;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Receipt returned for an accepted upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Admin debugging tool: pushes a captured media file to the backend for
/// offline analysis. HTTP status codes are classified explicitly — a 400
/// is a file-validation failure, 401/403 is an auth failure; the two are
/// never lumped together.
pub struct AdminUploader {
    client: reqwest::Client,
    upload_url: String,
    auth: AuthContext,
}

impl AdminUploader {
    pub fn new(base_url: &str, auth: AuthContext) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: format!("{}/admin/upload", base_url.trim_end_matches('/')),
            auth,
        }
    }

    /// Upload one media file as multipart form data.
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadReceipt, UploadError> {
        debug!("Uploading {} ({} bytes)", file_name, data.len());

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|err| UploadError::Request {
                details: format!("invalid content type: {}", err),
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Request {
                details: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let receipt = response.json::<UploadReceipt>().await.unwrap_or(UploadReceipt {
                id: None,
                message: None,
            });
            info!("Upload accepted: {:?}", receipt.id);
            return Ok(receipt);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Upload rejected with status {}: {}", status, body);

        match status.as_u16() {
            401 | 403 => Err(UploadError::Unauthorized),
            400 => Err(UploadError::InvalidFile {
                details: if body.is_empty() {
                    "file rejected by backend validation".to_string()
                } else {
                    body
                },
            }),
            code => Err(UploadError::Unexpected { status: code }),
        }
    }
}
