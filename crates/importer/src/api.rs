//! REST client for the import endpoints.
//!
//! Wraps `/api/import/*` (upload, multi-upload, progress, history) using
//! [`reqwest`]. The tracker only sees the [`ImportBackend`] trait so the
//! transport can be swapped out in tests.

use std::time::Duration;

use async_trait::async_trait;
use hb_core::history::ImportHistoryEntry;
use hb_core::import::ImportProgress;
use hb_core::selection::UploadFile;
use hb_core::session::Session;
use hb_core::types::ImportId;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Default HTTP timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of an upload response.
///
/// The multi-upload endpoint reports files it refused in the same list,
/// without an `importId` and with an `error` instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImport {
    #[serde(default)]
    pub import_id: Option<ImportId>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response body of `POST /api/import/upload-multiple`.
#[derive(Debug, Deserialize)]
struct MultiUploadResponse {
    #[serde(default)]
    imports: Vec<UploadedImport>,
}

/// Error body the server sends with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Errors from the import REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ImportApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server does not know the requested import (HTTP 404).
    #[error("Import not found")]
    NotFound,

    /// The server returned another non-2xx status code.
    #[error("Import API error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// The server's `error` message, or the raw body.
        message: String,
    },
}

/// Operations the tracker needs from the import service.
#[async_trait]
pub trait ImportBackend: Send + Sync {
    /// Start one import from a single file.
    async fn upload(
        &self,
        session: &Session,
        file: &UploadFile,
    ) -> Result<UploadedImport, ImportApiError>;

    /// Start one import per file in a single request.
    async fn upload_multiple(
        &self,
        session: &Session,
        files: &[UploadFile],
    ) -> Result<Vec<UploadedImport>, ImportApiError>;

    /// Fetch the current status of an import.
    async fn progress(&self, import_id: &ImportId) -> Result<ImportProgress, ImportApiError>;

    /// List import history visible to `user_name`.
    async fn history(&self, user_name: &str) -> Result<Vec<ImportHistoryEntry>, ImportApiError>;

    /// Delete all import history.
    async fn clear_history(&self, user_name: &str) -> Result<(), ImportApiError>;
}

/// HTTP client for one record service instance.
pub struct ImportApi {
    client: reqwest::Client,
    api_url: String,
}

impl ImportApi {
    /// Create an API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8080`.
    /// * `timeout` - Per-request timeout.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ImportApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/import{}", self.api_url, path)
    }

    // ---- private helpers ----

    fn file_part(file: &UploadFile) -> Result<Part, ImportApiError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(mime_for(&file.name))?;
        Ok(part)
    }

    fn identity_fields(form: Form, session: &Session) -> Form {
        form.text("userName", session.user_name.clone())
            .text("isAdmin", session.is_admin.to_string())
    }

    /// Ensure the response has a success status code. A 404 becomes
    /// [`ImportApiError::NotFound`]; other failures carry the server's
    /// `error` message when the body has one.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ImportApiError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ImportApiError::NotFound);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ImportApiError::ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ImportApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ImportBackend for ImportApi {
    async fn upload(
        &self,
        session: &Session,
        file: &UploadFile,
    ) -> Result<UploadedImport, ImportApiError> {
        let form = Self::identity_fields(Form::new().part("file", Self::file_part(file)?), session);

        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn upload_multiple(
        &self,
        session: &Session,
        files: &[UploadFile],
    ) -> Result<Vec<UploadedImport>, ImportApiError> {
        let mut form = Form::new();
        for file in files {
            form = form.part("files", Self::file_part(file)?);
        }
        let form = Self::identity_fields(form, session);

        let response = self
            .client
            .post(self.url("/upload-multiple"))
            .multipart(form)
            .send()
            .await?;

        let body: MultiUploadResponse = Self::parse_response(response).await?;
        Ok(body.imports)
    }

    async fn progress(&self, import_id: &ImportId) -> Result<ImportProgress, ImportApiError> {
        let response = self
            .client
            .get(self.url(&format!("/progress/{import_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn history(&self, user_name: &str) -> Result<Vec<ImportHistoryEntry>, ImportApiError> {
        let response = self
            .client
            .get(self.url("/history"))
            .query(&[("userName", user_name)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn clear_history(&self, user_name: &str) -> Result<(), ImportApiError> {
        let response = self
            .client
            .delete(self.url("/history"))
            .query(&[("userName", user_name)])
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Pull the human-readable message out of an error body, falling back to
/// the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(message),
            ..
        })
        | Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ if body.trim().is_empty() => "Upload failed".to_string(),
        _ => body.to_string(),
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".json") {
        "application/json"
    } else if lower.ends_with(".csv") {
        "text/csv"
    } else {
        "application/octet-stream"
    }
}
