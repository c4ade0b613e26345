#![allow(dead_code)]

//! Upload Subsystem client — single-file uploads for avatars, certificate
//! documents, and attachments. Files are checked locally (size cap plus an
//! allow-list verified by extension AND content header) before any bytes go
//! on the wire; the endpoint answers `{ "url": ..., "publicId": ... }`.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::errors::ApiError;

const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("File is empty: {0}")]
    Empty(PathBuf),

    #[error("File too large: {size_mb:.1}MB (max 10MB)")]
    TooLarge { size_mb: f64 },

    #[error("Unsupported file type '{extension}': use PDF, DOC, DOCX, JPEG or PNG")]
    UnsupportedType { extension: String },

    #[error("File content does not match the .{extension} extension")]
    WrongFormat { extension: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Cannot read file: {0}")]
    Unreadable(#[from] std::io::Error),
}

impl UploadError {
    /// Stable code surfaced alongside the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "UPLOAD_NOT_FOUND",
            Self::Empty(_) => "UPLOAD_EMPTY",
            Self::TooLarge { .. } => "UPLOAD_TOO_LARGE",
            Self::UnsupportedType { .. } => "UPLOAD_WRONG_TYPE",
            Self::WrongFormat { .. } => "UPLOAD_CORRUPTED",
            Self::Api(_) => "UPLOAD_REJECTED",
            Self::Unreadable(_) => "UPLOAD_UNREADABLE",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    #[serde(rename = "publicId", default)]
    pub public_id: Option<String>,
}

pub struct UploadClient {
    client: reqwest::Client,
    upload_url: String,
    token: String,
}

impl UploadClient {
    pub fn new(base_url: &str, token: &str, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .expect("Failed to build HTTP client"),
            upload_url: format!("{}/upload", base_url.trim_end_matches('/')),
            token: token.to_string(),
        }
    }

    /// Validates and uploads one file, returning the URL the draft state
    /// should reference.
    pub async fn upload(&self, path: &Path) -> Result<UploadedFile, UploadError> {
        let (content_type, bytes) = read_validated(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(ApiError::Http)?;
        let form = Form::new().part("file", part);

        info!("Uploading {} ({content_type})", path.display());

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Http)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!("Upload of {} rejected with {status}", path.display());
            return Err(ApiError::from_status(status.as_u16(), &body).into());
        }

        let uploaded: UploadedFile = serde_json::from_str(&body).map_err(ApiError::Parse)?;
        info!("Uploaded {} -> {}", path.display(), uploaded.url);
        Ok(uploaded)
    }
}

/// Reads the file and enforces the size cap and the type allow-list.
async fn read_validated(path: &Path) -> Result<(&'static str, Vec<u8>), UploadError> {
    if !path.exists() {
        return Err(UploadError::NotFound(path.to_path_buf()));
    }

    let metadata = fs::metadata(path).await?;
    if metadata.len() == 0 {
        return Err(UploadError::Empty(path.to_path_buf()));
    }
    if metadata.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size_mb: metadata.len() as f64 / 1024.0 / 1024.0,
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let content_type = match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => return Err(UploadError::UnsupportedType { extension }),
    };

    let bytes = fs::read(path).await?;
    if !header_matches(&extension, &bytes) {
        return Err(UploadError::WrongFormat { extension });
    }

    Ok((content_type, bytes))
}

fn header_matches(extension: &str, bytes: &[u8]) -> bool {
    match extension {
        "pdf" => bytes.starts_with(b"%PDF"),
        // legacy .doc is a CFB container
        "doc" => bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]),
        // .docx is a ZIP container
        "docx" => bytes.starts_with(b"PK\x03\x04"),
        "jpg" | "jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "png" => bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
        _ => false,
    }
}
