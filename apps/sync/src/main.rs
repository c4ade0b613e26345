mod api;
mod config;
mod errors;
mod lookup;
mod profile;
mod session;
mod upload;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::ApiClient;
use crate::config::Config;
use crate::errors::ApiError;
use crate::profile::models::{Attachment, ProfileDocument};
use crate::profile::reconcile::reconcile_profile;
use crate::profile::store::ProfileStores;
use crate::session::Session;
use crate::upload::UploadClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting profile sync v{}", env!("CARGO_PKG_VERSION"));

    let mut session = Session::hydrate(&config.token_path)?;

    let document_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "profile.json".to_string());
    let raw = std::fs::read_to_string(&document_path)
        .with_context(|| format!("Cannot read draft profile {document_path}"))?;
    let mut document: ProfileDocument = serde_json::from_str(&raw)
        .with_context(|| format!("Malformed draft profile {document_path}"))?;
    info!(
        "Loaded draft profile from {document_path}: {} education, {} experience, {} certification entries",
        document.education.len(),
        document.experience.len(),
        document.certifications.len()
    );

    // Push pending certificate files through the upload subsystem before the
    // save; an entry still mid-upload would block its section.
    if !document.attachments.is_empty() {
        let uploader = UploadClient::new(
            &config.upload_api_url,
            session.token(),
            config.request_timeout_secs,
        );
        attach_files(&uploader, &mut document).await?;
    }

    let api = ApiClient::new(
        &config.profile_api_url,
        session.token(),
        config.request_timeout_secs,
    );
    let stores = ProfileStores::rest(api);

    match reconcile_profile(&stores, &document).await {
        Ok(report) => {
            for line in report.summary_lines() {
                info!("{line}");
            }
            if report.saw_unauthorized() {
                session.invalidate();
                anyhow::bail!("Session expired; sign in again");
            }
            if !report.is_clean() {
                for message in report.error_summaries() {
                    error!("{message}");
                }
                anyhow::bail!("Profile save finished with errors; retry the save");
            }
            info!("Profile saved");
            Ok(())
        }
        Err(ApiError::Unauthorized) => {
            session.invalidate();
            anyhow::bail!("Session expired; sign in again")
        }
        Err(e) => Err(e).context("Saving core profile fields failed"),
    }
}

/// Uploads each requested certificate file and parks the returned URL on its
/// certification entry.
async fn attach_files(uploader: &UploadClient, document: &mut ProfileDocument) -> Result<()> {
    let requests = std::mem::take(&mut document.attachments);
    for request in requests {
        let Some(entry) = document.certifications.iter_mut().find(|e| {
            e.content()
                .name
                .eq_ignore_ascii_case(&request.certification_name)
        }) else {
            warn!(
                "No certification named '{}' for attachment {}",
                request.certification_name,
                request.file.display()
            );
            continue;
        };

        entry.content_mut().credential = Attachment::Uploading;
        let uploaded = uploader
            .upload(&request.file)
            .await
            .with_context(|| format!("Uploading {} failed", request.file.display()))?;
        entry.content_mut().credential = Attachment::Uploaded { url: uploaded.url };
    }
    Ok(())
}
