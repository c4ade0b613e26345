use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Authenticated session handed explicitly to every collaborator that talks
/// to the remote store. Hydrated once at startup from the persisted token,
/// torn down on logout or on a 401 from any call.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    token_path: PathBuf,
}

impl Session {
    /// Hydrates a session from the persisted bearer token.
    /// A missing or empty token file means there is no session.
    pub fn hydrate(token_path: impl AsRef<Path>) -> Result<Self> {
        let token_path = token_path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&token_path)
            .with_context(|| format!("No session token at {}", token_path.display()))?;
        let token = raw.trim().to_string();
        if token.is_empty() {
            anyhow::bail!("Session token at {} is empty", token_path.display());
        }
        info!("Session hydrated from {}", token_path.display());
        Ok(Self { token, token_path })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Clears the in-memory token and best-effort removes the persisted one.
    /// Called on logout and when the server answers 401.
    pub fn invalidate(&mut self) {
        self.token.clear();
        if let Err(e) = std::fs::remove_file(&self.token_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove persisted token {}: {e}",
                    self.token_path.display()
                );
            }
        }
        info!("Session invalidated");
    }
}
