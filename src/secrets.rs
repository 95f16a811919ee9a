//! Credentials the HTTP handlers check requests against.
//!
//! The secrets document looks like this:
//!
//! ```json
//! {
//!   "secrets": {
//!     "photography_tools": { "api_token": "..." },
//!     "express": { "username": "...", "password": "..." }
//!   }
//! }
//! ```

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Secrets {
    pub photography_tools: PhotographyTools,
    pub express: BasicCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhotographyTools {
    /// Expected in the `token` header of mutating photography requests.
    pub api_token: String,
}

/// Expected as HTTP Basic auth on the logging endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
struct SecretsDocument {
    secrets: Secrets,
}

/// Source of the current [`Secrets`].
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    async fn load(&self) -> Result<Secrets>;
}

/// Reads the secrets document from disk on every call, so rotating a token
/// takes effect without a restart.
#[derive(Debug, Clone)]
pub struct SecretsFile {
    path: PathBuf,
}

impl SecretsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretsProvider for SecretsFile {
    async fn load(&self) -> Result<Secrets> {
        let bytes = tokio::fs::read(&self.path).await.or_raise(|| ErrorKind::Secrets)?;
        let document: SecretsDocument = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Secrets)?;
        Ok(document.secrets)
    }
}

/// Fixed secrets, for tests and embedding.
#[derive(Debug, Clone)]
pub struct StaticSecrets(pub Secrets);

#[async_trait]
impl SecretsProvider for StaticSecrets {
    async fn load(&self) -> Result<Secrets> {
        Ok(self.0.clone())
    }
}
