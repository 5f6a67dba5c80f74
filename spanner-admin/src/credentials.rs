//! Access tokens and project discovery.
//!
//! Tokens come either from a credentials file holding an already minted
//! access token, or from the GCE metadata server of the host we run on.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AdminError, Result};

/// Default metadata server root.
pub const METADATA_BASE: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Refresh tokens this long before the server-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where bearer tokens come from.
pub enum TokenSource {
    /// A fixed token read once at startup.
    Static(String),
    /// Tokens minted by the metadata server, cached until shortly before expiry.
    Metadata(MetadataServer),
}

impl TokenSource {
    /// Load a token from a credentials file.
    ///
    /// Accepts either a raw token or a JSON document with an `access_token`
    /// field.
    pub async fn from_credentials_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AdminError::Credentials(format!("failed to read {}: {}", path.display(), e))
        })?;
        parse_credentials(&raw).map(TokenSource::Static)
    }

    /// Current bearer token.
    pub async fn token(&self) -> Result<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata(server) => server.token().await,
        }
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    access_token: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn parse_credentials(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AdminError::Credentials("credentials file is empty".into()));
    }
    if !trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    let doc: CredentialsFile = serde_json::from_str(trimmed)?;
    match (doc.access_token, doc.kind.as_deref()) {
        (Some(token), _) if !token.is_empty() => Ok(token),
        (_, Some("service_account")) => Err(AdminError::Credentials(
            "service account keys are not exchanged for tokens; supply an access token \
             or run with the metadata server"
                .into(),
        )),
        _ => Err(AdminError::Credentials(
            "no access_token in credentials file".into(),
        )),
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Client for the GCE metadata server.
pub struct MetadataServer {
    client: reqwest::Client,
    base: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServer {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base(client, METADATA_BASE)
    }

    pub fn with_base(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
            cached: Mutex::new(None),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AdminError::Credentials(format!(
                "metadata server returned {} for {}",
                response.status(),
                path
            )));
        }
        Ok(response)
    }

    /// Project the host belongs to.
    pub async fn project_id(&self) -> Result<String> {
        let id = self.get("project/project-id").await?.text().await?;
        Ok(id.trim().to_string())
    }

    /// Access token for the host's default service account.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.expires_at {
                return Ok(c.token.clone());
            }
        }

        debug!("Fetching access token from metadata server");
        let response: TokenResponse = self
            .get("instance/service-accounts/default/token")
            .await?
            .json()
            .await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_token() {
        assert_eq!(parse_credentials("  ya29.token\n").unwrap(), "ya29.token");
    }

    #[test]
    fn test_parse_json_token() {
        let raw = r#"{"access_token": "ya29.json", "expires_in": 3599}"#;
        assert_eq!(parse_credentials(raw).unwrap(), "ya29.json");
    }

    #[test]
    fn test_parse_rejects_service_account_key() {
        let raw = r#"{"type": "service_account", "private_key": "-----BEGIN"}"#;
        let err = parse_credentials(raw).unwrap_err();
        assert!(matches!(err, AdminError::Credentials(_)));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            parse_credentials("   ").unwrap_err(),
            AdminError::Credentials(_)
        ));
        assert!(matches!(
            parse_credentials("{}").unwrap_err(),
            AdminError::Credentials(_)
        ));
    }

    #[tokio::test]
    async fn test_from_credentials_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, r#"{"access_token": "ya29.file"}"#)
            .await
            .unwrap();

        let source = TokenSource::from_credentials_file(&path).await.unwrap();
        assert_eq!(source.token().await.unwrap(), "ya29.file");

        let missing = TokenSource::from_credentials_file(&dir.path().join("absent")).await;
        assert!(matches!(missing, Err(AdminError::Credentials(_))));
    }
}
