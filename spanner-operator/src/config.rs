//! Operator configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spanner_admin::{FileAdmin, MetadataServer, RestAdmin, RestConfig, SpannerAdmin};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Which admin implementation to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// The real Spanner Admin API.
    Live,
    /// JSON files under `data_dir`.
    Mock { data_dir: PathBuf },
}

/// Everything the operator needs at construction time.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub project_id: String,
    pub credentials_path: Option<PathBuf>,
    pub backend: Backend,
    /// Workers per controller.
    pub workers: usize,
    /// Interval between full re-enqueues of the cache; zero disables.
    pub resync_period: Duration,
    pub cache_sync_timeout: Duration,
    pub request_timeout: Duration,
    pub operation_timeout: Duration,
}

impl OperatorConfig {
    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            request_timeout: self.request_timeout,
            operation_timeout: self.operation_timeout,
            ..RestConfig::default()
        }
    }
}

/// Use `explicit` if set, otherwise ask the metadata server.
pub async fn resolve_project_id(explicit: Option<String>) -> Result<String> {
    if let Some(id) = explicit.filter(|id| !id.trim().is_empty()) {
        return Ok(id.trim().to_string());
    }

    info!("No project id configured, asking the metadata server");
    let client = reqwest_client(Duration::from_secs(5))?;
    match MetadataServer::new(client).project_id().await {
        Ok(id) if !id.is_empty() => Ok(id),
        Ok(_) => Err(Error::Config("metadata server returned an empty project id".into())),
        Err(e) => {
            warn!("Metadata server unavailable: {}", e);
            Err(Error::Config(
                "project id not set; pass --project-id or set GCP_PROJECT_ID".into(),
            ))
        }
    }
}

fn reqwest_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(e.to_string()))
}

/// Build the admin implementation selected by `config`.
pub async fn build_admin(config: &OperatorConfig) -> Result<Arc<dyn SpannerAdmin>> {
    match &config.backend {
        Backend::Mock { data_dir } => {
            let admin = FileAdmin::open(data_dir, &config.project_id).await?;
            Ok(Arc::new(admin))
        }
        Backend::Live => {
            let admin = RestAdmin::connect(
                &config.project_id,
                config.credentials_path.as_deref(),
                config.rest_config(),
            )
            .await?;
            Ok(Arc::new(admin))
        }
    }
}
