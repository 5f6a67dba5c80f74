//! Live implementation against the Spanner Admin REST API.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::admin::SpannerAdmin;
use crate::credentials::{MetadataServer, TokenSource};
use crate::error::{AdminError, Result};
use crate::model::{Database, Instance};
use crate::naming;

/// Public API root.
pub const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com/v1/";

/// Transport settings for [`RestAdmin`].
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API root, with trailing slash.
    pub endpoint: String,
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,
    /// Deadline for a long-running operation to finish.
    pub operation_timeout: Duration,
    /// Delay between operation polls.
    pub poll_interval: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Long-running operation handle.
#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationStatus>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// gRPC status code for NOT_FOUND.
const CODE_NOT_FOUND: i32 = 5;

impl Operation {
    fn into_result(self) -> Result<()> {
        match self.error {
            None => Ok(()),
            Some(status) if status.code == CODE_NOT_FOUND => Err(AdminError::NotFound(status.message)),
            Some(status) => Err(AdminError::Operation {
                name: self.name,
                message: status.message,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

fn api_error(status: StatusCode, body: &str) -> AdminError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if status == StatusCode::NOT_FOUND {
        AdminError::NotFound(message)
    } else {
        AdminError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Spanner admin client over HTTPS.
pub struct RestAdmin {
    project_id: String,
    http: reqwest::Client,
    tokens: TokenSource,
    config: RestConfig,
}

impl RestAdmin {
    pub fn new(project_id: impl Into<String>, tokens: TokenSource, config: RestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            project_id: project_id.into(),
            http,
            tokens,
            config,
        })
    }

    /// Build a client whose tokens come from `credentials` if given, otherwise
    /// from the metadata server.
    pub async fn connect(
        project_id: impl Into<String>,
        credentials: Option<&Path>,
        config: RestConfig,
    ) -> Result<Self> {
        let tokens = match credentials {
            Some(path) => {
                info!("Using access token from {}", path.display());
                TokenSource::from_credentials_file(path).await?
            }
            None => {
                info!("Using metadata server for access tokens");
                TokenSource::Metadata(MetadataServer::new(reqwest::Client::new()))
            }
        };
        Self::new(project_id, tokens, config)
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.config.endpoint, name)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    /// Poll `op` until it is done or the operation deadline passes.
    async fn wait(&self, op: Operation) -> Result<()> {
        let name = op.name.clone();
        let poll = async {
            let mut op = op;
            loop {
                if op.done {
                    return op.into_result();
                }
                tokio::time::sleep(self.config.poll_interval).await;
                debug!("Polling operation {}", op.name);
                op = self.send(self.http.get(self.url(&op.name))).await?.json().await?;
            }
        };

        tokio::time::timeout(self.config.operation_timeout, poll)
            .await
            .map_err(|_| AdminError::Timeout(name))?
    }

    async fn patch_instance(&self, body: serde_json::Value) -> Result<()> {
        let name = body["instance"]["name"].as_str().unwrap_or_default().to_string();
        let op: Operation = self
            .send(self.http.patch(self.url(&name)).json(&body))
            .await?
            .json()
            .await?;
        self.wait(op).await
    }
}

#[async_trait]
impl SpannerAdmin for RestAdmin {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_instance(
        &self,
        display_name: &str,
        instance_id: &str,
        config: &str,
        node_count: i32,
    ) -> Result<()> {
        let body = json!({
            "instanceId": instance_id,
            "instance": {
                "name": naming::instance_name(&self.project_id, instance_id),
                "config": naming::instance_config_name(&self.project_id, config),
                "displayName": display_name,
                "nodeCount": node_count,
            },
        });
        let parent = format!("{}/instances", naming::project_name(&self.project_id));
        let op: Operation = self
            .send(self.http.post(self.url(&parent)).json(&body))
            .await?
            .json()
            .await?;
        self.wait(op).await?;
        info!("Created instance {}", instance_id);
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let name = naming::instance_name(&self.project_id, instance_id);
        Ok(self.send(self.http.get(self.url(&name))).await?.json().await?)
    }

    async fn scale(&self, instance_id: &str, node_count: i32) -> Result<()> {
        self.patch_instance(json!({
            "instance": {
                "name": naming::instance_name(&self.project_id, instance_id),
                "nodeCount": node_count,
            },
            "fieldMask": "nodeCount",
        }))
        .await?;
        info!("Updated node count of {} to {}", instance_id, node_count);
        Ok(())
    }

    async fn update_labels(
        &self,
        instance_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.patch_instance(json!({
            "instance": {
                "name": naming::instance_name(&self.project_id, instance_id),
                "labels": labels,
            },
            "fieldMask": "labels",
        }))
        .await?;
        info!("Updated labels of {} to {:?}", instance_id, labels);
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let name = naming::instance_name(&self.project_id, instance_id);
        self.send(self.http.delete(self.url(&name))).await?;
        info!("Deleted instance {}", instance_id);
        Ok(())
    }

    async fn create_database(&self, instance_id: &str, name: &str) -> Result<()> {
        let parent = format!(
            "{}/databases",
            naming::instance_name(&self.project_id, instance_id)
        );
        let body = json!({ "createStatement": format!("CREATE DATABASE `{}`", name) });
        let op: Operation = self
            .send(self.http.post(self.url(&parent)).json(&body))
            .await?
            .json()
            .await?;
        self.wait(op).await?;
        info!("Created database {} on {}", name, instance_id);
        Ok(())
    }

    async fn get_database(&self, instance_id: &str, name: &str) -> Result<Database> {
        let db = naming::database_name(&self.project_id, instance_id, name);
        Ok(self.send(self.http.get(self.url(&db))).await?.json().await?)
    }

    async fn drop_database(&self, instance_id: &str, name: &str) -> Result<()> {
        let db = naming::database_name(&self.project_id, instance_id, name);
        self.send(self.http.delete(self.url(&db))).await?;
        info!("Dropped database {} on {}", name, instance_id);
        Ok(())
    }
}
