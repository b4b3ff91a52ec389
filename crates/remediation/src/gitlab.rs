//! GitLab pipeline API client

use agent_common::config::GitLabConfig;
use agent_common::{PipelineResult, RemediationRequest, RemediationStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Status label recorded for pipelines that were only simulated
pub const DRY_RUN_STATUS: &str = "dry_run";

/// Starts and inspects remediation pipelines
///
/// Failures are reported in the returned [`PipelineResult`], never as errors.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    async fn trigger_pipeline(&self, request: &RemediationRequest) -> PipelineResult;

    async fn pipeline_status(&self, project_path: &str, pipeline_id: u64) -> PipelineResult;
}

/// Project path in the form the GitLab API accepts as a project id
pub fn encode_project_path(project_path: &str) -> String {
    project_path.replace('/', "%2F")
}

fn service_from_path(project_path: &str) -> &str {
    project_path.rsplit('/').next().unwrap_or(project_path)
}

/// Map a GitLab pipeline status to a remediation status
pub fn remediation_status_for(status: &str) -> RemediationStatus {
    match status {
        "success" => RemediationStatus::Completed,
        "failed" | "canceled" => RemediationStatus::Failed,
        "pending" | "running" => RemediationStatus::InProgress,
        _ => RemediationStatus::Triggered,
    }
}

#[derive(Debug, Serialize)]
struct PipelineVariable<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePipeline<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    variables: Vec<PipelineVariable<'a>>,
}

/// Pipeline as returned by the GitLab API
#[derive(Debug, Deserialize)]
struct Pipeline {
    id: Option<u64>,
    web_url: Option<String>,
    status: Option<String>,
}

/// Client for the GitLab pipelines API
pub struct GitLabClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    dry_run: bool,
}

impl GitLabClient {
    /// Create a new GitLab client; with `dry_run` no request is ever sent
    pub fn new(config: &GitLabConfig, dry_run: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build GitLab HTTP client")?;

        Ok(Self {
            base_url: config.base_url(),
            token: config.token.clone(),
            client,
            dry_run,
        })
    }

    fn with_token(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("PRIVATE-TOKEN", self.token.as_deref().unwrap_or_default())
    }

    async fn create_pipeline(&self, request: &RemediationRequest) -> Result<Pipeline> {
        let url = format!(
            "{}/projects/{}/pipeline",
            self.base_url,
            encode_project_path(&request.project_path)
        );
        let body = CreatePipeline {
            git_ref: &request.git_ref,
            variables: request
                .variables
                .iter()
                .map(|(key, value)| PipelineVariable { key, value })
                .collect(),
        };

        debug!("Creating pipeline: {}", url);

        let response = self
            .with_token(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("Pipeline request failed")?;

        if response.status() != reqwest::StatusCode::CREATED {
            anyhow::bail!("HTTP {}", response.status().as_u16());
        }

        response
            .json()
            .await
            .context("Failed to parse pipeline response")
    }

    async fn get_pipeline(&self, project_path: &str, pipeline_id: u64) -> Result<Pipeline> {
        let url = format!(
            "{}/projects/{}/pipelines/{}",
            self.base_url,
            encode_project_path(project_path),
            pipeline_id
        );

        let response = self
            .with_token(self.client.get(&url))
            .send()
            .await
            .context("Pipeline status request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status().as_u16());
        }

        response
            .json()
            .await
            .context("Failed to parse pipeline response")
    }
}

#[async_trait]
impl PipelineBackend for GitLabClient {
    async fn trigger_pipeline(&self, request: &RemediationRequest) -> PipelineResult {
        let result = PipelineResult::new(&request.service_name, &request.project_path);

        if self.dry_run {
            info!(
                "[DRY RUN] Would trigger: {} (ref: {})",
                request.project_path, request.git_ref
            );
            return result.mark_skipped(DRY_RUN_STATUS);
        }

        match self.create_pipeline(request).await {
            Ok(pipeline) => {
                info!(
                    "[{}] Pipeline triggered: {}",
                    request.service_name,
                    pipeline.web_url.as_deref().unwrap_or("-")
                );
                result.mark_triggered(pipeline.id, pipeline.web_url, pipeline.status)
            }
            Err(e) => {
                error!("[{}] Failed to trigger pipeline: {:#}", request.service_name, e);
                result.mark_failed(format!("{:#}", e))
            }
        }
    }

    async fn pipeline_status(&self, project_path: &str, pipeline_id: u64) -> PipelineResult {
        let mut result = PipelineResult::new(service_from_path(project_path), project_path);
        result.pipeline_id = Some(pipeline_id);

        if self.dry_run {
            result.status = Some(DRY_RUN_STATUS.to_string());
            result.remediation_status = RemediationStatus::Skipped;
            return result;
        }

        match self.get_pipeline(project_path, pipeline_id).await {
            Ok(pipeline) => {
                result.remediation_status = pipeline
                    .status
                    .as_deref()
                    .map(remediation_status_for)
                    .unwrap_or(RemediationStatus::Triggered);
                result.pipeline_url = pipeline.web_url;
                result.status = pipeline.status;
                result
            }
            Err(e) => result.mark_failed(format!("{:#}", e)),
        }
    }
}
