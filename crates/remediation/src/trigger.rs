//! Pipeline triggering for selected verdicts

use crate::gitlab::PipelineBackend;
use agent_common::{ComplianceVerdict, PipelineResult, RemediationStatus};
use compliance::remediation_request;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Error recorded for verdicts whose service has no source repository
pub const NO_PROJECT_PATH: &str = "No project path";

/// Triggers one remediation pipeline per selected verdict
pub struct PipelineTrigger {
    backend: Box<dyn PipelineBackend>,
    branch: String,

    /// Sent with every pipeline in addition to the upgrade variables
    variables: BTreeMap<String, String>,
}

impl PipelineTrigger {
    pub fn new(backend: Box<dyn PipelineBackend>, branch: impl Into<String>) -> Self {
        Self {
            backend,
            branch: branch.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Trigger pipelines sequentially; one result per verdict, in order
    pub async fn trigger_for_non_compliant(
        &self,
        selected: &[&ComplianceVerdict],
    ) -> Vec<PipelineResult> {
        let mut results = Vec::with_capacity(selected.len());

        for verdict in selected {
            let service = &verdict.candidate;

            if service.project_path.trim().is_empty() {
                warn!("[{}] {}; skipping remediation", service.service_name, NO_PROJECT_PATH);
                results.push(PipelineResult {
                    error: Some(NO_PROJECT_PATH.to_string()),
                    remediation_status: RemediationStatus::Skipped,
                    ..PipelineResult::new(&service.service_name, "")
                });
                continue;
            }

            let request = remediation_request(verdict, &self.branch, &self.variables);
            results.push(self.backend.trigger_pipeline(&request).await);
        }

        let count = |status: RemediationStatus| {
            results
                .iter()
                .filter(|r| r.remediation_status == status)
                .count()
        };
        info!(
            "Pipelines: triggered={}, skipped={}, failed={}",
            count(RemediationStatus::Triggered),
            count(RemediationStatus::Skipped),
            count(RemediationStatus::Failed)
        );

        results
    }
}
