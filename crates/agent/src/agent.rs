//! Audit run orchestration
//!
//! Extract, validate, reconcile, resolve, select, trigger, report. Each stage
//! processes services one at a time, in telemetry order.

use crate::report::{AgentReport, ReportGenerator};
use agent_common::{AgentConfig, Result, ServiceCandidate};
use compliance::{select_for_remediation, ComplianceResolver, RedHatCatalog};
use discovery::{validate_all, PlatformReconciler, TelemetryExtractor};
use remediation::{GitLabClient, PipelineTrigger};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub report: AgentReport,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    /// Candidates confirmed live; zero when the run fell back to all candidates
    pub confirmed: usize,
}

/// Base image compliance agent
pub struct BaseImageAgent {
    extractor: TelemetryExtractor,
    reconciler: PlatformReconciler,
    resolver: ComplianceResolver,
    trigger: PipelineTrigger,
    reporter: ReportGenerator,
    dry_run: bool,
}

impl BaseImageAgent {
    pub fn new(
        extractor: TelemetryExtractor,
        reconciler: PlatformReconciler,
        resolver: ComplianceResolver,
        trigger: PipelineTrigger,
        reporter: ReportGenerator,
        dry_run: bool,
    ) -> Self {
        Self {
            extractor,
            reconciler,
            resolver,
            trigger,
            reporter,
            dry_run,
        }
    }

    /// Wire the production collaborators from configuration
    pub fn from_config(config: &AgentConfig, branch: &str, dry_run: bool) -> anyhow::Result<Self> {
        let catalog = RedHatCatalog::new(&config.compliance)?;
        let gitlab = GitLabClient::new(&config.gitlab, dry_run)?;

        let agent = Self::new(
            TelemetryExtractor::new(&config.discovery),
            PlatformReconciler::from_config(config)?,
            ComplianceResolver::new(Box::new(catalog), &config.compliance),
            PipelineTrigger::new(Box::new(gitlab), branch)
                .with_variables(config.pipeline_variables.clone()),
            ReportGenerator::new(&config.output_dir),
            dry_run,
        );

        info!(
            "Agent initialized. platform={} image_type={} strategy={:?} dry_run={}",
            config.discovery.target_platform,
            config.discovery.target_image_type.as_deref().unwrap_or("any"),
            config.compliance.tag_strategy,
            dry_run
        );

        Ok(agent)
    }

    /// Run against a telemetry export on disk
    pub async fn run_file(&mut self, path: &Path) -> Result<Option<AgentRun>> {
        let document = TelemetryExtractor::load_file(path)?;
        self.run(&document).await
    }

    /// Run against a parsed telemetry document
    ///
    /// Returns `Ok(None)` when the document holds no deploy events. Fails
    /// before any network call when a candidate lacks a required attribute.
    pub async fn run(&mut self, document: &Value) -> Result<Option<AgentRun>> {
        info!("Starting base image audit (dry_run={})", self.dry_run);

        let candidates = self.extractor.extract(document);
        if candidates.is_empty() {
            warn!("No candidate services found in telemetry");
            return Ok(None);
        }
        info!("Telemetry candidates found: {}", candidates.len());

        validate_all(&candidates)?;

        let candidates: Vec<Arc<ServiceCandidate>> = candidates.into_iter().map(Arc::new).collect();
        let reconciliation = self.reconciler.reconcile(&candidates).await;
        let services = reconciliation.services;

        info!("Checking compliance for {} services...", services.len());
        let verdicts = self.resolver.check_all(&services).await;
        let selected = select_for_remediation(&verdicts);

        let pipelines = if selected.is_empty() {
            info!("All audited services are compliant or unverified");
            Vec::new()
        } else {
            info!("Creating pipelines for {} services...", selected.len());
            self.trigger.trigger_for_non_compliant(&selected).await
        };

        let report = self
            .reporter
            .generate(&services, &verdicts, &pipelines, self.dry_run);
        let json_path = self.reporter.save_json(&report)?;
        let csv_path = self.reporter.save_csv(&report)?;
        ReportGenerator::print_summary(&report);

        Ok(Some(AgentRun {
            report,
            json_path,
            csv_path,
            confirmed: reconciliation.confirmed,
        }))
    }
}
