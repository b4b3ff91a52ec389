//! Run reports
//!
//! A finished run is written as a JSON report and a CSV of compliance rows
//! into the output directory, and summarized on the console.

use agent_common::{
    ComplianceStatus, ComplianceVerdict, PipelineResult, RemediationStatus, Result,
    ServiceCandidate,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// One compliance row, as written to both report files
#[derive(Debug, Clone, Serialize)]
pub struct VerdictRow {
    pub service_name: String,
    pub profile_name: String,
    pub project_path: String,
    pub platform: String,
    pub environment: String,
    pub image_type: String,
    pub is_compliant: bool,
    pub current_tag: String,
    pub latest_tag: String,
    /// "N" or "N-{age}"
    pub tag_age: String,
    pub status: ComplianceStatus,
    pub remediation_required: bool,
}

impl From<&ComplianceVerdict> for VerdictRow {
    fn from(verdict: &ComplianceVerdict) -> Self {
        let service = &verdict.candidate;
        Self {
            service_name: service.service_name.clone(),
            profile_name: service.profile_name.clone(),
            project_path: service.project_path.clone(),
            platform: service.platform.to_string(),
            environment: service.environment.clone(),
            image_type: service.image_type.clone(),
            is_compliant: verdict.is_compliant,
            current_tag: verdict.current_tag.clone(),
            latest_tag: verdict.latest_tag.clone(),
            tag_age: verdict.tag_age_label(),
            status: verdict.status,
            remediation_required: verdict.remediation_required,
        }
    }
}

const CSV_HEADER: [&str; 12] = [
    "service_name",
    "profile_name",
    "project_path",
    "platform",
    "environment",
    "image_type",
    "is_compliant",
    "current_tag",
    "latest_tag",
    "tag_age",
    "status",
    "remediation_required",
];

impl VerdictRow {
    fn csv_fields(&self) -> [String; 12] {
        [
            self.service_name.clone(),
            self.profile_name.clone(),
            self.project_path.clone(),
            self.platform.clone(),
            self.environment.clone(),
            self.image_type.clone(),
            self.is_compliant.to_string(),
            self.current_tag.clone(),
            self.latest_tag.clone(),
            self.tag_age.clone(),
            self.status.as_str().to_string(),
            self.remediation_required.to_string(),
        ]
    }
}

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Headline counts of a run
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_services: usize,
    pub compliant_count: usize,
    pub non_compliant_count: usize,
    /// Percentage with one decimal, "N/A" without services
    pub compliance_rate: String,
    pub pipelines_triggered: usize,
    pub pipelines_failed: usize,
    pub dry_run: bool,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub run_timestamp: DateTime<Utc>,
    pub summary: ReportSummary,
    pub services: Vec<serde_json::Map<String, serde_json::Value>>,
    pub compliance_results: Vec<VerdictRow>,
    pub pipeline_results: Vec<PipelineResult>,
}

impl AgentReport {
    /// Rows of services that are not compliant, unverified ones included
    pub fn non_compliant(&self) -> impl Iterator<Item = &VerdictRow> {
        self.compliance_results.iter().filter(|r| !r.is_compliant)
    }

    fn file_stamp(&self) -> String {
        self.run_timestamp.format("%Y%m%d_%H%M%S").to_string()
    }
}

/// Builds and writes run reports
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Assemble the report for one run
    pub fn generate(
        &self,
        services: &[Arc<ServiceCandidate>],
        verdicts: &[ComplianceVerdict],
        pipelines: &[PipelineResult],
        dry_run: bool,
    ) -> AgentReport {
        let compliant_count = verdicts.iter().filter(|v| v.is_compliant).count();
        let count = |status: RemediationStatus| {
            pipelines
                .iter()
                .filter(|p| p.remediation_status == status)
                .count()
        };

        let compliance_rate = if services.is_empty() {
            "N/A".to_string()
        } else {
            format!("{:.1}%", compliant_count as f64 / services.len() as f64 * 100.0)
        };

        AgentReport {
            run_timestamp: Utc::now(),
            summary: ReportSummary {
                total_services: services.len(),
                compliant_count,
                non_compliant_count: verdicts.len() - compliant_count,
                compliance_rate,
                pipelines_triggered: count(RemediationStatus::Triggered),
                pipelines_failed: count(RemediationStatus::Failed),
                dry_run,
            },
            services: services.iter().map(|s| s.to_flat_map()).collect(),
            compliance_results: verdicts.iter().map(VerdictRow::from).collect(),
            pipeline_results: pipelines.to_vec(),
        }
    }

    fn prepare_path(&self, filename: String) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(filename))
    }

    /// Write `report_YYYYMMDD_HHMMSS.json`
    pub fn save_json(&self, report: &AgentReport) -> Result<PathBuf> {
        let path = self.prepare_path(format!("report_{}.json", report.file_stamp()))?;
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        info!("JSON report: {}", path.display());
        Ok(path)
    }

    /// Write `compliance_YYYYMMDD_HHMMSS.csv`; header only when nothing was checked
    pub fn save_csv(&self, report: &AgentReport) -> Result<PathBuf> {
        let path = self.prepare_path(format!("compliance_{}.csv", report.file_stamp()))?;

        let mut contents = CSV_HEADER.join(",");
        contents.push('\n');
        for row in &report.compliance_results {
            let line: Vec<String> = row.csv_fields().iter().map(|f| csv_escape(f)).collect();
            contents.push_str(&line.join(","));
            contents.push('\n');
        }

        fs::write(&path, contents)?;
        info!("CSV report: {}", path.display());
        Ok(path)
    }

    /// Console summary of a report
    pub fn render_summary(report: &AgentReport) -> String {
        let rule = "=".repeat(50);
        let thin = "-".repeat(50);
        let s = &report.summary;

        let mut lines = vec![
            String::new(),
            rule.clone(),
            "BASE IMAGE AGENT REPORT".to_string(),
            rule.clone(),
            format!("Timestamp: {}", report.run_timestamp.to_rfc3339()),
            format!("Dry Run: {}", s.dry_run),
            thin.clone(),
            format!("Total: {}", s.total_services),
            format!("Compliant: {} ({})", s.compliant_count, s.compliance_rate),
            format!("Non-compliant: {}", s.non_compliant_count),
            thin,
            format!("Pipelines Triggered: {}", s.pipelines_triggered),
            format!("Pipelines Failed: {}", s.pipelines_failed),
            rule,
        ];

        if s.non_compliant_count > 0 {
            lines.push(String::new());
            lines.push("NON-COMPLIANT:".to_string());
            for row in report.non_compliant() {
                lines.push(format!(
                    "  - {}: {} -> {}",
                    row.service_name, row.current_tag, row.latest_tag
                ));
            }
        }

        lines.join("\n")
    }

    pub fn print_summary(report: &AgentReport) {
        println!("{}", Self::render_summary(report));
    }
}
