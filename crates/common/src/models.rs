//! Data model shared across discovery, compliance and remediation

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Deployment platform a service was observed on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    /// AWS ECS
    Aws,
    /// OpenShift (OSE / BCP / APaaS)
    Ose,
    /// No platform could be inferred
    Unknown,
    /// Explicit label that is neither AWS nor OSE, kept verbatim (lower-cased)
    Other(String),
}

impl Platform {
    /// Labels that all mean the OpenShift platform
    const OSE_ALIASES: [&'static str; 3] = ["bcp", "apaas", "openshift"];

    /// Canonicalize an explicit platform label
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        if Self::OSE_ALIASES.contains(&lower.as_str()) {
            return Platform::Ose;
        }
        match lower.as_str() {
            "aws" => Platform::Aws,
            "ose" => Platform::Ose,
            "unknown" | "" => Platform::Unknown,
            _ => Platform::Other(lower),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Aws => "aws",
            Platform::Ose => "ose",
            Platform::Unknown => "unknown",
            Platform::Other(label) => label,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One observed deploy event, extracted from telemetry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCandidate {
    pub service_name: String,

    pub profile_name: String,

    /// Source repository identifier (GitLab project path)
    pub project_path: String,

    pub platform: Platform,

    pub region: String,

    /// Base image family, e.g. "rhel8-java21"
    pub image_type: String,

    pub app_image_version: String,

    /// Base image tag currently running
    pub base_image_version: String,

    pub environment: String,

    /// Every attribute not mapped to one of the fields above
    pub metadata: BTreeMap<String, String>,

    /// Span end time, opaque nanosecond string
    pub deploy_timestamp: Option<String>,
}

impl ServiceCandidate {
    /// Name used for live platform lookups
    pub fn deployment_name(&self) -> &str {
        if self.profile_name.is_empty() {
            &self.service_name
        } else {
            &self.profile_name
        }
    }

    /// Flat table row: record fields followed by metadata (metadata wins on collision)
    pub fn to_flat_map(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::Value;

        let mut row = serde_json::Map::new();
        row.insert("service_name".into(), Value::from(self.service_name.as_str()));
        row.insert("profile_name".into(), Value::from(self.profile_name.as_str()));
        row.insert("project_path".into(), Value::from(self.project_path.as_str()));
        row.insert("platform".into(), Value::from(self.platform.as_str()));
        row.insert("region".into(), Value::from(self.region.as_str()));
        row.insert("image_type".into(), Value::from(self.image_type.as_str()));
        row.insert(
            "app_image_version".into(),
            Value::from(self.app_image_version.as_str()),
        );
        row.insert(
            "base_image_version".into(),
            Value::from(self.base_image_version.as_str()),
        );
        row.insert("environment".into(), Value::from(self.environment.as_str()));
        row.insert(
            "deploy_timestamp".into(),
            self.deploy_timestamp
                .as_deref()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        for (key, value) in &self.metadata {
            row.insert(key.clone(), Value::from(value.as_str()));
        }
        row
    }
}

/// Compliance outcome for a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    /// The service could not be verified
    Unknown,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::NonCompliant => "non_compliant",
            ComplianceStatus::Unknown => "unknown",
        }
    }
}

/// Result of comparing one candidate's running tag to the authoritative latest tag
#[derive(Debug, Clone)]
pub struct ComplianceVerdict {
    pub candidate: Arc<ServiceCandidate>,
    pub is_compliant: bool,
    pub current_tag: String,
    pub latest_tag: String,
    /// Versions behind latest, `None` when undeterminable
    pub tag_age: Option<u64>,
    pub status: ComplianceStatus,
    pub remediation_required: bool,
}

impl ComplianceVerdict {
    /// Verdict for a candidate whose tag was compared against `latest_tag`
    pub fn evaluated(
        candidate: Arc<ServiceCandidate>,
        latest_tag: String,
        is_compliant: bool,
        tag_age: Option<u64>,
    ) -> Self {
        let status = if is_compliant {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        };
        Self {
            current_tag: candidate.base_image_version.clone(),
            candidate,
            is_compliant,
            latest_tag,
            tag_age,
            status,
            remediation_required: !is_compliant,
        }
    }

    /// Verdict for a candidate that could not be checked; never remediated
    pub fn unverifiable(candidate: Arc<ServiceCandidate>, latest_tag: &str) -> Self {
        Self {
            current_tag: candidate.base_image_version.clone(),
            candidate,
            is_compliant: false,
            latest_tag: latest_tag.to_string(),
            tag_age: None,
            status: ComplianceStatus::Unknown,
            remediation_required: false,
        }
    }

    /// "N" when current, "N-3" when three versions behind
    pub fn tag_age_label(&self) -> String {
        match self.tag_age {
            Some(age) if age > 0 => format!("N-{}", age),
            _ => "N".to_string(),
        }
    }
}

/// One entry in an image's published version history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagInfo {
    pub tag: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,

    /// True only for the newest entry of a sorted history
    pub is_latest: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_age: Option<String>,
}

impl TagInfo {
    pub fn new(tag: impl Into<String>, release_date: Option<DateTime<Utc>>) -> Self {
        Self {
            tag: tag.into(),
            release_date,
            is_latest: false,
            image_age: None,
        }
    }
}

/// A pipeline run requested for a non-compliant service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationRequest {
    pub service_name: String,
    pub project_path: String,
    pub git_ref: String,
    pub variables: BTreeMap<String, String>,
}

/// Lifecycle of a remediation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    Pending,
    Triggered,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Outcome of one pipeline trigger or status query
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub service_name: String,
    pub project_path: String,
    pub pipeline_id: Option<u64>,
    pub pipeline_url: Option<String>,
    pub status: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub remediation_status: RemediationStatus,
}

impl PipelineResult {
    /// Create a pending result
    pub fn new(service_name: impl Into<String>, project_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            project_path: project_path.into(),
            pipeline_id: None,
            pipeline_url: None,
            status: None,
            triggered_at: None,
            error: None,
            remediation_status: RemediationStatus::Pending,
        }
    }

    /// Mark as triggered
    pub fn mark_triggered(
        mut self,
        pipeline_id: Option<u64>,
        url: Option<String>,
        status: Option<String>,
    ) -> Self {
        self.pipeline_id = pipeline_id;
        self.pipeline_url = url;
        self.status = status;
        self.triggered_at = Some(Utc::now());
        self.remediation_status = RemediationStatus::Triggered;
        self
    }

    /// Mark as skipped with a status label
    pub fn mark_skipped(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self.triggered_at = Some(Utc::now());
        self.remediation_status = RemediationStatus::Skipped;
        self
    }

    /// Mark as failed
    pub fn mark_failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.remediation_status = RemediationStatus::Failed;
        self
    }
}
