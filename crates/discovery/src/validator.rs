//! Required-field validation for service candidates
//!
//! Every candidate must carry the attributes needed for platform and catalog
//! lookups. A single invalid candidate fails the whole run before any network
//! call is made.

use crate::telemetry::UNKNOWN_SERVICE;
use agent_common::{Error, Result, ServiceCandidate};
use tracing::error;

/// Outcome of validating one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    /// One reason per failing field, in field order
    pub reasons: Vec<String>,
}

/// Validate a single candidate
///
/// Checks for:
/// - Non-empty image_type, region, profile_name and project_path
/// - A service_name that is present and not the extractor placeholder
pub fn validate_candidate(candidate: &ServiceCandidate) -> ValidationReport {
    let required = [
        ("image_type", &candidate.image_type),
        ("region", &candidate.region),
        ("profile_name", &candidate.profile_name),
        ("project_path", &candidate.project_path),
    ];

    let mut reasons: Vec<String> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| format!("missing required attribute '{}'", field))
        .collect();

    if candidate.service_name.trim().is_empty() {
        reasons.push("missing required attribute 'service_name'".to_string());
    } else if candidate.service_name == UNKNOWN_SERVICE {
        reasons.push(format!(
            "service_name could not be determined (got '{}')",
            UNKNOWN_SERVICE
        ));
    }

    ValidationReport {
        valid: reasons.is_empty(),
        reasons,
    }
}

/// Validate every candidate; any failure fails the run
///
/// The error carries the reasons of all failing candidates, each prefixed
/// with the service name.
pub fn validate_all(candidates: &[ServiceCandidate]) -> Result<()> {
    let mut reasons = Vec::new();

    for candidate in candidates {
        let report = validate_candidate(candidate);
        for reason in report.reasons {
            error!("[{}] {}", candidate.service_name, reason);
            reasons.push(format!("[{}] {}", candidate.service_name, reason));
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { reasons })
    }
}
