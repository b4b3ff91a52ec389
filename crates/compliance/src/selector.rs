//! Remediation selection

use agent_common::{ComplianceVerdict, RemediationRequest};
use std::collections::BTreeMap;

pub const BASE_IMAGE_UPGRADE: &str = "BASE_IMAGE_UPGRADE";
pub const TARGET_TAG: &str = "TARGET_TAG";

/// Verdicts that require remediation, in input order
///
/// Duplicates are passed through unchanged.
pub fn select_for_remediation(verdicts: &[ComplianceVerdict]) -> Vec<&ComplianceVerdict> {
    verdicts.iter().filter(|v| v.remediation_required).collect()
}

/// Pipeline request for a selected verdict
///
/// `extra` variables are sent too, but cannot override the upgrade flag or
/// the target tag.
pub fn remediation_request(
    verdict: &ComplianceVerdict,
    git_ref: &str,
    extra: &BTreeMap<String, String>,
) -> RemediationRequest {
    let mut variables = extra.clone();
    variables.insert(BASE_IMAGE_UPGRADE.to_string(), "true".to_string());
    variables.insert(TARGET_TAG.to_string(), verdict.latest_tag.clone());

    RemediationRequest {
        service_name: verdict.candidate.service_name.clone(),
        project_path: verdict.candidate.project_path.clone(),
        git_ref: git_ref.to_string(),
        variables,
    }
}
