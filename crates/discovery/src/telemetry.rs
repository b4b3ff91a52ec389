//! Telemetry export parsing
//!
//! Extracts deploy events from an OTLP-style JSON export
//! (`resourceSpans[].scopeSpans[].spans[]`). Missing or mistyped nested
//! collections are treated as empty rather than rejected.

use agent_common::config::DiscoveryConfig;
use agent_common::{Error, Platform, Result, ServiceCandidate};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const JOB_NAME: &[&str] = &["job_name", "ci_job_name"];
const JOB_STATUS: &[&str] = &["job_status", "ci_job_status"];
const PLATFORM: &[&str] = &["target_deployment", "platform"];
const SERVICE_NAME: &[&str] = &["service.name", "service_name"];
const PROFILE_NAME: &[&str] = &["profile.name", "profile_name"];
const PROJECT_PATH: &[&str] = &["project_path", "ci_project_path"];
const REGION: &[&str] = &["region.deployed", "region"];
const IMAGE_TYPE: &[&str] = &["image.details", "image_details", "base_image"];
const APP_VERSION: &[&str] = &["app.image.version", "app_image_version"];
const BASE_VERSION: &[&str] = &["base.image.version", "base_image_version"];
const ENVIRONMENT: &[&str] = &["app.image.environment", "environment"];

/// Placeholder service name when telemetry carries none
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Flattened span attributes, in first-seen key order
///
/// Re-inserting an existing key replaces its value in place.
#[derive(Debug, Default, Clone)]
struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    fn from_otlp(attributes: Option<&Value>) -> Self {
        let mut attrs = Self::default();
        attrs.merge_otlp(attributes);
        attrs
    }

    fn merge_otlp(&mut self, attributes: Option<&Value>) {
        for attr in array(attributes) {
            let key = attr.get("key").and_then(Value::as_str).unwrap_or_default();
            if let Some(value) = attr.get("value").and_then(normalize_value) {
                self.insert(key, value);
            }
        }
    }

    fn insert(&mut self, key: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Look a logical field up by alias
    ///
    /// Exact key matches are tried first, in alias priority order; then the
    /// first key containing an alias as a substring. Returns the matched key
    /// and its value.
    fn find(&self, aliases: &[&str]) -> Option<(&str, &str)> {
        let exact = aliases.iter().find_map(|alias| {
            self.entries.iter().find(|(k, _)| k == alias)
        });
        let fuzzy = || {
            aliases.iter().find_map(|alias| {
                self.entries.iter().find(|(k, _)| k.contains(alias))
            })
        };
        exact
            .or_else(fuzzy)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Normalize an OTLP `AnyValue` to its string form
fn normalize_value(value: &Value) -> Option<String> {
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(v) = value.get("intValue") {
        // OTLP JSON encodes 64-bit integers as strings
        return Some(match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    if let Some(b) = value.get("boolValue").and_then(Value::as_bool) {
        return Some(b.to_string());
    }
    if let Some(d) = value.get("doubleValue") {
        return Some(match d {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    None
}

fn array(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Extractor for deploy events in a telemetry export
pub struct TelemetryExtractor {
    /// Canonical platform to keep; `None` keeps every platform
    target_platform: Option<Platform>,

    target_image_type: Option<String>,
}

impl TelemetryExtractor {
    /// Create a new extractor
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            target_platform: Some(config.target_platform.to_lowercase())
                .filter(|target| target != "all")
                .map(|target| Platform::from_label(&target)),
            target_image_type: config.target_image_type.clone(),
        }
    }

    /// Read a telemetry document from disk
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Value> {
        let path = path.as_ref();
        info!("Loading telemetry export from: {}", path.display());

        let contents = std::fs::read_to_string(path)?;
        Self::load_str(&contents)
    }

    /// Parse a telemetry document from a string
    pub fn load_str(contents: &str) -> Result<Value> {
        serde_json::from_str(contents)
            .map_err(|e| Error::Telemetry(format!("invalid telemetry JSON: {}", e)))
    }

    /// Extract service candidates, in document order
    pub fn extract(&self, document: &Value) -> Vec<ServiceCandidate> {
        let mut candidates = Vec::new();

        for resource_span in array(document.get("resourceSpans")) {
            let resource_attrs = Attributes::from_otlp(
                resource_span
                    .get("resource")
                    .and_then(|r| r.get("attributes")),
            );

            for scope_span in array(resource_span.get("scopeSpans")) {
                for span in array(scope_span.get("spans")) {
                    if let Some(candidate) = self.process_span(span, &resource_attrs) {
                        candidates.push(candidate);
                    }
                }
            }
        }

        info!("Discovered {} candidate services", candidates.len());
        candidates
    }

    /// Turn one span into a candidate if it passes the inclusion filters
    fn process_span(&self, span: &Value, resource_attrs: &Attributes) -> Option<ServiceCandidate> {
        let mut attrs = resource_attrs.clone();
        attrs.merge_otlp(span.get("attributes"));

        let job_name = attrs.find(JOB_NAME).map(|(_, v)| v).unwrap_or_default();
        let job_status = attrs.find(JOB_STATUS).map(|(_, v)| v).unwrap_or_default();

        if !job_name.to_lowercase().contains("deploy") || job_status != "success" {
            debug!("Skipping span: job={:?} status={:?}", job_name, job_status);
            return None;
        }

        let (platform, platform_key) = resolve_platform(&attrs);
        if self.target_platform.as_ref().is_some_and(|target| *target != platform) {
            debug!("Skipping span on platform {}", platform);
            return None;
        }

        let mut consumed: Vec<&str> = platform_key.into_iter().collect();
        let mut field = |aliases: &[&str], default: &str| -> String {
            match attrs.find(aliases) {
                Some((key, value)) => {
                    consumed.push(key);
                    value.to_string()
                }
                None => default.to_string(),
            }
        };

        let service_name = field(SERVICE_NAME, UNKNOWN_SERVICE);
        let profile_name = field(PROFILE_NAME, "");
        let project_path = field(PROJECT_PATH, "");
        let region = field(REGION, "");
        let image_type = field(IMAGE_TYPE, "");
        let app_image_version = field(APP_VERSION, "");
        let base_image_version = field(BASE_VERSION, "");
        let environment = field(ENVIRONMENT, "");

        if let Some(target) = &self.target_image_type {
            if !image_type.contains(target.as_str()) {
                debug!("Skipping {}: image type {:?} not {}", service_name, image_type, target);
                return None;
            }
        }

        let metadata: BTreeMap<String, String> = attrs
            .entries
            .iter()
            .filter(|(k, _)| !consumed.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let deploy_timestamp = span.get("endTimeUnixNano").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        info!(
            "Found: {} | {} | base={}",
            service_name, platform, base_image_version
        );

        Some(ServiceCandidate {
            service_name,
            profile_name,
            project_path,
            platform,
            region,
            image_type,
            app_image_version,
            base_image_version,
            environment,
            metadata,
            deploy_timestamp,
        })
    }
}

/// Resolve the deployment platform and the attribute key it came from
fn resolve_platform(attrs: &Attributes) -> (Platform, Option<&str>) {
    if let Some((key, label)) = attrs.find(PLATFORM).filter(|(_, v)| !v.is_empty()) {
        return (Platform::from_label(label), Some(key));
    }

    let region = attrs
        .find(REGION)
        .map(|(_, v)| v.to_lowercase())
        .unwrap_or_default();

    let platform = if region.contains("aws") {
        Platform::Aws
    } else if region.contains("bcp") || region.contains("ose") {
        Platform::Ose
    } else {
        Platform::Unknown
    };
    (platform, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor(target_platform: &str) -> TelemetryExtractor {
        TelemetryExtractor::new(&DiscoveryConfig {
            target_platform: target_platform.to_string(),
            target_image_type: None,
        })
    }

    fn attr(key: &str, value: &str) -> Value {
        json!({ "key": key, "value": { "stringValue": value } })
    }

    fn document(resource: Vec<Value>, spans: Vec<Vec<Value>>) -> Value {
        let spans: Vec<Value> = spans
            .into_iter()
            .map(|attributes| {
                json!({ "attributes": attributes, "endTimeUnixNano": "1700000000000000000" })
            })
            .collect();
        json!({
            "resourceSpans": [{
                "resource": { "attributes": resource },
                "scopeSpans": [{ "spans": spans }]
            }]
        })
    }

    fn deploy_span(extra: Vec<Value>) -> Vec<Value> {
        let mut attrs = vec![attr("job_name", "deploy-prod"), attr("job_status", "success")];
        attrs.extend(extra);
        attrs
    }

    #[test]
    fn test_extracts_candidate_with_merged_attributes() {
        let doc = document(
            vec![
                attr("service.name", "payments"),
                attr("image.details", "rhel8-java21"),
                attr("region.deployed", "aws-uk"),
            ],
            vec![deploy_span(vec![
                attr("base.image.version", "8.10-1"),
                attr("project_path", "group/payments"),
                attr("cluster", "core"),
            ])],
        );

        let candidates = extractor("all").extract(&doc);
        assert_eq!(candidates.len(), 1);

        let c = &candidates[0];
        assert_eq!(c.service_name, "payments");
        assert_eq!(c.platform, Platform::Aws);
        assert_eq!(c.image_type, "rhel8-java21");
        assert_eq!(c.base_image_version, "8.10-1");
        assert_eq!(c.project_path, "group/payments");
        assert_eq!(c.deploy_timestamp.as_deref(), Some("1700000000000000000"));
        assert_eq!(c.metadata.get("cluster").map(String::as_str), Some("core"));
        assert!(c.metadata.contains_key("job_name"));
        assert!(!c.metadata.contains_key("service.name"));
    }

    #[test]
    fn test_span_attributes_win_over_resource() {
        let doc = document(
            vec![attr("service.name", "from-resource")],
            vec![deploy_span(vec![attr("service.name", "from-span")])],
        );
        let candidates = extractor("all").extract(&doc);
        assert_eq!(candidates[0].service_name, "from-span");
    }

    #[test]
    fn test_job_status_match_is_case_sensitive() {
        let doc = document(
            vec![],
            vec![vec![attr("job_name", "deploy"), attr("job_status", "Success")]],
        );
        assert!(extractor("all").extract(&doc).is_empty());
    }

    #[test]
    fn test_job_name_match_is_case_insensitive_substring() {
        let doc = document(
            vec![],
            vec![
                vec![attr("job_name", "Deploy-UAT"), attr("job_status", "success")],
                vec![attr("job_name", "build"), attr("job_status", "success")],
            ],
        );
        let candidates = extractor("all").extract(&doc);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].service_name, UNKNOWN_SERVICE);
    }

    #[test]
    fn test_platform_resolution_order() {
        let explicit = document(
            vec![],
            vec![deploy_span(vec![attr("target_deployment", "APaaS"), attr("region", "aws-uk")])],
        );
        assert_eq!(extractor("all").extract(&explicit)[0].platform, Platform::Ose);

        let passthrough = document(vec![], vec![deploy_span(vec![attr("platform", "GCP")])]);
        assert_eq!(
            extractor("all").extract(&passthrough)[0].platform,
            Platform::Other("gcp".to_string())
        );

        let by_region = document(vec![], vec![deploy_span(vec![attr("region", "BCP-london")])]);
        assert_eq!(extractor("all").extract(&by_region)[0].platform, Platform::Ose);

        let unknown = document(vec![], vec![deploy_span(vec![attr("region", "on-prem")])]);
        assert_eq!(extractor("all").extract(&unknown)[0].platform, Platform::Unknown);
    }

    #[test]
    fn test_target_platform_filter() {
        let doc = document(
            vec![],
            vec![
                deploy_span(vec![attr("service.name", "a"), attr("region", "aws-us")]),
                deploy_span(vec![attr("service.name", "b"), attr("region", "ose-uk")]),
            ],
        );
        let aws_only = extractor("aws").extract(&doc);
        assert_eq!(aws_only.len(), 1);
        assert_eq!(aws_only[0].service_name, "a");
        assert_eq!(extractor("all").extract(&doc).len(), 2);
        assert_eq!(extractor("ALL").extract(&doc).len(), 2);
    }

    #[test]
    fn test_target_platform_aliases_are_canonicalized() {
        let doc = document(
            vec![],
            vec![
                deploy_span(vec![attr("service.name", "a"), attr("region", "aws-us")]),
                deploy_span(vec![attr("service.name", "b"), attr("region", "bcp-uk")]),
                deploy_span(vec![attr("service.name", "c"), attr("platform", "APaaS")]),
            ],
        );

        for target in ["ose", "openshift", "bcp", "apaas", "OpenShift"] {
            let ose = extractor(target).extract(&doc);
            let names: Vec<&str> = ose.iter().map(|c| c.service_name.as_str()).collect();
            assert_eq!(names, vec!["b", "c"], "target {}", target);
        }
    }

    #[test]
    fn test_alias_and_substring_fallback() {
        let doc = document(
            vec![],
            vec![deploy_span(vec![
                attr("ci_project_path", "group/legacy"),
                attr("deploy.base_image_version", "8.9-3"),
            ])],
        );
        let c = &extractor("all").extract(&doc)[0];
        assert_eq!(c.project_path, "group/legacy");
        assert_eq!(c.base_image_version, "8.9-3");
    }

    #[test]
    fn test_typed_values_are_normalized() {
        let doc = document(
            vec![],
            vec![deploy_span(vec![
                json!({ "key": "replicas", "value": { "intValue": "3" } }),
                json!({ "key": "canary", "value": { "boolValue": true } }),
                json!({ "key": "ratio", "value": { "doubleValue": 0.5 } }),
                json!({ "key": "empty", "value": {} }),
            ])],
        );
        let c = &extractor("all").extract(&doc)[0];
        assert_eq!(c.metadata["replicas"], "3");
        assert_eq!(c.metadata["canary"], "true");
        assert_eq!(c.metadata["ratio"], "0.5");
        assert!(!c.metadata.contains_key("empty"));
    }

    #[test]
    fn test_malformed_structure_is_empty() {
        let e = extractor("all");
        assert!(e.extract(&json!({})).is_empty());
        assert!(e.extract(&json!({ "resourceSpans": "nope" })).is_empty());
        assert!(e.extract(&json!({ "resourceSpans": [{ "scopeSpans": [{}] }] })).is_empty());
    }

    #[test]
    fn test_target_image_type_filter() {
        let e = TelemetryExtractor::new(&DiscoveryConfig {
            target_platform: "all".to_string(),
            target_image_type: Some("java21".to_string()),
        });
        let doc = document(
            vec![],
            vec![
                deploy_span(vec![attr("image.details", "rhel8-java21")]),
                deploy_span(vec![attr("image.details", "rhel8-java17")]),
            ],
        );
        let candidates = e.extract(&doc);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].image_type, "rhel8-java21");
    }

    #[test]
    fn test_invalid_json_is_telemetry_error() {
        let err = TelemetryExtractor::load_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Telemetry(_)));
    }
}
