use agent_common::config::{ComplianceConfig, DiscoveryConfig, TagStrategy};
use agent_common::{
    CatalogError, ComplianceStatus, DiscoveryError, Error, PipelineResult, RemediationRequest,
    RemediationStatus, TagInfo,
};
use async_trait::async_trait;
use base_image_agent::{BaseImageAgent, ReportGenerator};
use compliance::{Catalog, ComplianceResolver};
use discovery::{
    LiveDeployment, PlatformDiscovery, PlatformReconciler, TelemetryExtractor, UnavailableDiscovery,
};
use remediation::{PipelineBackend, PipelineTrigger};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

type CallLog = Arc<Mutex<Vec<String>>>;

struct FakeDiscovery {
    live: Vec<&'static str>,
    calls: CallLog,
}

#[async_trait]
impl PlatformDiscovery for FakeDiscovery {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self, _region: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn find(
        &self,
        name: &str,
        _scope: &str,
    ) -> Result<Option<LiveDeployment>, DiscoveryError> {
        self.calls.lock().unwrap().push(format!("find:{}", name));
        Ok(self.live.iter().any(|live| *live == name).then(LiveDeployment::default))
    }
}

struct FakeCatalog {
    tags: Vec<&'static str>,
    calls: CallLog,
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn version_history(&self, image: &str) -> Result<Vec<TagInfo>, CatalogError> {
        self.calls.lock().unwrap().push(format!("catalog:{}", image));
        Ok(self.tags.iter().map(|t| TagInfo::new(*t, None)).collect())
    }
}

#[derive(Default)]
struct RecordingBackend {
    requests: Arc<Mutex<Vec<RemediationRequest>>>,
}

#[async_trait]
impl PipelineBackend for RecordingBackend {
    async fn trigger_pipeline(&self, request: &RemediationRequest) -> PipelineResult {
        self.requests.lock().unwrap().push(request.clone());
        PipelineResult::new(&request.service_name, &request.project_path)
            .mark_triggered(Some(1), None, Some("created".to_string()))
    }

    async fn pipeline_status(&self, project_path: &str, pipeline_id: u64) -> PipelineResult {
        let mut result = PipelineResult::new("", project_path);
        result.pipeline_id = Some(pipeline_id);
        result
    }
}

struct Harness {
    agent: BaseImageAgent,
    calls: CallLog,
    requests: Arc<Mutex<Vec<RemediationRequest>>>,
}

fn harness(output: &Path, live: Vec<&'static str>, tags: Vec<&'static str>) -> Harness {
    let calls = CallLog::default();
    let backend = RecordingBackend::default();
    let requests = backend.requests.clone();

    let reconciler = if live.is_empty() {
        PlatformReconciler::new(
            Box::new(UnavailableDiscovery::new("ose")),
            Box::new(UnavailableDiscovery::new("aws")),
            "default",
        )
    } else {
        PlatformReconciler::new(
            Box::new(FakeDiscovery {
                live: live.clone(),
                calls: calls.clone(),
            }),
            Box::new(FakeDiscovery {
                live,
                calls: calls.clone(),
            }),
            "default",
        )
    };

    let compliance = ComplianceConfig {
        catalog_api_url: "http://catalog.invalid".to_string(),
        default_tag: None,
        tag_strategy: TagStrategy::PerImage,
        run_wide_image_type: "rhel8.java8".to_string(),
        image_map: BTreeMap::new(),
        catalog_timeout_secs: 10,
    };
    let resolver = ComplianceResolver::new(
        Box::new(FakeCatalog {
            tags,
            calls: calls.clone(),
        }),
        &compliance,
    );

    let agent = BaseImageAgent::new(
        TelemetryExtractor::new(&DiscoveryConfig {
            target_platform: "all".to_string(),
            target_image_type: None,
        }),
        reconciler,
        resolver,
        PipelineTrigger::new(Box::new(backend), "main"),
        ReportGenerator::new(output),
        false,
    );

    Harness {
        agent,
        calls,
        requests,
    }
}

fn attr(key: &str, value: &str) -> Value {
    json!({ "key": key, "value": { "stringValue": value } })
}

fn deploy_span(service: &str, base: &str, extra: Vec<Value>) -> Value {
    let mut attributes = vec![
        attr("job_name", "deploy-prod"),
        attr("job_status", "success"),
        attr("service.name", service),
        attr("profile.name", &format!("{}-prod", service)),
        attr("project_path", &format!("retail/{}", service)),
        attr("region.deployed", "aws-uk"),
        attr("image.details", "rhel8-java21"),
        attr("base.image.version", base),
    ];
    attributes.extend(extra);
    json!({ "attributes": attributes })
}

fn document(spans: Vec<Value>) -> Value {
    json!({ "resourceSpans": [{ "scopeSpans": [{ "spans": spans }] }] })
}

#[tokio::test]
async fn test_outdated_service_triggers_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), vec!["payments-prod"], vec!["8.10-2", "8.10-1"]);

    let run = h
        .agent
        .run(&document(vec![deploy_span("payments", "8.5-1", vec![])]))
        .await
        .unwrap()
        .expect("run produces a report");

    let row = &run.report.compliance_results[0];
    assert!(!row.is_compliant);
    assert_eq!(row.status, ComplianceStatus::NonCompliant);
    assert_eq!(row.latest_tag, "8.10-2");
    assert_eq!(run.confirmed, 1);

    let requests = h.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].project_path, "retail/payments");
    assert_eq!(requests[0].variables["TARGET_TAG"], "8.10-2");
    assert_eq!(requests[0].variables["BASE_IMAGE_UPGRADE"], "true");

    assert_eq!(run.report.pipeline_results[0].remediation_status, RemediationStatus::Triggered);
    assert_eq!(run.report.summary.pipelines_triggered, 1);
    assert!(run.json_path.exists());
    assert!(run.csv_path.exists());
}

#[tokio::test]
async fn test_only_confirmed_services_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), vec!["payments-prod"], vec!["8.10-2"]);

    let run = h
        .agent
        .run(&document(vec![
            deploy_span("payments", "8.10-2", vec![]),
            deploy_span("ghost", "8.5-1", vec![]),
        ]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(run.report.summary.total_services, 1);
    assert_eq!(run.report.compliance_results[0].service_name, "payments");
    assert_eq!(run.report.summary.compliance_rate, "100.0%");
    assert!(h.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfirmed_run_falls_back_to_all_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), vec![], vec!["8.10-2"]);

    let run = h
        .agent
        .run(&document(vec![
            deploy_span("payments", "8.5-1", vec![]),
            deploy_span("ledger", "8.10-2", vec![]),
        ]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(run.confirmed, 0);
    assert_eq!(run.report.summary.total_services, 2);
    assert_eq!(run.report.summary.non_compliant_count, 1);
    assert_eq!(h.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_candidate_aborts_before_network() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), vec!["payments-prod"], vec!["8.10-2"]);

    let mut span = deploy_span("payments", "8.5-1", vec![]);
    span["attributes"]
        .as_array_mut()
        .unwrap()
        .retain(|a| a["key"] != "project_path");

    let result = h.agent.run(&document(vec![span])).await;

    match result {
        Err(Error::Validation { reasons }) => {
            assert!(reasons.iter().any(|r| r.contains("project_path")));
        }
        other => panic!("expected validation failure, got {:?}", other.map(|r| r.is_some())),
    }
    assert!(h.calls.lock().unwrap().is_empty());
    assert!(h.requests.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_empty_telemetry_produces_no_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), vec!["payments-prod"], vec!["8.10-2"]);

    let failed_build = json!({
        "attributes": [attr("job_name", "build"), attr("job_status", "success")]
    });
    let result = h.agent.run(&document(vec![failed_build])).await.unwrap();

    assert!(result.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_run_file_reads_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.json");
    std::fs::write(
        &input,
        document(vec![deploy_span("payments", "8.10-2", vec![])]).to_string(),
    )
    .unwrap();

    let out = dir.path().join("out");
    let mut h = harness(&out, vec!["payments-prod"], vec!["8.10-2"]);
    let run = h.agent.run_file(&input).await.unwrap().unwrap();

    assert!(run.report.compliance_results[0].is_compliant);
    assert!(run.json_path.starts_with(&out));
}
