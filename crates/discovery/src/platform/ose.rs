//! OpenShift discovery over the Kubernetes REST API

use super::{base_version_from_image, image_type_from_image, LiveDeployment, PlatformDiscovery};
use agent_common::config::OseConfig;
use agent_common::DiscoveryError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resource kinds tried in order: plain Deployments, then DeploymentConfigs
const RESOURCE_KINDS: [(&str, &str); 2] = [
    ("Deployment", "apis/apps/v1/namespaces/{ns}/deployments/{name}"),
    (
        "DeploymentConfig",
        "apis/apps.openshift.io/v1/namespaces/{ns}/deploymentconfigs/{name}",
    ),
];

#[derive(Clone)]
struct ClusterClient {
    location: String,
    base_url: String,
    http: reqwest::Client,
}

/// Client for OpenShift clusters (primary and shadow data centres)
pub struct OseDiscovery {
    endpoints: Vec<(String, String)>,
    token: Option<String>,
    clients: RwLock<Vec<ClusterClient>>,
}

impl OseDiscovery {
    /// Create a new OpenShift discovery client
    pub fn new(config: &OseConfig) -> Self {
        Self {
            endpoints: config
                .endpoints()
                .into_iter()
                .map(|(location, url)| {
                    (location.to_string(), url.trim_end_matches('/').to_string())
                })
                .collect(),
            token: config.token.clone(),
            clients: RwLock::new(Vec::new()),
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, DiscoveryError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &self.token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| DiscoveryError::Connect(format!("invalid OpenShift token: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DiscoveryError::Connect(e.to_string()))
    }

    /// First connected cluster, primary preferred
    fn active_client(&self) -> Result<ClusterClient, DiscoveryError> {
        let clients = self
            .clients
            .read()
            .map_err(|_| DiscoveryError::Connect("client registry poisoned".to_string()))?;
        clients
            .first()
            .cloned()
            .ok_or_else(|| DiscoveryError::NotConnected("OpenShift".to_string()))
    }

    async fn get_resource(
        &self,
        client: &ClusterClient,
        path: &str,
    ) -> Result<Option<Value>, DiscoveryError> {
        let url = format!("{}/{}", client.base_url, path);
        debug!("Fetching OpenShift resource ({}): {}", client.location, url);

        let response = client
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Connect(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Malformed(format!("deployment body: {}", e)))?;

        Ok(Some(body))
    }
}

/// Build a deployment record from a Deployment/DeploymentConfig body
///
/// A resource with no containers in its pod template still exists; it is
/// returned without an image.
fn deployment_from_body(kind: &str, namespace: &str, body: &Value) -> LiveDeployment {
    let image = body
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .and_then(|containers| containers.first())
        .and_then(|container| container.get("image"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let labels = body
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let name = body
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let base_image_version = body
        .pointer("/metadata/labels/BASE_IMAGE_VERSION")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| base_version_from_image(&image));

    LiveDeployment {
        name,
        kind: kind.to_string(),
        scope: namespace.to_string(),
        image_type: image_type_from_image(&image),
        base_image_version,
        image: Some(image).filter(|i| !i.is_empty()),
        labels,
    }
}

#[async_trait]
impl PlatformDiscovery for OseDiscovery {
    fn name(&self) -> &'static str {
        "ose"
    }

    async fn connect(&self, _region: &str) -> Result<(), DiscoveryError> {
        if self.endpoints.is_empty() {
            return Err(DiscoveryError::Connect(
                "no OpenShift endpoints configured".to_string(),
            ));
        }

        let mut connected = Vec::new();
        for (location, url) in &self.endpoints {
            match self.build_client() {
                Ok(http) => connected.push(ClusterClient {
                    location: location.clone(),
                    base_url: url.clone(),
                    http,
                }),
                Err(e) => warn!("Failed to create OpenShift client for {}: {}", location, e),
            }
        }

        if connected.is_empty() {
            return Err(DiscoveryError::Connect(
                "no OpenShift client could be created".to_string(),
            ));
        }

        info!("Connected to {} OpenShift cluster(s)", connected.len());
        let mut clients = self
            .clients
            .write()
            .map_err(|_| DiscoveryError::Connect("client registry poisoned".to_string()))?;
        *clients = connected;
        Ok(())
    }

    async fn find(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<LiveDeployment>, DiscoveryError> {
        let client = self.active_client()?;

        for (kind, template) in RESOURCE_KINDS {
            let path = template.replace("{ns}", namespace).replace("{name}", name);
            if let Some(body) = self.get_resource(&client, &path).await? {
                return Ok(Some(deployment_from_body(kind, namespace, &body)));
            }
        }

        Ok(None)
    }
}
