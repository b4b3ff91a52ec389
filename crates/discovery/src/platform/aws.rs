//! AWS ECS discovery
//!
//! Credentials come from the credential portal (role ARN exchange) or from
//! statically configured keys. Service lookups call ECS `DescribeServices`.

use super::sigv4::{self, Credentials};
use super::{LiveDeployment, PlatformDiscovery};
use agent_common::config::AwsConfig;
use agent_common::DiscoveryError;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

const ECS_TARGET: &str = "AmazonEC2ContainerServiceV20141113.DescribeServices";
const ECS_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Credential portal response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PortalCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

#[derive(Debug, Clone)]
struct Session {
    credentials: Credentials,
    region: String,
}

/// Client for ECS service lookups
pub struct AwsDiscovery {
    config: AwsConfig,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

impl AwsDiscovery {
    /// Create a new ECS discovery client, routed through the configured proxy
    pub fn new(config: &AwsConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if !config.proxy_url.is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(&config.proxy_url)?);
        }

        Ok(Self {
            config: config.clone(),
            http: builder.build()?,
            session: RwLock::new(None),
        })
    }

    fn endpoint(&self, region: &str) -> String {
        match &self.config.ecs_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://ecs.{}.amazonaws.com", region),
        }
    }

    /// Exchange the role ARN for temporary credentials
    async fn portal_credentials(&self, role_arn: &str) -> Result<Credentials, DiscoveryError> {
        debug!("Requesting credentials for {} from portal", role_arn);

        let response = self
            .http
            .post(&self.config.portal_url)
            .json(&json!({ "role_arn": role_arn }))
            .send()
            .await
            .map_err(|e| DiscoveryError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                status: response.status().as_u16(),
                url: self.config.portal_url.clone(),
            });
        }

        let creds: PortalCredentials = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Malformed(format!("portal credentials: {}", e)))?;

        Ok(Credentials {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.session_token,
        })
    }

    fn static_credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            access_key_id: self.config.access_key_id.clone()?,
            secret_access_key: self.config.secret_access_key.clone()?,
            session_token: self.config.session_token.clone(),
        })
    }

    fn current_session(&self) -> Result<Session, DiscoveryError> {
        self.session
            .read()
            .map_err(|_| DiscoveryError::Connect("session lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| DiscoveryError::NotConnected("AWS".to_string()))
    }
}

#[async_trait]
impl PlatformDiscovery for AwsDiscovery {
    fn name(&self) -> &'static str {
        "aws"
    }

    async fn connect(&self, region: &str) -> Result<(), DiscoveryError> {
        let credentials = match &self.config.role_arn {
            Some(role_arn) if !self.config.portal_url.is_empty() => {
                self.portal_credentials(role_arn).await?
            }
            _ => self
                .static_credentials()
                .ok_or_else(|| DiscoveryError::Unavailable("AWS".to_string()))?,
        };

        info!("AWS session established for region {}", region);
        let mut session = self
            .session
            .write()
            .map_err(|_| DiscoveryError::Connect("session lock poisoned".to_string()))?;
        *session = Some(Session {
            credentials,
            region: region.to_string(),
        });
        Ok(())
    }

    async fn find(
        &self,
        service: &str,
        cluster: &str,
    ) -> Result<Option<LiveDeployment>, DiscoveryError> {
        let session = self.current_session()?;
        let endpoint = self.endpoint(&session.region);
        let host = reqwest::Url::parse(&endpoint)
            .ok()
            .and_then(|url| {
                url.host_str().map(|h| match url.port() {
                    Some(port) => format!("{}:{}", h, port),
                    None => h.to_string(),
                })
            })
            .ok_or_else(|| DiscoveryError::Connect(format!("invalid ECS endpoint {}", endpoint)))?;

        let body = serde_json::to_vec(&json!({ "cluster": cluster, "services": [service] }))
            .map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

        let headers = sigv4::sign_post(
            &session.credentials,
            &session.region,
            "ecs",
            &host,
            &[("content-type", ECS_CONTENT_TYPE), ("x-amz-target", ECS_TARGET)],
            &body,
            Utc::now(),
        )?;

        debug!("DescribeServices {} in cluster {} ({})", service, cluster, endpoint);

        let mut request = self.http.post(format!("{}/", endpoint)).body(body);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiscoveryError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                status: response.status().as_u16(),
                url: endpoint,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Malformed(format!("DescribeServices: {}", e)))?;

        let services = body
            .get("services")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DiscoveryError::Malformed("DescribeServices: no services array".to_string())
            })?;

        // Deleted services are still described, with status INACTIVE
        let active = services.iter().find(|s| {
            s.get("status").and_then(Value::as_str) != Some("INACTIVE")
        });

        Ok(active.map(|s| LiveDeployment {
            name: s
                .get("serviceName")
                .and_then(Value::as_str)
                .unwrap_or(service)
                .to_string(),
            kind: "EcsService".to_string(),
            scope: cluster.to_string(),
            ..LiveDeployment::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn static_config(server: &MockServer) -> AwsConfig {
        AwsConfig {
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            secret_access_key: Some("secret".to_string()),
            ecs_endpoint: Some(server.base_url()),
            ..AwsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_find_active_service() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .header("x-amz-target", ECS_TARGET)
                .header_exists("authorization")
                .json_body(json!({ "cluster": "core", "services": ["payments"] }));
            then.status(200).json_body(json!({
                "services": [{ "serviceName": "payments", "status": "ACTIVE" }],
                "failures": []
            }));
        });

        let aws = AwsDiscovery::new(&static_config(&server)).unwrap();
        aws.connect("eu-west-2").await.unwrap();
        let found = aws.find("payments", "core").await.unwrap().unwrap();

        mock.assert();
        assert_eq!(found.name, "payments");
        assert_eq!(found.scope, "core");
    }

    #[tokio::test]
    async fn test_missing_or_inactive_service() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({
                "services": [{ "serviceName": "old", "status": "INACTIVE" }],
                "failures": [{ "arn": "ghost", "reason": "MISSING" }]
            }));
        });

        let aws = AwsDiscovery::new(&static_config(&server)).unwrap();
        aws.connect("eu-west-2").await.unwrap();
        assert!(aws.find("old", "core").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_portal_credentials() {
        let server = MockServer::start();
        let portal = server.mock(|when, then| {
            when.method(POST)
                .path("/creds")
                .json_body(json!({ "role_arn": "arn:aws:iam::1:role/audit" }));
            then.status(200).json_body(json!({
                "AccessKeyId": "ASIA",
                "SecretAccessKey": "s3cr3t",
                "SessionToken": "tok"
            }));
        });

        let aws = AwsDiscovery::new(&AwsConfig {
            portal_url: server.url("/creds"),
            role_arn: Some("arn:aws:iam::1:role/audit".to_string()),
            ..AwsConfig::default()
        })
        .unwrap();

        aws.connect("us-east-1").await.unwrap();
        portal.assert();
    }

    #[tokio::test]
    async fn test_portal_rejection_is_typed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/creds");
            then.status(403);
        });

        let aws = AwsDiscovery::new(&AwsConfig {
            portal_url: server.url("/creds"),
            role_arn: Some("arn".to_string()),
            ..AwsConfig::default()
        })
        .unwrap();

        assert!(matches!(
            aws.connect("us-east-1").await,
            Err(DiscoveryError::Status { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_no_credentials_is_unavailable() {
        let aws = AwsDiscovery::new(&AwsConfig::default()).unwrap();
        assert!(matches!(
            aws.connect("eu-west-2").await,
            Err(DiscoveryError::Unavailable(_))
        ));
        assert!(matches!(
            aws.find("svc", "default").await,
            Err(DiscoveryError::NotConnected(_))
        ));
    }
}
