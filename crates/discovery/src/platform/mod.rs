//! Live platform discovery collaborators
//!
//! Each platform exposes the same capability: connect, then look a deployment
//! up by name within a namespace (OpenShift) or cluster (ECS). Platforms
//! without credentials or endpoints in the current environment are wired to
//! [`UnavailableDiscovery`] when the agent is assembled.

pub mod aws;
pub mod ose;
mod sigv4;

use agent_common::DiscoveryError;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use aws::AwsDiscovery;
pub use ose::OseDiscovery;

/// A deployment confirmed to exist on a live platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveDeployment {
    pub name: String,

    /// e.g. "Deployment", "DeploymentConfig", "EcsService"
    pub kind: String,

    /// Namespace or cluster the deployment was found in
    pub scope: String,

    pub image: Option<String>,

    pub image_type: Option<String>,

    pub base_image_version: Option<String>,

    pub labels: BTreeMap<String, String>,
}

/// Existence lookup against one deployment platform
#[async_trait]
pub trait PlatformDiscovery: Send + Sync {
    /// Platform label used in logs
    fn name(&self) -> &'static str;

    /// Establish a session; `region` is ignored by platforms without regions
    async fn connect(&self, region: &str) -> Result<(), DiscoveryError>;

    /// Look a deployment up; `Ok(None)` means it does not exist
    async fn find(&self, name: &str, scope: &str) -> Result<Option<LiveDeployment>, DiscoveryError>;
}

/// Stand-in for a platform that is not configured in this environment
pub struct UnavailableDiscovery {
    platform: &'static str,
}

impl UnavailableDiscovery {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PlatformDiscovery for UnavailableDiscovery {
    fn name(&self) -> &'static str {
        self.platform
    }

    async fn connect(&self, _region: &str) -> Result<(), DiscoveryError> {
        Err(DiscoveryError::Unavailable(self.platform.to_string()))
    }

    async fn find(
        &self,
        _name: &str,
        _scope: &str,
    ) -> Result<Option<LiveDeployment>, DiscoveryError> {
        Err(DiscoveryError::Unavailable(self.platform.to_string()))
    }
}

/// Image path segment naming the base image family, tag stripped
///
/// `registry/apaas/rhel8-java21:8.10-1` gives `rhel8-java21`.
pub fn image_type_from_image(image: &str) -> Option<String> {
    image
        .split('/')
        .find(|part| {
            let lower = part.to_lowercase();
            lower.contains("rhel") || lower.contains("java")
        })
        .map(|part| part.split(':').next().unwrap_or(part).to_string())
}

/// First `major.minor-build` sequence in the image tag
///
/// `app:1.4.2-rhel8-8.10-1766090767` gives `8.10-1766090767`.
pub fn base_version_from_image(image: &str) -> Option<String> {
    let (_, tag) = image.rsplit_once(':')?;
    let bytes = tag.as_bytes();

    let digits_at = |start: usize| {
        bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut start = 0;
    while start < bytes.len() {
        if start > 0 && bytes[start - 1].is_ascii_digit() {
            start += 1;
            continue;
        }
        let major = digits_at(start);
        if major > 0 {
            let dot = start + major;
            if bytes.get(dot) == Some(&b'.') {
                let minor = digits_at(dot + 1);
                let dash = dot + 1 + minor;
                if minor > 0 && bytes.get(dash) == Some(&b'-') {
                    let build = digits_at(dash + 1);
                    if build > 0 {
                        return Some(tag[start..dash + 1 + build].to_string());
                    }
                }
            }
        }
        start += 1;
    }
    None
}
