//! Live-deployment confirmation for service candidates
//!
//! Confirmation never fails: connection errors, unavailable platforms and
//! missing deployments all mean "not confirmed".

use crate::platform::{AwsDiscovery, OseDiscovery, PlatformDiscovery, UnavailableDiscovery};
use agent_common::{AgentConfig, Platform, ServiceCandidate};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_AWS_REGION: &str = "eu-west-2";
const DEFAULT_CLUSTER: &str = "default";

/// Free-text region keyword to AWS region code
const AWS_REGIONS: [(&str, &str); 4] = [
    ("uk", "eu-west-2"),
    ("us", "us-east-1"),
    ("eu", "eu-west-1"),
    ("de", "eu-central-1"),
];

/// Map a free-text region to a concrete AWS region code
///
/// A region that already is one of the mapped codes is kept. Otherwise the
/// text is split into alphanumeric words and the first word matching a
/// keyword decides; anything else maps to `eu-west-2`.
pub fn aws_region_for(region: &str) -> &'static str {
    let lower = region.trim().to_lowercase();

    if let Some((_, code)) = AWS_REGIONS.iter().find(|(_, code)| *code == lower) {
        return code;
    }

    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(|word| {
            AWS_REGIONS
                .iter()
                .find(|(keyword, _)| *keyword == word)
                .map(|(_, code)| *code)
        })
        .unwrap_or(DEFAULT_AWS_REGION)
}

/// Candidates to audit after reconciliation
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Confirmed candidates, or every candidate when none was confirmed
    pub services: Vec<Arc<ServiceCandidate>>,
    /// How many candidates were confirmed live
    pub confirmed: usize,
    /// Set when nothing was confirmed and all candidates were kept
    pub fell_back: bool,
}

/// Dispatches candidates to their platform's discovery collaborator
pub struct PlatformReconciler {
    ose: Box<dyn PlatformDiscovery>,
    aws: Box<dyn PlatformDiscovery>,
    namespace: String,
}

impl PlatformReconciler {
    pub fn new(
        ose: Box<dyn PlatformDiscovery>,
        aws: Box<dyn PlatformDiscovery>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            ose,
            aws,
            namespace: namespace.into(),
        }
    }

    /// Wire collaborators from configuration
    ///
    /// Platforms without endpoints or credentials get [`UnavailableDiscovery`].
    pub fn from_config(config: &AgentConfig) -> anyhow::Result<Self> {
        let ose: Box<dyn PlatformDiscovery> = if config.ose.endpoints().is_empty() {
            warn!("No OpenShift endpoints configured; OSE services cannot be confirmed");
            Box::new(UnavailableDiscovery::new("ose"))
        } else {
            Box::new(OseDiscovery::new(&config.ose))
        };

        let aws: Box<dyn PlatformDiscovery> = if config.aws.has_credentials() {
            Box::new(AwsDiscovery::new(&config.aws)?)
        } else {
            warn!("No AWS credentials configured; AWS services cannot be confirmed");
            Box::new(UnavailableDiscovery::new("aws"))
        };

        Ok(Self::new(ose, aws, config.ose.namespace.clone()))
    }

    /// Whether the candidate's deployment exists on its platform
    pub async fn is_live(&self, candidate: &ServiceCandidate) -> bool {
        let name = candidate.deployment_name();

        let (discovery, region, scope) = match &candidate.platform {
            Platform::Ose => (self.ose.as_ref(), "", self.namespace.as_str()),
            Platform::Aws => (
                self.aws.as_ref(),
                aws_region_for(&candidate.region),
                candidate
                    .metadata
                    .get("cluster")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_CLUSTER),
            ),
            other => {
                warn!("[{}] Unknown platform '{}'", candidate.service_name, other);
                return false;
            }
        };

        if let Err(e) = discovery.connect(region).await {
            warn!(
                "[{}] Could not connect to {}: {}",
                candidate.service_name,
                discovery.name(),
                e
            );
            return false;
        }

        match discovery.find(name, scope).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(
                    "[{}] Lookup of {} in {} failed: {}",
                    candidate.service_name, name, scope, e
                );
                false
            }
        }
    }

    /// Confirm every candidate, in order
    ///
    /// When no candidate is confirmed, all of them are kept so that platform
    /// outages do not block the audit; callers needing strict confirmation
    /// must check `confirmed`.
    pub async fn reconcile(&self, candidates: &[Arc<ServiceCandidate>]) -> Reconciliation {
        let mut confirmed = Vec::new();

        for candidate in candidates {
            info!(
                "Validating deployment for {} ({})...",
                candidate.service_name, candidate.platform
            );
            if self.is_live(candidate).await {
                info!("Verified: {} is active on {}", candidate.service_name, candidate.platform);
                confirmed.push(Arc::clone(candidate));
            } else {
                warn!("Not found: {} on {}", candidate.service_name, candidate.platform);
            }
        }

        info!("Active services verified: {}", confirmed.len());

        if confirmed.is_empty() && !candidates.is_empty() {
            warn!(
                "No services confirmed live; auditing all {} candidates",
                candidates.len()
            );
            return Reconciliation {
                services: candidates.to_vec(),
                confirmed: 0,
                fell_back: true,
            };
        }

        Reconciliation {
            confirmed: confirmed.len(),
            services: confirmed,
            fell_back: false,
        }
    }
}
