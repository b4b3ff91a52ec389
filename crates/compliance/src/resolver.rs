//! Compliance resolution
//!
//! Compares every candidate's running base image tag against the
//! authoritative latest tag from the catalog. Latest tags are looked up once
//! per run and kept until the next [`ComplianceResolver::check_all`].

use crate::catalog::Catalog;
use agent_common::config::{ComplianceConfig, TagStrategy};
use agent_common::{compare_versions, ComplianceVerdict, ServiceCandidate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Latest tag reported for a service without an image type
pub const UNKNOWN_TAG: &str = "unknown";

/// Latest tag reported when neither the catalog nor the default produced one
pub const FETCH_FAILED_TAG: &str = "API_FETCH_FAILED";

/// Image family: the text before the first `.` or `-`
///
/// `rhel8.java8` and `rhel8-java21` both give `rhel8`.
pub fn image_family(image_type: &str) -> &str {
    image_type
        .split(['.', '-'])
        .next()
        .unwrap_or(image_type)
}

/// Catalog key for a per-image lookup
pub fn catalog_key(image_type: &str) -> String {
    image_type.trim().replace('.', "-")
}

/// Latest tag for a catalog key and where it came from
#[derive(Debug, Clone)]
struct LatestTag {
    tag: String,
    from_catalog: bool,
}

/// Produces compliance verdicts against a catalog
pub struct ComplianceResolver {
    catalog: Box<dyn Catalog>,
    strategy: TagStrategy,
    run_wide_image_type: String,
    default_tag: Option<String>,

    /// Per-run latest tag by catalog key; `None` records a failed lookup
    latest: HashMap<String, Option<LatestTag>>,
}

impl ComplianceResolver {
    pub fn new(catalog: Box<dyn Catalog>, config: &ComplianceConfig) -> Self {
        Self {
            catalog,
            strategy: config.tag_strategy,
            run_wide_image_type: config.run_wide_image_type.clone(),
            default_tag: config.default_tag.clone(),
            latest: HashMap::new(),
        }
    }

    /// Check every candidate, in order
    pub async fn check_all(
        &mut self,
        candidates: &[Arc<ServiceCandidate>],
    ) -> Vec<ComplianceVerdict> {
        self.latest.clear();

        let mut verdicts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            verdicts.push(self.check_service(Arc::clone(candidate)).await);
        }
        verdicts
    }

    /// Check one candidate against the latest tag of its catalog key
    pub async fn check_service(&mut self, candidate: Arc<ServiceCandidate>) -> ComplianceVerdict {
        let key = match self.strategy {
            TagStrategy::RunWide => image_family(&self.run_wide_image_type).to_string(),
            TagStrategy::PerImage if candidate.image_type.trim().is_empty() => {
                warn!(
                    "[{}] No image type defined; skipping catalog check",
                    candidate.service_name
                );
                return ComplianceVerdict::unverifiable(candidate, UNKNOWN_TAG);
            }
            TagStrategy::PerImage => catalog_key(&candidate.image_type),
        };

        info!("[{}] Querying catalog for: {}", candidate.service_name, key);

        let Some(LatestTag {
            tag: latest,
            from_catalog,
        }) = self.latest_for(&key).await
        else {
            error!(
                "[{}] No latest tag available for {}; compliance not verified",
                candidate.service_name, key
            );
            return ComplianceVerdict::unverifiable(candidate, FETCH_FAILED_TAG);
        };

        let current = candidate.base_image_version.as_str();
        let comparison = compare_versions(current, &latest);
        let mut tag_age = comparison.distance;

        if comparison.distance.is_none() {
            warn!(
                "[{}] Cannot determine distance between {:?} and {:?}",
                candidate.service_name, current, latest
            );
        }

        // A distance of 1 is also the fallback for tags of different shape;
        // the tag's position in the release history is more precise. A
        // default tag means the catalog already failed this run.
        if from_catalog && !comparison.meets_or_exceeds && comparison.distance == Some(1) {
            match self.catalog.rank_of(&key, current).await {
                Ok(Some(rank)) => tag_age = Some(rank as u64),
                Ok(None) => {}
                Err(e) => debug!("[{}] Rank lookup failed: {}", candidate.service_name, e),
            }
        }

        info!(
            "[{}] Current: {} | Latest: {} | Compliant: {}",
            candidate.service_name,
            current,
            latest,
            if comparison.meets_or_exceeds { "YES" } else { "NO" }
        );

        ComplianceVerdict::evaluated(candidate, latest, comparison.meets_or_exceeds, tag_age)
    }

    /// Latest tag for a catalog key, falling back to the configured default
    async fn latest_for(&mut self, key: &str) -> Option<LatestTag> {
        if let Some(cached) = self.latest.get(key) {
            return cached.clone();
        }

        let fetched = match self.catalog.latest_tag(key).await {
            Ok(Some(info)) => Some(info.tag),
            Ok(None) => {
                warn!("Catalog has no published tags for {}", key);
                None
            }
            Err(e) => {
                warn!("Catalog lookup for {} failed: {}", key, e);
                None
            }
        };

        let resolved = match fetched {
            Some(tag) => Some(LatestTag {
                tag,
                from_catalog: true,
            }),
            None => self.default_tag.clone().map(|tag| {
                warn!("Using default base tag {} for {}", tag, key);
                LatestTag {
                    tag,
                    from_catalog: false,
                }
            }),
        };

        self.latest.insert(key.to_string(), resolved.clone());
        resolved
    }
}
