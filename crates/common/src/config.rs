//! Configuration management for the base image agent
//!
//! Configuration is read once at startup into an immutable [`AgentConfig`]
//! and passed by reference into every component constructor. Nothing else
//! in the workspace reads the process environment.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// GitLab pipeline API settings
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    pub url: String,
    pub api_version: String,
    pub token: Option<String>,
}

impl GitLabConfig {
    pub fn base_url(&self) -> String {
        format!("{}/api/{}", self.url.trim_end_matches('/'), self.api_version)
    }
}

/// AWS ECS discovery settings
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// Outbound proxy for portal and ECS calls
    pub proxy_url: String,

    /// Credential portal exchanging a role ARN for temporary keys
    pub portal_url: String,

    pub role_arn: Option<String>,

    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,

    /// Overrides `https://ecs.{region}.amazonaws.com`
    pub ecs_endpoint: Option<String>,
}

impl AwsConfig {
    /// Whether any credential source is configured
    pub fn has_credentials(&self) -> bool {
        let portal = self.role_arn.is_some() && !self.portal_url.is_empty();
        let static_keys = self.access_key_id.is_some() && self.secret_access_key.is_some();
        portal || static_keys
    }
}

/// OpenShift discovery settings
#[derive(Debug, Clone, Default)]
pub struct OseConfig {
    pub primary_endpoint: String,
    pub shadow_endpoint: String,

    /// Namespace every deployment lookup is scoped to
    pub namespace: String,

    pub token: Option<String>,
}

impl OseConfig {
    /// Configured endpoints as `(location, url)` pairs
    pub fn endpoints(&self) -> Vec<(&'static str, &str)> {
        let mut endpoints = Vec::new();
        if !self.primary_endpoint.is_empty() {
            endpoints.push(("primary", self.primary_endpoint.as_str()));
        }
        if !self.shadow_endpoint.is_empty() {
            endpoints.push(("shadow", self.shadow_endpoint.as_str()));
        }
        endpoints
    }
}

/// How the authoritative latest tag is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStrategy {
    /// Each service is checked against the latest tag of its own image type
    PerImage,
    /// One latest tag for the whole run
    RunWide,
}

impl TagStrategy {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "per_image" => Ok(TagStrategy::PerImage),
            "run_wide" => Ok(TagStrategy::RunWide),
            other => Err(Error::Config(format!(
                "Invalid TAG_STRATEGY '{}' (expected per_image or run_wide)",
                other
            ))),
        }
    }
}

/// Catalog lookup and compliance policy settings
#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    pub catalog_api_url: String,

    /// Used when the catalog cannot produce a latest tag
    pub default_tag: Option<String>,

    pub tag_strategy: TagStrategy,

    /// Image type whose family supplies the run-wide tag
    pub run_wide_image_type: String,

    /// Image key to catalog repository name
    pub image_map: BTreeMap<String, String>,

    pub catalog_timeout_secs: u64,
}

/// Telemetry inclusion filters
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// "all" or a platform label
    pub target_platform: String,

    pub target_image_type: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub gitlab: GitLabConfig,
    pub aws: AwsConfig,
    pub ose: OseConfig,
    pub compliance: ComplianceConfig,
    pub discovery: DiscoveryConfig,

    /// Pipelines are only simulated when set
    pub dry_run: bool,

    pub output_dir: PathBuf,

    /// Git ref remediation pipelines run on
    pub pipeline_branch: String,

    /// Extra variables sent with every remediation pipeline
    pub pipeline_variables: BTreeMap<String, String>,
}

fn default_image_map() -> BTreeMap<String, String> {
    [
        ("rhel8-java21", "ubi8/openjdk-21-runtime"),
        ("rhel8-java17", "ubi8/openjdk-17-runtime"),
        ("rhel8-java8", "ubi8/ubi"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Parse `key=value` pairs separated by commas
fn parse_pairs(name: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::Config(format!("Invalid {} entry '{}' (expected key=value)", name, entry))
        })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(Error::Config(format!("Invalid {} entry '{}'", name, entry)));
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!("Invalid {} '{}' (expected true/false)", name, other))),
    }
}

impl AgentConfig {
    /// Load configuration from a `.env` file and the process environment
    ///
    /// Without an explicit path, `config/.env` and then `.env` in the working
    /// directory are tried. A missing file is not an error.
    pub fn from_env(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    Error::Config(format!("Failed to load env file {}: {}", path.display(), e))
                })?;
                debug!("Loaded environment from {}", path.display());
            }
            None => {
                let local = Path::new("config/.env");
                if local.exists() {
                    dotenvy::from_path(local).ok();
                } else {
                    dotenvy::dotenv().ok();
                }
            }
        }

        let mut config = Self::from_lookup(|key| env::var(key).ok())?;

        if config.ose.token.is_none() {
            config.ose.token = std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN)
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
            if config.ose.token.is_some() {
                debug!("Using service account token for OpenShift");
            }
        }

        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let opt = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let image_map = match opt("CATALOG_IMAGE_MAP") {
            Some(raw) => parse_pairs("CATALOG_IMAGE_MAP", &raw)?,
            None => default_image_map(),
        };

        let config = AgentConfig {
            gitlab: GitLabConfig {
                url: get("GITLAB_URL", "https://gitlab.com"),
                api_version: get("GITLAB_API_VERSION", "v4"),
                token: opt("GITLAB_PRIVATE_TOKEN"),
            },

            aws: AwsConfig {
                proxy_url: get("AWS_PROXY_URL", ""),
                portal_url: get("AWS_PORTAL_URL", ""),
                role_arn: opt("AWS_ROLE_ARN"),
                access_key_id: opt("AWS_ACCESS_KEY_ID"),
                secret_access_key: opt("AWS_SECRET_ACCESS_KEY"),
                session_token: opt("AWS_SESSION_TOKEN"),
                ecs_endpoint: opt("AWS_ECS_ENDPOINT"),
            },

            ose: OseConfig {
                primary_endpoint: get("OSE_PRIMARY_ENDPOINT", ""),
                shadow_endpoint: get("OSE_SHADOW_ENDPOINT", ""),
                namespace: get("OSE_NAMESPACE", "default"),
                token: opt("OSE_TOKEN").or_else(|| opt("OPENSHIFT_TOKEN")),
            },

            compliance: ComplianceConfig {
                catalog_api_url: get(
                    "CATALOG_API_URL",
                    "https://catalog.redhat.com/api/containers/v1",
                ),
                default_tag: opt("DEFAULT_BASE_TAG"),
                tag_strategy: TagStrategy::parse(&get("TAG_STRATEGY", "per_image"))?,
                run_wide_image_type: get("RUN_WIDE_IMAGE_TYPE", "rhel8.java8"),
                image_map,
                catalog_timeout_secs: get("CATALOG_TIMEOUT_SECS", "10")
                    .parse()
                    .map_err(|_| Error::Config("Invalid CATALOG_TIMEOUT_SECS".to_string()))?,
            },

            discovery: DiscoveryConfig {
                target_platform: get("TARGET_PLATFORM", "all").to_lowercase(),
                target_image_type: opt("TARGET_IMAGE_TYPE"),
            },

            dry_run: parse_bool("DRY_RUN", &get("DRY_RUN", "true"))?,
            output_dir: get("OUTPUT_DIR", "./output").into(),
            pipeline_branch: get("PIPELINE_BRANCH", "main"),
            pipeline_variables: match opt("PIPELINE_VARIABLES") {
                Some(raw) => parse_pairs("PIPELINE_VARIABLES", &raw)?,
                None => BTreeMap::new(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.compliance.catalog_api_url.trim().is_empty() {
            return Err(Error::Config("CATALOG_API_URL must not be empty".to_string()));
        }

        if self.compliance.catalog_timeout_secs == 0 {
            return Err(Error::Config(
                "CATALOG_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.compliance.tag_strategy == TagStrategy::RunWide
            && self.compliance.run_wide_image_type.trim().is_empty()
        {
            return Err(Error::Config(
                "RUN_WIDE_IMAGE_TYPE is required when TAG_STRATEGY=run_wide".to_string(),
            ));
        }

        if self.pipeline_branch.trim().is_empty() {
            return Err(Error::Config("PIPELINE_BRANCH must not be empty".to_string()));
        }

        Ok(())
    }
}
