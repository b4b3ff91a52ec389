//! Container catalog client
//!
//! Looks images up by repository name and returns their published version
//! history, newest first.

use agent_common::config::ComplianceConfig;
use agent_common::{CatalogError, TagInfo};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of authoritative base image tags
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Published tags for an image key, newest first
    async fn version_history(&self, image: &str) -> Result<Vec<TagInfo>, CatalogError>;

    /// Newest published tag, `None` when the image has no history
    async fn latest_tag(&self, image: &str) -> Result<Option<TagInfo>, CatalogError> {
        Ok(self.version_history(image).await?.into_iter().next())
    }

    /// Position of `tag` in the history
    ///
    /// A tag missing from the history ranks after every known entry. `None`
    /// when the history is empty.
    async fn rank_of(&self, image: &str, tag: &str) -> Result<Option<usize>, CatalogError> {
        let history = self.version_history(image).await?;
        if history.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            history
                .iter()
                .position(|entry| entry.tag == tag)
                .unwrap_or(history.len()),
        ))
    }
}

/// One entry of `/images/{id}/versions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    red_hat_tag: Option<String>,
    tag: Option<String>,
    made_live_date: Option<String>,
    image_age: Option<Value>,
}

impl VersionEntry {
    fn into_tag_info(self) -> Option<TagInfo> {
        let tag = self
            .red_hat_tag
            .filter(|t| !t.is_empty())
            .or(self.tag.filter(|t| !t.is_empty()))?;

        let release_date = self.made_live_date.as_deref().and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| debug!("Ignoring unparseable madeLiveDate {:?}: {}", raw, e))
                .ok()
        });

        let mut info = TagInfo::new(tag, release_date);
        info.image_age = self.image_age.map(|age| match age {
            Value::String(s) => s,
            other => other.to_string(),
        });
        Some(info)
    }
}

/// Catalog list responses come either bare or wrapped in `data`
fn records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Sort newest first (undated entries last) and flag the head as latest
fn sort_history(mut tags: Vec<TagInfo>) -> Vec<TagInfo> {
    // Stable sort keeps the API's order among equal dates
    tags.sort_by(|a, b| b.release_date.cmp(&a.release_date));
    if let Some(first) = tags.first_mut() {
        first.is_latest = true;
    }
    tags
}

/// Client for the Red Hat container catalog API
pub struct RedHatCatalog {
    base_url: String,
    client: reqwest::Client,

    /// Image key to catalog repository name
    image_map: BTreeMap<String, String>,

    /// Version history per image key, filled on first successful fetch
    cache: Mutex<HashMap<String, Vec<TagInfo>>>,
}

impl RedHatCatalog {
    /// Create a new catalog client
    pub fn new(config: &ComplianceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.catalog_timeout_secs))
            .build()
            .context("Failed to build catalog HTTP client")?;

        Ok(Self {
            base_url: config.catalog_api_url.trim_end_matches('/').to_string(),
            client,
            image_map: config.image_map.clone(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn repository_for<'a>(&'a self, image: &'a str) -> &'a str {
        self.image_map.get(image).map(String::as_str).unwrap_or(image)
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, CatalogError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Malformed(e.to_string()))
    }

    /// Catalog id of the first image matching a repository name
    async fn image_id(&self, repository: &str) -> Result<String, CatalogError> {
        let url = format!("{}/images", self.base_url);
        debug!("Searching catalog for image {}", repository);

        let body = self.get_json(&url, &[("name", repository)]).await?;
        let first = records(body)
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::ImageNotFound(repository.to_string()))?;

        match first.get("id").or_else(|| first.get("_id")) {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(CatalogError::Malformed(format!(
                "image record for {} has no id",
                repository
            ))),
        }
    }

    async fn fetch_history(&self, repository: &str) -> Result<Vec<TagInfo>, CatalogError> {
        let id = self.image_id(repository).await?;
        let url = format!("{}/images/{}/versions", self.base_url, id);
        info!("Fetching versions for {} (ID: {}) from {}", repository, id, url);

        let body = self.get_json(&url, &[]).await?;
        let tags = records(body)
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<VersionEntry>(item) {
                Ok(entry) => entry.into_tag_info(),
                Err(e) => {
                    warn!("Skipping malformed version entry for {}: {}", repository, e);
                    None
                }
            })
            .collect();

        Ok(sort_history(tags))
    }
}

#[async_trait]
impl Catalog for RedHatCatalog {
    async fn version_history(&self, image: &str) -> Result<Vec<TagInfo>, CatalogError> {
        let cached = self
            .cache
            .lock()
            .map_err(|_| CatalogError::Http("catalog cache poisoned".to_string()))?
            .get(image)
            .cloned();
        if let Some(history) = cached {
            return Ok(history);
        }

        let history = self.fetch_history(self.repository_for(image)).await?;

        self.cache
            .lock()
            .map_err(|_| CatalogError::Http("catalog cache poisoned".to_string()))?
            .insert(image.to_string(), history.clone());

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_common::config::TagStrategy;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    fn catalog(server: &MockServer) -> RedHatCatalog {
        RedHatCatalog::new(&ComplianceConfig {
            catalog_api_url: server.base_url(),
            default_tag: None,
            tag_strategy: TagStrategy::PerImage,
            run_wide_image_type: "rhel8.java8".to_string(),
            image_map: [("rhel8-java21".to_string(), "ubi8/openjdk-21-runtime".to_string())]
                .into_iter()
                .collect(),
            catalog_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_history_sorted_newest_first() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/images")
                .query_param("name", "ubi8/openjdk-21-runtime");
            then.status(200).json_body(json!({ "data": [{ "id": "abc123" }] }));
        });
        let versions = server.mock(|when, then| {
            when.method(GET).path("/images/abc123/versions");
            then.status(200).json_body(json!([
                { "redHatTag": "8.9-1", "madeLiveDate": "2024-01-10T00:00:00Z" },
                { "tag": "8.8-7" },
                {
                    "redHatTag": "8.10-2",
                    "madeLiveDate": "2024-06-01T12:00:00+00:00",
                    "imageAge": "3 days"
                },
                { "madeLiveDate": "2024-07-01T00:00:00Z" }
            ]));
        });

        let catalog = catalog(&server);
        let history = catalog.version_history("rhel8-java21").await.unwrap();

        let tags: Vec<_> = history.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["8.10-2", "8.9-1", "8.8-7"]);
        assert!(history[0].is_latest);
        assert!(!history[1].is_latest);
        assert_eq!(history[0].image_age.as_deref(), Some("3 days"));
        assert!(history[2].release_date.is_none());

        // Second call is served from the cache
        catalog.version_history("rhel8-java21").await.unwrap();
        search.assert_hits(1);
        versions.assert_hits(1);
    }

    #[tokio::test]
    async fn test_latest_tag_and_rank() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/images").query_param("name", "rhel8");
            then.status(200).json_body(json!([{ "id": 42 }]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/images/42/versions");
            then.status(200).json_body(json!([
                { "tag": "8.10-2", "madeLiveDate": "2024-06-01T00:00:00Z" },
                { "tag": "8.10-1", "madeLiveDate": "2024-05-01T00:00:00Z" },
                { "tag": "8.9-5", "madeLiveDate": "2024-04-01T00:00:00Z" }
            ]));
        });

        let catalog = catalog(&server);
        let latest = catalog.latest_tag("rhel8").await.unwrap().unwrap();
        assert_eq!(latest.tag, "8.10-2");
        assert!(latest.is_latest);

        assert_eq!(catalog.rank_of("rhel8", "8.9-5").await.unwrap(), Some(2));
        assert_eq!(catalog.rank_of("rhel8", "7.0-1").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_unknown_image_is_typed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(json!({ "data": [] }));
        });

        let catalog = catalog(&server);
        assert!(matches!(
            catalog.latest_tag("rhel9").await,
            Err(CatalogError::ImageNotFound(name)) if name == "rhel9"
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_not_cached() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(GET).path("/images");
            then.status(503);
        });

        let catalog = catalog(&server);
        assert!(matches!(
            catalog.version_history("rhel8").await,
            Err(CatalogError::Status { status: 503, .. })
        ));
        assert!(catalog.version_history("rhel8").await.is_err());
        search.assert_hits(2);
    }

    #[tokio::test]
    async fn test_empty_history_has_no_rank() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(json!([{ "id": "x" }]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/images/x/versions");
            then.status(200).json_body(json!([]));
        });

        let catalog = catalog(&server);
        assert!(catalog.latest_tag("rhel8").await.unwrap().is_none());
        assert_eq!(catalog.rank_of("rhel8", "8.10-1").await.unwrap(), None);
    }
}
