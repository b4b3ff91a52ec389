//! Shared building blocks for the base image agent
//!
//! Data model, typed errors, the version comparator and the immutable
//! run configuration used by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod models;
pub mod version;

pub use config::AgentConfig;
pub use error::{CatalogError, DiscoveryError, Error, Result};
pub use models::{
    ComplianceStatus, ComplianceVerdict, PipelineResult, Platform, RemediationRequest,
    RemediationStatus, ServiceCandidate, TagInfo,
};
pub use version::{compare_versions, parse_version, VersionComparison};
