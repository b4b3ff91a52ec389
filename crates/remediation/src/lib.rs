//! Remediation pipelines
//!
//! **Components:**
//! - `gitlab`: GitLab pipeline API client (dry-run aware)
//! - `trigger`: one pipeline per selected verdict

pub mod gitlab;
pub mod trigger;

pub use gitlab::{GitLabClient, PipelineBackend, DRY_RUN_STATUS};
pub use trigger::{PipelineTrigger, NO_PROJECT_PATH};
