//! Base image compliance
//!
//! **Components:**
//! - `catalog`: authoritative tag source (container catalog client)
//! - `resolver`: per-service compliance verdicts
//! - `selector`: which verdicts warrant a remediation pipeline

pub mod catalog;
pub mod resolver;
pub mod selector;

pub use catalog::{Catalog, RedHatCatalog};
pub use resolver::{image_family, ComplianceResolver, FETCH_FAILED_TAG, UNKNOWN_TAG};
pub use selector::{remediation_request, select_for_remediation};
