//! Service discovery
//!
//! Turns a telemetry export into service candidates and checks them against
//! the live platforms they claim to run on.
//!
//! **Components:**
//! - `telemetry`: span export parsing, inclusion filters, attribute aliasing
//! - `validator`: required-field gate run before any network call
//! - `platform`: OpenShift and ECS discovery collaborators
//! - `reconciler`: live-deployment confirmation per candidate

pub mod platform;
pub mod reconciler;
pub mod telemetry;
pub mod validator;

pub use platform::{LiveDeployment, PlatformDiscovery, UnavailableDiscovery};
pub use reconciler::{aws_region_for, PlatformReconciler, Reconciliation};
pub use telemetry::TelemetryExtractor;
pub use validator::{validate_all, validate_candidate, ValidationReport};
