//! Base image compliance audit agent
//!
//! Reads a deploy telemetry export, confirms which services are live,
//! compares their base image tags against the catalog and triggers upgrade
//! pipelines for the ones that are behind.

pub mod agent;
pub mod report;

pub use agent::{AgentRun, BaseImageAgent};
pub use report::{AgentReport, ReportGenerator, ReportSummary, VerdictRow};
