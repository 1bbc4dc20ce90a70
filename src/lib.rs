//! Container validation-and-repair pipeline.
//!
//! Locates a repository's Dockerfile, builds and runs it, collects the
//! container's logs, renders a report, and hands failures to a repair
//! collaborator for a bounded number of revalidation passes.

pub mod config;
pub mod docker;
pub mod error;
pub mod log_parser;
pub mod pipeline;
pub mod repair;
pub mod repo;
