//! fedingest - media ingest into Fedora Commons repositories
//!
//! Probes a staged media file with the MediaInfo CLI, maps the reported
//! technical metadata onto canonical ontology properties, uploads the
//! file's bytes to a Fedora repository, and attaches the metadata to the
//! created object with a SPARQL-Update PATCH.
//!
//! The host application (typically a CMS save hook) drives the crate one
//! file at a time through [`IngestPipeline::process`] and consumes the
//! returned [`UploadOutcome`]; a small CLI binary plays that host role for
//! operators.

pub mod config;
pub mod services;
pub mod types;
pub mod workflow;

pub use config::IngestConfig;
pub use types::{MediaFile, UploadOutcome};
pub use workflow::IngestPipeline;
