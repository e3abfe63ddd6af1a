//! Service clients and the mapping engine
//!
//! - `mediainfo_client` - external probe tool invocation and track parsing
//! - `metadata_mapper` - ontology mapping and type/format resolution
//! - `fedora_client` - two-phase repository upload/annotate protocol

pub mod fedora_client;
pub mod mediainfo_client;
pub mod metadata_mapper;

pub use fedora_client::FedoraClient;
pub use mediainfo_client::MediaInfoClient;
pub use metadata_mapper::{FallbackTable, MetadataMapper};
