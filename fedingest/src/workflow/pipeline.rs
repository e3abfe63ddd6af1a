//! Ingest pipeline
//!
//! Sequences probe -> map -> upload -> annotate for one staged file and
//! folds the result into a single `UploadOutcome`.
//!
//! # Partial failure
//! A probe or upload failure aborts the file; nothing is created remotely
//! without harvested metadata, and nothing is annotated without an object.
//! An annotation failure after a successful upload degrades the outcome
//! instead of failing it: the binary object exists in the repository, and
//! the host must still point its record at it.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use crate::config::{IngestConfig, RepositorySettings};
use crate::services::fedora_client::FedoraClient;
use crate::services::mediainfo_client::{MediaInfoClient, ProbeError};
use crate::services::metadata_mapper::{MetadataMapper, HEIGHT_PROPERTY, WIDTH_PROPERTY};
use crate::types::{
    DerivedAttributes, HarvestedMetadata, MediaFile, ObjectRepository, Track, UploadOutcome,
};

/// Orchestrates one file at a time. The probe client and mapping tables are
/// shared read-only across files; each file gets its own repository client
/// so the retained object identity never crosses files.
pub struct IngestPipeline {
    probe: MediaInfoClient,
    mapper: MetadataMapper,
    repository: RepositorySettings,
}

impl IngestPipeline {
    /// Build the pipeline from loaded configuration.
    ///
    /// Fails fast when the probe tool is unavailable so the host can refuse
    /// uploads before anything reaches the repository.
    pub fn new(config: &IngestConfig) -> Result<Self, ProbeError> {
        let probe = MediaInfoClient::new(&config.probe.binary, config.probe_timeout())?;

        Ok(Self {
            probe,
            mapper: config.mapper(),
            repository: config.repository.clone(),
        })
    }

    /// Process one staged file end to end.
    pub async fn process(&self, file: &MediaFile) -> UploadOutcome {
        info!(
            file = %file.local_path.display(),
            name = %file.original_name,
            size = file.size_bytes,
            "ingesting media file"
        );

        let tracks = match self.probe.probe(&file.local_path).await {
            Ok(tracks) => tracks,
            Err(e) => {
                error!(file = %file.original_name, error = %e, "probe failed, nothing uploaded");
                return UploadOutcome::Failure { reason: e.into() };
            }
        };

        let mut client = FedoraClient::with_timeout(
            self.repository.base_url.as_str(),
            self.repository.container_path.as_str(),
            self.repository.username.as_str(),
            self.repository.password.as_str(),
            std::time::Duration::from_secs(self.repository.timeout_secs),
        );

        ingest_tracks(&self.mapper, file, &tracks, &mut client).await
    }
}

/// Map, upload and annotate against an explicit repository.
///
/// Split out from `IngestPipeline::process` so the two-phase semantics are
/// exercisable without the probe tool or a live repository.
pub async fn ingest_tracks<R: ObjectRepository>(
    mapper: &MetadataMapper,
    file: &MediaFile,
    tracks: &[Track],
    repository: &mut R,
) -> UploadOutcome {
    let metadata = mapper.harvest(tracks);
    let media_type = mapper.resolve_type(metadata.media_type);
    let format = mapper.resolve_format(&metadata);

    debug!(
        media_type = %media_type,
        format = ?format,
        properties = metadata.properties.len(),
        "metadata harvested"
    );

    let object_url = match repository.upload_binary(file).await {
        Ok(url) => url,
        Err(e) => {
            error!(file = %file.original_name, error = %e, "upload failed");
            return UploadOutcome::Failure { reason: e.into() };
        }
    };

    let digest = match file_digest(&file.local_path).await {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!(file = %file.original_name, error = %e, "could not hash staged file");
            None
        }
    };

    let attributes = DerivedAttributes {
        object_url: object_url.clone(),
        file_name: file.original_name.clone(),
        media_type: media_type.clone(),
        format: format.clone(),
        size_bytes: file.size_bytes,
        dimensions: dimensions(&metadata),
        digest: digest.clone(),
    };

    let statements =
        annotation_properties(file, &metadata, &media_type, format.as_deref(), digest.as_deref());

    let annotation_error = match repository.annotate(&statements).await {
        Ok(()) => {
            info!(
                object_url = %object_url,
                statements = statements.len(),
                "metadata attached"
            );
            None
        }
        Err(e) => {
            // The object exists; a rejected update degrades the result, it
            // does not undo the upload.
            warn!(
                object_url = %object_url,
                error = %e,
                "metadata annotation failed, object retained"
            );
            Some(e.to_string())
        }
    };

    UploadOutcome::Success {
        object_url,
        metadata,
        attributes,
        annotation_error,
    }
}

/// `WIDTHxHEIGHT` when both dimensions were harvested.
fn dimensions(metadata: &HarvestedMetadata) -> Option<String> {
    match (
        metadata.properties.get(WIDTH_PROPERTY),
        metadata.properties.get(HEIGHT_PROPERTY),
    ) {
        (Some(width), Some(height)) => Some(format!("{}x{}", width, height)),
        _ => None,
    }
}

/// Statement list for phase 2: the harvested properties plus the fixed
/// derived ones, unique keys in stable order.
fn annotation_properties(
    file: &MediaFile,
    metadata: &HarvestedMetadata,
    media_type: &str,
    format: Option<&str>,
    digest: Option<&str>,
) -> Vec<(String, String)> {
    let mut merged: std::collections::BTreeMap<String, String> = metadata
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    merged.insert("ebucore:filename".to_string(), file.original_name.clone());
    merged.insert("ebucore:fileSize".to_string(), file.size_bytes.to_string());
    merged.insert("dc:type".to_string(), media_type.to_string());
    if let Some(format) = format {
        merged.insert("dc:format".to_string(), format.to_string());
    }
    if let Some(digest) = digest {
        merged.insert(
            "premis:hasMessageDigest".to_string(),
            format!("urn:sha-256:{}", digest),
        );
    }

    merged.into_iter().collect()
}

/// SHA-256 of the staged file, streamed in chunks.
async fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
