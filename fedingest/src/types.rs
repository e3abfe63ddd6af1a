//! Core types for fedingest
//!
//! Defines the data model shared across the ingest pipeline:
//! - `MediaFile` - one staged upload, as handed over by the host
//! - `Track` / `TrackType` - probe output (one record per elementary stream)
//! - `HarvestedMetadata` / `MediaType` - mapping engine output
//! - `UploadOutcome` - the single value reported back to the host
//! - `ObjectRepository` - trait seam for the two-phase repository protocol

use std::collections::HashMap;
use std::path::PathBuf;

use crate::services::fedora_client::{AnnotateError, UploadError};
use crate::services::mediainfo_client::ProbeError;
use thiserror::Error;

// ============================================================================
// Staged files
// ============================================================================

/// One staged media file, owned for the duration of a single ingest request.
///
/// The host supplies the original (user-facing) filename separately from the
/// staging path because upload staging areas typically use opaque temporary
/// names.
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Path to the staged bytes on the local filesystem
    pub local_path: PathBuf,
    /// Original filename as supplied by the uploader
    pub original_name: String,
    /// Size of the staged file in bytes
    pub size_bytes: u64,
    /// MIME type claimed by the host, if any (content sniffing wins)
    pub mime_hint: Option<String>,
}

impl MediaFile {
    /// Build a `MediaFile` directly from a path on disk.
    ///
    /// Uses the path's file name as the original name. Hosts that stage
    /// uploads under temporary names should construct the struct directly.
    pub fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let local_path = path.into();
        let metadata = std::fs::metadata(&local_path)?;
        let original_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.bin".to_string());

        Ok(Self {
            local_path,
            original_name,
            size_bytes: metadata.len(),
            mime_hint: None,
        })
    }

    /// Attach a MIME hint from the host.
    pub fn with_mime_hint(mut self, mime: impl Into<String>) -> Self {
        self.mime_hint = Some(mime.into());
        self
    }
}

// ============================================================================
// Probe output
// ============================================================================

/// Stream categories reported by the probing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// Container-level record (file size, overall format, duration)
    General,
    Video,
    Audio,
    Image,
    Text,
    /// Anything the tool reports that we do not classify (Menu, Chapters, ...)
    Other,
}

impl TrackType {
    /// Map a probe-tool type name onto a track type.
    ///
    /// Unrecognized names become `Other` rather than an error; the mapping
    /// engine treats them with the General field map.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "General" => TrackType::General,
            "Video" => TrackType::Video,
            "Audio" => TrackType::Audio,
            "Image" => TrackType::Image,
            "Text" => TrackType::Text,
            _ => TrackType::Other,
        }
    }
}

/// One elementary stream's technical description as reported by the probe.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_type: TrackType,
    /// Raw probe fields, keyed by the tool's own field names
    pub fields: HashMap<String, String>,
}

impl Track {
    pub fn new(track_type: TrackType) -> Self {
        Self {
            track_type,
            fields: HashMap::new(),
        }
    }
}

// ============================================================================
// Mapping output
// ============================================================================

/// Coarse media classification resolved from the track sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
    Image,
    Text,
    Unknown,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "Video",
            MediaType::Audio => "Audio",
            MediaType::Image => "Image",
            MediaType::Text => "Text",
            MediaType::Unknown => "Unknown",
        }
    }

    /// Final types can never be displaced by later tracks. A container that
    /// multiplexes a video stream with audio is a video, regardless of the
    /// order the probe reports the streams in.
    pub fn is_final(&self) -> bool {
        matches!(self, MediaType::Video | MediaType::Image | MediaType::Text)
    }
}

/// Flat metadata set produced by the mapping engine.
#[derive(Debug, Clone)]
pub struct HarvestedMetadata {
    /// Canonical ontology property -> value; later tracks overwrite earlier
    /// ones that map to the same property
    pub properties: HashMap<String, String>,
    /// Coarse classification per the priority rule
    pub media_type: MediaType,
}

// ============================================================================
// Outcome reported to the host
// ============================================================================

/// Values the host writes into its own attribute records after a successful
/// ingest. Optional fields are absent when the source material did not
/// provide them.
#[derive(Debug, Clone)]
pub struct DerivedAttributes {
    /// Repository-assigned object URL
    pub object_url: String,
    /// Original filename
    pub file_name: String,
    /// Resolved coarse media type code
    pub media_type: String,
    /// Resolved format code, absent when the probe reported no format
    pub format: Option<String>,
    /// Size of the uploaded bytes
    pub size_bytes: u64,
    /// `WIDTHxHEIGHT` when the probe reported dimensions
    pub dimensions: Option<String>,
    /// Hex-encoded SHA-256 digest of the uploaded bytes
    pub digest: Option<String>,
}

/// Fatal per-file failure. Annotation failures are deliberately absent here:
/// once the binary object exists in the repository the ingest is a success,
/// degraded or not.
#[derive(Debug, Error)]
pub enum IngestFailure {
    #[error("metadata probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("repository upload failed: {0}")]
    Upload(#[from] UploadError),
}

/// Result of one ingest attempt, the only value exposed to the host.
#[derive(Debug)]
pub enum UploadOutcome {
    Success {
        /// Repository-assigned object URL
        object_url: String,
        /// Harvested technical metadata (as sent to the repository)
        metadata: HarvestedMetadata,
        /// Derived values for the host's attribute records
        attributes: DerivedAttributes,
        /// Non-fatal annotation failure, when phase 2 was rejected
        annotation_error: Option<String>,
    },
    Failure {
        reason: IngestFailure,
    },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }
}

// ============================================================================
// Repository trait
// ============================================================================

/// Two-phase repository protocol: create the binary object, then attach
/// metadata to it.
///
/// Implementations retain the created object's identity between the phases;
/// `annotate` must fail without touching the network when no upload has
/// succeeded on the same instance. One instance serves one file.
#[async_trait::async_trait]
pub trait ObjectRepository: Send {
    /// Phase 1: stream the file's bytes to the repository.
    ///
    /// Returns the repository-assigned object URL on success.
    async fn upload_binary(&mut self, file: &MediaFile) -> Result<String, UploadError>;

    /// Phase 2: attach `(property, value)` pairs to the uploaded object.
    ///
    /// Only meaningful after a successful `upload_binary` on this instance.
    async fn annotate(&self, properties: &[(String, String)]) -> Result<(), AnnotateError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_type_from_name() {
        assert_eq!(TrackType::from_type_name("Video"), TrackType::Video);
        assert_eq!(TrackType::from_type_name("General"), TrackType::General);
        assert_eq!(TrackType::from_type_name("Menu"), TrackType::Other);
        assert_eq!(TrackType::from_type_name(""), TrackType::Other);
    }

    #[test]
    fn test_final_media_types() {
        assert!(MediaType::Video.is_final());
        assert!(MediaType::Image.is_final());
        assert!(MediaType::Text.is_final());
        assert!(!MediaType::Audio.is_final());
        assert!(!MediaType::Unknown.is_final());
    }

    #[test]
    fn test_media_file_from_missing_path() {
        let result = MediaFile::from_path("/nonexistent/upload.mkv");
        assert!(result.is_err());
    }

    #[test]
    fn test_media_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mkv");
        std::fs::write(&path, b"not really matroska").unwrap();

        let file = MediaFile::from_path(&path).unwrap();
        assert_eq!(file.original_name, "clip.mkv");
        assert_eq!(file.size_bytes, 19);
        assert!(file.mime_hint.is_none());
    }
}
