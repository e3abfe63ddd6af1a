//! Configuration loading for fedingest
//!
//! Resolution follows CLI argument -> `FEDINGEST_*` environment -> TOML
//! file -> compiled-in default, highest first. The TOML file is looked up
//! at an explicit path, then `$FEDINGEST_CONFIG`, then the platform config
//! directory (`~/.config/fedingest/config.toml` on Linux).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::services::metadata_mapper::{
    build_default_field_maps, default_type_codes, FallbackTable, MetadataMapper,
};
use crate::types::{DerivedAttributes, TrackType};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {}", .path.display(), .message)]
    Parse { path: PathBuf, message: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub attributes: AttributeTargets,
    #[serde(default)]
    pub ontology: OntologySettings,
}

/// Repository connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySettings {
    /// Repository base URL, e.g. `http://fedora.example:8080/rest`
    #[serde(default)]
    pub base_url: String,
    /// Destination container below the base URL
    #[serde(default)]
    pub container_path: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Bound on each HTTP call
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            container_path: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Probe tool settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Probe binary, resolved through PATH unless absolute
    #[serde(default = "default_probe_binary")]
    pub binary: String,
    /// Bound on one probe invocation
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            binary: default_probe_binary(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

/// Identifiers of the host's target attributes. Unset targets are skipped
/// when translating an outcome into attribute writes; the identifiers are
/// opaque to this crate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeTargets {
    pub object_url: Option<String>,
    pub file_name: Option<String>,
    pub media_type: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub hash: Option<String>,
}

impl AttributeTargets {
    /// Translate derived attributes into `(target, value)` writes, skipping
    /// unconfigured targets and values the source material did not provide.
    pub fn writes_for(&self, attrs: &DerivedAttributes) -> Vec<(String, String)> {
        let mut writes = Vec::new();

        if let Some(target) = &self.object_url {
            writes.push((target.clone(), attrs.object_url.clone()));
        }
        if let Some(target) = &self.file_name {
            writes.push((target.clone(), attrs.file_name.clone()));
        }
        if let Some(target) = &self.media_type {
            writes.push((target.clone(), attrs.media_type.clone()));
        }
        if let (Some(target), Some(format)) = (&self.format, &attrs.format) {
            writes.push((target.clone(), format.clone()));
        }
        if let Some(target) = &self.size {
            writes.push((target.clone(), attrs.size_bytes.to_string()));
        }
        if let (Some(target), Some(dimensions)) = (&self.quality, &attrs.dimensions) {
            writes.push((target.clone(), dimensions.clone()));
        }
        if let (Some(target), Some(digest)) = (&self.hash, &attrs.digest) {
            writes.push((target.clone(), digest.clone()));
        }

        writes
    }
}

/// Overrides for the compiled-in ontology tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OntologySettings {
    /// Per-track-type probe-key -> canonical-property entries, merged over
    /// the compiled-in field maps (keys: General, Video, Audio, Image,
    /// Text)
    #[serde(default)]
    pub field_maps: HashMap<String, HashMap<String, String>>,
    /// Media type fallback table; replaces the default table when non-empty
    #[serde(default)]
    pub type_codes: HashMap<String, String>,
    /// Format fallback table; empty means raw labels pass through
    #[serde(default)]
    pub format_codes: HashMap<String, String>,
}

impl IngestConfig {
    /// Load configuration, layering environment overrides on top of the
    /// resolved TOML file (or the defaults when no file exists).
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse one TOML file without environment layering or validation.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("FEDINGEST_REPO_URL") {
            self.repository.base_url = value;
        }
        if let Ok(value) = std::env::var("FEDINGEST_REPO_CONTAINER") {
            self.repository.container_path = value;
        }
        if let Ok(value) = std::env::var("FEDINGEST_REPO_USERNAME") {
            self.repository.username = value;
        }
        if let Ok(value) = std::env::var("FEDINGEST_REPO_PASSWORD") {
            self.repository.password = value;
        }
        if let Ok(value) = std::env::var("FEDINGEST_PROBE_BINARY") {
            self.probe.binary = value;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("repository.base_url"));
        }
        Ok(())
    }

    /// Build the mapping engine: compiled-in tables with this
    /// configuration's overrides applied.
    pub fn mapper(&self) -> MetadataMapper {
        let mut field_maps = build_default_field_maps();
        for (type_name, overrides) in &self.ontology.field_maps {
            let track_type = TrackType::from_type_name(type_name);
            field_maps
                .entry(track_type)
                .or_default()
                .extend(overrides.clone());
        }

        let type_codes = if self.ontology.type_codes.is_empty() {
            default_type_codes()
        } else {
            FallbackTable::new(self.ontology.type_codes.clone())
        };

        let format_codes = FallbackTable::new(self.ontology.format_codes.clone());

        MetadataMapper::new(field_maps, type_codes, format_codes)
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_secs(self.repository.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("FEDINGEST_CONFIG") {
        return Some(PathBuf::from(path));
    }
    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("fedingest").join("config.toml");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn default_http_timeout() -> u64 {
    120
}

fn default_probe_binary() -> String {
    "mediainfo".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}
