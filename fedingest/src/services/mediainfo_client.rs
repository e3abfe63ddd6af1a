//! MediaInfo probe client
//!
//! Invokes the external `mediainfo` command-line tool with JSON output and
//! parses the reported stream list into `Track` records.
//!
//! Availability of the binary is verified proactively at construction so the
//! pipeline can short-circuit before touching the repository. The invocation
//! passes the file path as a discrete argument (no shell involved) and is
//! bounded by a timeout; a hung tool is reported as unavailable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::types::{Track, TrackType};

/// Default probe binary, resolved through PATH
const DEFAULT_BINARY: &str = "mediainfo";

/// Default bound on one probe invocation
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe errors
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Probe binary missing, not executable, or hung past the timeout
    #[error("probe tool unavailable: {0}")]
    Unavailable(String),

    /// Tool ran but exited non-zero
    #[error("probe tool failed (exit code {code:?}): {stderr}")]
    ExecutionFailed {
        code: Option<i32>,
        stderr: String,
    },

    /// Output was not well-formed JSON or lacked the track collection
    #[error("failed to parse probe output: {0}")]
    Parse(String),

    /// Input file does not exist
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

/// MediaInfo client
///
/// One instance is shared across requests; it holds no per-file state.
pub struct MediaInfoClient {
    binary_path: String,
    timeout: Duration,
}

impl MediaInfoClient {
    /// Create a new client, verifying the binary responds to `--Version`.
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let binary_path = binary_path.into();

        match std::process::Command::new(&binary_path)
            .arg("--Version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => Ok(Self {
                binary_path,
                timeout,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProbeError::Unavailable(
                format!("{} not found in PATH", binary_path),
            )),
            Err(e) => Err(ProbeError::Unavailable(e.to_string())),
        }
    }

    /// Create a client with the default binary name and timeout.
    pub fn with_defaults() -> Result<Self, ProbeError> {
        Self::new(DEFAULT_BINARY, DEFAULT_TIMEOUT)
    }

    /// Check whether a probe binary is usable without constructing a client.
    pub fn is_available(binary_path: &str) -> bool {
        std::process::Command::new(binary_path)
            .arg("--Version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    /// Probe a media file and return its tracks in report order.
    pub async fn probe(&self, path: &Path) -> Result<Vec<Track>, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::FileNotFound(path.to_path_buf()));
        }

        tracing::debug!(file = %path.display(), "probing media file");

        let mut command = tokio::process::Command::new(&self.binary_path);
        command
            .arg("--Output=JSON")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // kill_on_drop reaps the child if the timeout wins the race
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ProbeError::Unavailable(e.to_string())),
            Err(_) => {
                return Err(ProbeError::Unavailable(format!(
                    "probe timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            return Err(ProbeError::ExecutionFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let tracks = parse_tracks(&output.stdout)?;

        tracing::debug!(
            file = %path.display(),
            track_count = tracks.len(),
            "probe complete"
        );

        Ok(tracks)
    }
}

/// Parse MediaInfo's JSON report into an ordered track list.
///
/// The report shape is `{"media": {"track": [{"@type": "...", ...}, ...]}}`.
/// A report without the track collection is malformed output, not an empty
/// file.
fn parse_tracks(raw: &[u8]) -> Result<Vec<Track>, ProbeError> {
    let json: Value =
        serde_json::from_slice(raw).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let entries = json
        .get("media")
        .and_then(|m| m.get("track"))
        .and_then(|t| t.as_array())
        .ok_or_else(|| ProbeError::Parse("missing media.track collection".to_string()))?;

    Ok(entries.iter().map(parse_track).collect())
}

/// Parse a single track record.
fn parse_track(entry: &Value) -> Track {
    let track_type = entry
        .get("@type")
        .and_then(|t| t.as_str())
        .map(TrackType::from_type_name)
        .unwrap_or(TrackType::Other);

    let mut track = Track::new(track_type);

    if let Some(object) = entry.as_object() {
        for (key, value) in object {
            // "@type"/"@typeorder" are structural, "extra" is a nested bag
            if key.starts_with('@') {
                continue;
            }
            match value {
                Value::String(s) => {
                    track.fields.insert(key.clone(), s.clone());
                }
                Value::Number(n) => {
                    track.fields.insert(key.clone(), n.to_string());
                }
                _ => {}
            }
        }
    }

    track
}
