//! Fedora repository client
//!
//! Implements the two-phase protocol against a Fedora Commons HTTP
//! interface:
//! 1. binary create - POST the file's bytes to the destination container;
//!    the response body is the new object's URL
//! 2. metadata annotate - PATCH a SPARQL-Update document to the object's
//!    `fcr:metadata` sub-resource
//!
//! The created object's URL is per-instance state: one client serves one
//! file, and `annotate` refuses to run (without touching the network) when
//! no upload has succeeded on the same instance.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::types::{MediaFile, ObjectRepository};

/// Media type of the phase-2 request body
const SPARQL_UPDATE_MIME: &str = "application/sparql-update";

/// Metadata sub-resource of a Fedora object
const METADATA_SUFFIX: &str = "fcr:metadata";

/// Default bound on each HTTP call
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Namespace declarations prepended to every update body
const SPARQL_PREAMBLE: &str = "\
PREFIX ebucore: <http://www.ebu.ch/metadata/ontologies/ebucore/ebucore#>
PREFIX dc: <http://purl.org/dc/elements/1.1/>
PREFIX premis: <http://www.loc.gov/premis/rdf/v1#>

";

/// Characters escaped in the Content-Disposition filename parameter.
/// Bytes above 0x7F are always percent-encoded.
const FILENAME_ESCAPE: &AsciiSet = &CONTROLS.add(b'"').add(b'\\').add(b'%');

/// Phase 1 errors. Any of these means no object identity was retained.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Local file could not be opened or read
    #[error("failed to read staged file: {0}")]
    Io(#[from] std::io::Error),

    /// Request never completed (connect failure, timeout, ...)
    #[error("repository request failed: {0}")]
    Transport(String),

    /// Repository answered with a non-success status
    #[error("repository returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx answer without an object URL in the body
    #[error("repository returned an empty object URL")]
    EmptyBody,
}

/// Phase 2 errors. All of these are non-fatal for the ingest as a whole.
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// No successful upload happened on this client instance
    #[error("no uploaded object to annotate")]
    NoUpload,

    /// Request never completed
    #[error("metadata request failed: {0}")]
    Transport(String),

    /// Repository rejected the update
    #[error("repository rejected metadata update with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Fedora repository client, bound to one destination container.
pub struct FedoraClient {
    http: Client,
    base_url: String,
    container_path: String,
    username: String,
    password: String,
    /// Object URL retained between the two phases
    object_url: Option<String>,
}

impl FedoraClient {
    /// Create a client with the default per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        container_path: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::with_timeout(base_url, container_path, username, password, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        container_path: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
            container_path: container_path.into(),
            username: username.into(),
            password: password.into(),
            object_url: None,
        }
    }

    /// URL of the created object, once phase 1 has succeeded.
    pub fn object_url(&self) -> Option<&str> {
        self.object_url.as_deref()
    }

    fn container_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.container_path.trim_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl ObjectRepository for FedoraClient {
    async fn upload_binary(&mut self, file: &MediaFile) -> Result<String, UploadError> {
        let mime = detect_mime(file);
        let destination = self.container_url();

        debug!(
            file = %file.local_path.display(),
            destination = %destination,
            mime = %mime,
            "uploading binary to repository"
        );

        // The handle is owned by the body stream and dropped with it on
        // every exit path.
        let handle = tokio::fs::File::open(&file.local_path).await?;
        let length = handle.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(handle));

        let response = self
            .http
            .post(&destination)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, mime)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_DISPOSITION, content_disposition(&file.original_name))
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status { status, body });
        }

        let object_url = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?
            .trim()
            .to_string();

        if object_url.is_empty() {
            return Err(UploadError::EmptyBody);
        }

        info!(object_url = %object_url, "repository object created");
        self.object_url = Some(object_url.clone());

        Ok(object_url)
    }

    async fn annotate(&self, properties: &[(String, String)]) -> Result<(), AnnotateError> {
        let Some(object_url) = self.object_url.as_deref() else {
            return Err(AnnotateError::NoUpload);
        };

        let endpoint = metadata_url(object_url);
        let body = build_update_body(properties);

        debug!(
            endpoint = %endpoint,
            statements = properties.len(),
            "annotating repository object"
        );

        let response = self
            .http
            .patch(&endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, SPARQL_UPDATE_MIME)
            .body(body)
            .send()
            .await
            .map_err(|e| AnnotateError::Transport(e.to_string()))?;

        // Fedora answers 204 No Content on acceptance; any 2xx is fine
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(AnnotateError::Status { status, body })
        }
    }
}

/// Metadata sub-resource address for an object URL.
fn metadata_url(object_url: &str) -> String {
    format!("{}/{}", object_url.trim_end_matches('/'), METADATA_SUFFIX)
}

/// Sniff the upload's MIME type from its content, falling back to the
/// host's hint, then to the octet-stream default.
fn detect_mime(file: &MediaFile) -> String {
    if let Ok(Some(kind)) = infer::get_from_path(&file.local_path) {
        return kind.mime_type().to_string();
    }
    file.mime_hint
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Content-Disposition header value carrying the original filename.
fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"",
        utf8_percent_encode(filename, FILENAME_ESCAPE)
    )
}

/// Build the SPARQL-Update document: fixed prefixes, then one
/// relative-subject triple per property inside a single INSERT block. No
/// DELETE clause; the repository merges into the object's description.
fn build_update_body(properties: &[(String, String)]) -> String {
    let mut body = String::from(SPARQL_PREAMBLE);
    body.push_str("INSERT {\n");
    for (property, value) in properties {
        body.push_str("  <> ");
        body.push_str(property);
        body.push_str(" \"");
        body.push_str(&escape_literal(value));
        body.push_str("\" .\n");
    }
    body.push_str("}\nWHERE { }\n");
    body
}

/// Escape a value for embedding in a SPARQL string literal. An unescaped
/// quote in a probe value must never terminate the literal early.
fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("AVC"), "AVC");
        assert_eq!(escape_literal(r#"12" single"#), r#"12\" single"#);
        assert_eq!(escape_literal("a\\b"), "a\\\\b");
        assert_eq!(escape_literal("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_literal("tab\there"), "tab\\there");
    }

    #[test]
    fn test_update_body_shape() {
        let properties = vec![
            ("ebucore:hasFormat".to_string(), "AVC".to_string()),
            ("ebucore:width".to_string(), "1920".to_string()),
        ];
        let body = build_update_body(&properties);

        assert!(body.starts_with("PREFIX ebucore:"));
        assert!(body.contains("PREFIX dc:"));
        assert!(body.contains("PREFIX premis:"));
        assert!(body.contains("INSERT {"));
        assert!(body.contains("  <> ebucore:hasFormat \"AVC\" .\n"));
        assert!(body.contains("  <> ebucore:width \"1920\" .\n"));
        assert!(body.ends_with("}\nWHERE { }\n"));
        assert!(!body.contains("DELETE"));
    }

    #[test]
    fn test_update_body_escapes_quotes() {
        let properties = vec![(
            "dc:title".to_string(),
            "a \"quoted\" title".to_string(),
        )];
        let body = build_update_body(&properties);

        assert!(body.contains(r#"<> dc:title "a \"quoted\" title" ."#));
        // every interior quote is escaped, so the literal has exactly one
        // opening and one closing terminator
        let line = body.lines().find(|l| l.contains("dc:title")).unwrap();
        let unescaped_quotes = line.matches('"').count() - line.matches("\\\"").count();
        assert_eq!(unescaped_quotes, 2);
    }

    #[test]
    fn test_metadata_url() {
        assert_eq!(
            metadata_url("https://repo.example/coll/obj1"),
            "https://repo.example/coll/obj1/fcr:metadata"
        );
        assert_eq!(
            metadata_url("https://repo.example/coll/obj1/"),
            "https://repo.example/coll/obj1/fcr:metadata"
        );
    }

    #[test]
    fn test_container_url_slash_handling() {
        let client = FedoraClient::new(
            "http://repo.example:8080/rest/",
            "/collection/media/",
            "fedoraAdmin",
            "secret",
        );
        assert_eq!(
            client.container_url(),
            "http://repo.example:8080/rest/collection/media"
        );
    }

    #[test]
    fn test_content_disposition_encoding() {
        assert_eq!(
            content_disposition("clip.mkv"),
            "attachment; filename=\"clip.mkv\""
        );
        // quotes cannot break out of the parameter
        assert_eq!(
            content_disposition("a\"b.mkv"),
            "attachment; filename=\"a%22b.mkv\""
        );
        // non-ASCII names are percent-encoded
        assert_eq!(
            content_disposition("café.mp4"),
            "attachment; filename=\"caf%C3%A9.mp4\""
        );
    }

    #[tokio::test]
    async fn test_annotate_requires_prior_upload() {
        let client = FedoraClient::new(
            "http://repo.example:8080/rest",
            "collection",
            "fedoraAdmin",
            "secret",
        );
        // no upload happened on this instance: the call must fail before
        // any request is issued
        let result = client
            .annotate(&[("dc:title".to_string(), "x".to_string())])
            .await;
        assert!(matches!(result, Err(AnnotateError::NoUpload)));
        assert!(client.object_url().is_none());
    }
}
