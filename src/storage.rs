use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ValidationError;

/// How long a presigned upload URL stays valid.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// StorageError
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("presigning failed: {0}")]
    Presign(String),

    #[error("simulated storage failure")]
    Simulated,
}

/// MediaKind
///
/// The two kinds of media a lesson can attach through an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Video,
}

impl MediaKind {
    /// Only PDFs and videos are accepted as lesson media.
    pub fn from_content_type(content_type: &str) -> Result<Self, ValidationError> {
        let normalized = content_type.trim().to_ascii_lowercase();
        if normalized == "application/pdf" {
            Ok(MediaKind::Pdf)
        } else if normalized.starts_with("video/") && normalized.len() > "video/".len() {
            Ok(MediaKind::Video)
        } else {
            Err(ValidationError::UnsupportedContentType(content_type.to_string()))
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            MediaKind::Pdf => "lessons/pdf",
            MediaKind::Video => "lessons/video",
        }
    }
}

/// Builds a fresh object key (`lessons/<kind>/<uuid>.<ext>`) for an upload.
/// Only the extension of the client filename is kept, so the key can never
/// contain path components chosen by the client.
pub fn media_object_key(kind: MediaKind, filename: &str) -> String {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| match kind {
            MediaKind::Pdf => "pdf".to_string(),
            MediaKind::Video => "bin".to_string(),
        });
    format!("{}/{}.{}", kind.prefix(), Uuid::new_v4(), extension)
}

/// StorageService
///
/// Contract for the object storage that hosts uploaded lesson PDFs and videos.
/// The lesson itself only stores the resulting URL.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` against MinIO.
    async fn ensure_bucket_exists(&self);

    /// A time-limited URL allowing a client to PUT `key` with `content_type`.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// The permanent read URL of `key` once it has been uploaded.
    fn public_url(&self, key: &str) -> String;
}

/// S3StorageClient
///
/// `StorageService` over the AWS SDK. `force_path_style(true)` keeps it
/// compatible with MinIO and other S3-compatible gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    endpoint: String,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Already-exists errors land here too.
            tracing::debug!(bucket = %self.bucket_name, error = ?e, "create_bucket skipped");
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }

    // Path style, same as the presigned requests.
    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, key)
    }
}

const MOCK_BUCKET_URL: &str = "http://localhost:9000/mock-bucket";

/// MockStorageService
///
/// Test double for `StorageService`; never touches the network.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Simulated);
        }
        Ok(format!("{}?signature=fake", self.public_url(key)))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{MOCK_BUCKET_URL}/{key}")
    }
}

/// StorageState
pub type StorageState = Arc<dyn StorageService>;
