//! S3-backed `ObjectStore`.

use crate::errors::{CoreResult, TransportError};
use crate::ports::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, warn};

/// Non-current object versions are kept for this many days before the
/// bucket's lifecycle rule expires them: the 5 most recent noncurrent
/// versions are kept for 1 day.
pub const NONCURRENT_VERSION_RETENTION_DAYS: i32 = 1;
pub const NONCURRENT_VERSIONS_TO_KEEP: i32 = 5;

#[derive(Debug)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_region(region: &str, bucket: impl Into<String>) -> Self {
        let sdk_config = super::load_sdk_config(region).await;
        Self::new(Client::new(&sdk_config), bucket)
    }

    /// Ensure the bucket carries the versioning + lifecycle policy the
    /// agent relies on for safe, resumable artefact publication. Called
    /// once at startup; idempotent.
    pub async fn ensure_retention_policy(&self) -> CoreResult<()> {
        self.client
            .put_bucket_versioning()
            .bucket(&self.bucket)
            .versioning_configuration(
                aws_sdk_s3::types::VersioningConfiguration::builder()
                    .status(aws_sdk_s3::types::BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| TransportError::new(format!("failed to enable bucket versioning: {e}")))?;

        let rule = aws_sdk_s3::types::LifecycleRule::builder()
            .id("agent-noncurrent-version-retention")
            .status(aws_sdk_s3::types::ExpirationStatus::Enabled)
            .filter(aws_sdk_s3::types::LifecycleRuleFilter::Prefix(String::new()))
            .noncurrent_version_expiration(
                aws_sdk_s3::types::NoncurrentVersionExpiration::builder()
                    .noncurrent_days(NONCURRENT_VERSION_RETENTION_DAYS)
                    .newer_noncurrent_versions(NONCURRENT_VERSIONS_TO_KEEP)
                    .build(),
            )
            .build()
            .map_err(|e| TransportError::new(format!("invalid lifecycle rule: {e}")))?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(&self.bucket)
            .lifecycle_configuration(
                aws_sdk_s3::types::BucketLifecycleConfiguration::builder()
                    .rules(rule)
                    .build()
                    .map_err(|e| TransportError::new(format!("invalid lifecycle configuration: {e}")))?,
            )
            .send()
            .await
            .map_err(|e| TransportError::new(format!("failed to set bucket lifecycle: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()> {
        debug!(bucket = %self.bucket, key, len = bytes.len(), "s3.put");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("s3 put_object {key} failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(out) => {
                let bytes = out
                    .body
                    .collect()
                    .await
                    .map_err(|e| TransportError::new(format!("s3 get_object {key} body read failed: {e}")))?
                    .into_bytes();
                Ok(Some(bytes.to_vec()))
            }
            Err(e) => {
                if is_not_found(&e) {
                    Ok(None)
                } else {
                    Err(TransportError::new(format!("s3 get_object {key} failed: {e}")).into())
                }
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> CoreResult<()> {
        for key in keys {
            if let Err(e) = self.client.delete_object().bucket(&self.bucket).key(key).send().await {
                // Delete failures are non-fatal; the caller surfaces them
                // as a `Warning` rather than aborting the tick.
                warn!(key, error = %e, "s3.delete.failed");
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &str, exclude_folders: bool) -> CoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| TransportError::new(format!("s3 list_objects_v2 {prefix} failed: {e}")))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    if exclude_folders && key.ends_with('/') {
                        continue;
                    }
                    keys.push(key.to_string());
                }
            }

            continuation_token = output.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }
        Ok(keys)
    }

    async fn folder_exists(&self, prefix: &str) -> CoreResult<bool> {
        let normalized = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&normalized)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("s3 list_objects_v2 {normalized} failed: {e}")))?;
        Ok(output.key_count().unwrap_or(0) > 0)
    }
}

fn is_not_found<E>(error: &aws_sdk_s3::error::SdkError<E>) -> bool
where
    E: std::fmt::Debug,
{
    matches!(
        error,
        aws_sdk_s3::error::SdkError::ServiceError(ctx) if format!("{:?}", ctx.err()).contains("NoSuchKey")
    )
}
