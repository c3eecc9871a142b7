//! S3 implementation of [`ObjectStore`].
//!
//! Uses static access keys from the configuration. An endpoint override
//! switches to path-style addressing for S3-compatible stores such as MinIO.

use crate::config::StorageCredentials;
use crate::error::{SyncError, SyncResult};
use crate::store::{ObjectStore, ObjectSummary, StoredObject};
use crate::types::ObjectMetadata;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::HashMap;
use tracing::debug;

/// S3 object store bound to one bucket.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from static credentials. No request is made until
    /// the first operation, so incomplete credentials surface there.
    pub fn new(creds: &StorageCredentials) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            &creds.access_key_id,
            &creds.secret_access_key,
            None,
            None,
            "tmsync-static",
        );

        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(aws_types::region::Region::new(creds.region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        if let Some(ref endpoint) = creds.endpoint {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: creds.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_metadata(&self, key: &str) -> SyncResult<ObjectMetadata> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SyncError::Storage(format!("head object failed for {key}: {e}")))?;

        Ok(to_metadata(resp.metadata()))
    }
}

fn to_metadata(raw: Option<&HashMap<String, String>>) -> ObjectMetadata {
    raw.map(|m| {
        m.iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, metadata: ObjectMetadata) -> SyncResult<()> {
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_metadata(Some(metadata.into_iter().collect()))
            .send()
            .await
            .map_err(|e| SyncError::Storage(format!("upload failed for {key}: {e}")))?;

        debug!("uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> SyncResult<Option<StoredObject>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(SyncError::Storage(format!("download failed for {key}: {e}")));
            }
        };

        let metadata = to_metadata(resp.metadata());
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| SyncError::Storage(format!("failed to read body for {key}: {e}")))?;

        let data = body.into_bytes().to_vec();
        debug!(
            "downloaded {} bytes from s3://{}/{key}",
            data.len(),
            self.bucket
        );
        Ok(Some(StoredObject { data, metadata }))
    }

    /// Lists every object under `prefix`, following continuation tokens.
    /// S3 listings carry no user metadata, so each object is HEADed.
    async fn list(&self, prefix: &str) -> SyncResult<Vec<ObjectSummary>> {
        let mut summaries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| SyncError::Storage(format!("list failed for prefix {prefix}: {e}")))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                let metadata = self.head_metadata(key).await?;
                summaries.push(ObjectSummary {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(|t| t.to_millis().ok()),
                    metadata,
                });
            }

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(
            "listed {} objects under s3://{}/{prefix}",
            summaries.len(),
            self.bucket
        );
        Ok(summaries)
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SyncError::Storage(format!("delete failed for {key}: {e}")))?;

        debug!("deleted s3://{}/{key}", self.bucket);
        Ok(())
    }
}
