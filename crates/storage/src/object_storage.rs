//! Object storage implementation using S3/MinIO
//!
//! Stores resolved video files and hands back the URL the rest of the
//! pipeline refers to them by.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Path prefix for all objects (e.g., "uploads/")
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "deepfake-analysis".to_string()),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-west-2".to_string()),
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            prefix: String::new(),
        }
    }
}

impl S3Config {
    /// Public URL for an object key in this bucket
    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }
}

/// Object storage trait
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store a file and return the URL it is reachable under
    async fn upload(&self, key: &str, data: &[u8]) -> StorageResult<String>;

    /// Retrieve a file as bytes
    async fn retrieve(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// S3/MinIO object storage implementation
pub struct S3ObjectStorage {
    client: Client,
    config: S3Config,
}

impl S3ObjectStorage {
    /// Create a new S3 object storage client
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "deepfake-storage",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for MinIO
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        Ok(Self { client, config })
    }

    /// Combine prefix with key
    fn full_key(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.config.prefix, key)
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn upload(&self, key: &str, data: &[u8]) -> StorageResult<String> {
        let full_key = self.full_key(key);
        let byte_stream = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .body(byte_stream)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(format!("Failed to store {full_key}: {e}")))?;

        tracing::debug!("Stored {} bytes at {}", data.len(), full_key);
        Ok(self.config.object_url(&full_key))
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_key = self.full_key(key);

        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(format!("Failed to retrieve {full_key}: {e}")))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3Error(format!("Failed to read {full_key}: {e}")))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(format!("Failed to delete {full_key}: {e}")))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);

        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::S3Error(format!(
                        "Failed to check {full_key}: {service_error}"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_with_endpoint() {
        let config = S3Config {
            bucket: "videos".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000/".to_string()),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            prefix: String::new(),
        };

        assert_eq!(
            config.object_url("user/a.mp4"),
            "http://localhost:9000/videos/user/a.mp4"
        );
    }

    #[test]
    fn test_object_url_aws_style() {
        let config = S3Config {
            bucket: "videos".to_string(),
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            prefix: String::new(),
        };

        assert_eq!(
            config.object_url("a.mp4"),
            "https://videos.s3.us-west-2.amazonaws.com/a.mp4"
        );
    }
}
