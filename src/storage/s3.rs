use super::{ObjectStore, StorageError, StoredObject};
use crate::config::Config;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use std::time::Duration;
use time::OffsetDateTime;

/// Amazon S3 (or S3-compatible) bucket holding uploaded documents.
///
/// Credentials come from the SDK's default provider chain, so environment variables, profile
/// files, and IAM roles for service accounts all work without extra configuration.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Wrap an existing SDK client.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a store from the runtime configuration.
    pub async fn from_config(config: &Config) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.s3_endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::debug!(
            bucket = %config.s3_bucket,
            region = %config.aws_region,
            endpoint = ?config.s3_endpoint_url,
            "Initialized S3 client"
        );

        Self::new(Client::from_conf(builder.build()), config.s3_bucket.clone())
    }
}

fn backend_error<E, R>(error: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::Backend(DisplayErrorContext(error).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(backend_error)?;
        tracing::debug!(bucket = %self.bucket, key, size, "Object stored");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(backend_error)?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let last_modified = object
                    .last_modified()
                    .and_then(|modified| OffsetDateTime::from_unix_timestamp(modified.secs()).ok());
                objects.push(StoredObject {
                    key: key.to_string(),
                    last_modified,
                });
            }
        }

        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => {
                if error
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key())
                {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(backend_error(error));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|error| StorageError::Backend(error.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|error| StorageError::Backend(error.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(backend_error)?;
        Ok(Some(request.uri().to_string()))
    }
}
