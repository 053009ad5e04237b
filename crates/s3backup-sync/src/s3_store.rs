//! S3 object store adapter
//!
//! Implements [`IObjectStore`] over the AWS SDK. Works against AWS itself
//! and S3-compatible services (MinIO, Ceph, R2) through a custom endpoint
//! with path-style addressing.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart};
use aws_sdk_s3::Client;
use s3backup_core::config::AwsConfig;
use s3backup_core::ports::{CompletedPart, IObjectStore, MultipartHandle};
use tracing::{debug, info};

/// Provider name attached to statically configured credentials
const CREDENTIALS_SOURCE: &str = "s3backup-config";

/// [`IObjectStore`] backed by an S3 client
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Builds a client from the `aws` configuration section
    ///
    /// Static credentials are used when both keys are configured; otherwise
    /// the default provider chain resolves them on first request.
    pub async fn connect(config: &AwsConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                CREDENTIALS_SOURCE,
            ));
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            path_style = config.force_path_style,
            "S3 client configured"
        );
        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

fn sdk_error<E, R>(err: SdkError<E, R>) -> anyhow::Error
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    anyhow!("{}", DisplayErrorContext(&err))
}

fn sdk_part_number(n: u32) -> anyhow::Result<i32> {
    i32::try_from(n).with_context(|| format!("part number {n} out of range"))
}

/// Converts recorded parts into the SDK completion payload
fn completed_upload(parts: &[CompletedPart]) -> anyhow::Result<CompletedMultipartUpload> {
    let parts = parts
        .iter()
        .map(|part| {
            Ok(SdkCompletedPart::builder()
                .part_number(sdk_part_number(part.part_number)?)
                .e_tag(&part.etag)
                .build())
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
}

#[async_trait]
impl IObjectStore for S3ObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(false),
            Err(err) => Err(sdk_error(err)),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn initiate_multipart(&self, bucket: &str, key: &str) -> anyhow::Result<MultipartHandle> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| anyhow!("store returned no upload id for {key}"))?;

        debug!(bucket, key, upload_id, "multipart upload initiated");
        Ok(MultipartHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        data: &[u8],
    ) -> anyhow::Result<String> {
        let output = self
            .client
            .upload_part()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .part_number(sdk_part_number(part_number)?)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(sdk_error)?;
        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("store returned no ETag for part {part_number} of {handle}"))
    }

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> anyhow::Result<()> {
        self.client
            .complete_multipart_upload()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .multipart_upload(completed_upload(parts)?)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn abort_multipart(&self, handle: &MultipartHandle) -> anyhow::Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}
