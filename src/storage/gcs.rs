//! Cloud Storage through its S3-compatible XML API.
//!
//! The interoperability endpoint accepts HMAC keys and the S3 wire
//! protocol, so the regular S3 client is pointed at it with a custom
//! endpoint and path-style addressing.

use std::path::Path;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::Length;
use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::BlobStore;
use crate::cancel::CancelToken;
use crate::config::{ApiConfig, RetryPolicy};
use crate::retry::with_backoff;
use crate::utils::gs_uri;
use crate::{Error, Result};

/// Files above this size go up in parts of this size.
const CHUNK_SIZE: u64 = 1024 * 1024 * 5;
const MAX_CHUNKS: u64 = 10000;

pub struct GcsStore {
    client: Client,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl GcsStore {
    /// Build a client for `api.storage_endpoint`.
    ///
    /// Without HMAC credentials requests are sent unsigned, which is
    /// enough for reading public buckets.
    pub async fn connect(api: &ApiConfig, retry: RetryPolicy, cancel: CancelToken) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(&api.storage_endpoint)
            .retry_config(RetryConfig::disabled());
        loader = match &api.storage_credentials {
            Some(creds) => loader.credentials_provider(Credentials::new(
                &creds.access_id,
                &creds.secret,
                None,
                None,
                "gcs-hmac",
            )),
            None => loader.no_credentials(),
        };
        let sdk_config = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            retry,
            cancel,
        }
    }

    async fn put_single(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| local_read_error(path, e))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| sdk_transfer_error(path.display().to_string(), e))?;
        Ok(())
    }

    async fn put_multipart(&self, bucket: &str, key: &str, path: &Path, file_size: u64) -> Result<()> {
        let (chunk_count, size_of_last_chunk) = part_plan(path, file_size)?;

        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_transfer_error(path.display().to_string(), e))?;
        let upload_id = created.upload_id.ok_or_else(|| Error::Transfer {
            path: path.display().to_string(),
            message: "multipart upload started without an upload id".to_string(),
            retryable: true,
        })?;
        debug!(%upload_id, chunk_count, "started multipart upload");

        let result = self
            .upload_parts(bucket, key, path, &upload_id, chunk_count, size_of_last_chunk)
            .await;
        let parts = match result {
            Ok(parts) => parts,
            Err(e) => {
                // Drop the orphaned parts, then report the upload failure.
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(error = %DisplayErrorContext(&abort), "failed to abort multipart upload");
                }
                return Err(e);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_transfer_error(path.display().to_string(), e))?;
        Ok(())
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        upload_id: &str,
        chunk_count: u64,
        size_of_last_chunk: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::with_capacity(chunk_count as usize);
        for chunk_index in 0..chunk_count {
            let this_chunk = if chunk_count - 1 == chunk_index {
                size_of_last_chunk
            } else {
                CHUNK_SIZE
            };
            let stream = ByteStream::read_from()
                .path(path)
                .offset(chunk_index * CHUNK_SIZE)
                .length(Length::Exact(this_chunk))
                .build()
                .await
                .map_err(|e| local_read_error(path, e))?;
            // Part numbers start at 1.
            let part_number = (chunk_index as i32) + 1;
            let uploaded = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .body(stream)
                .part_number(part_number)
                .send()
                .await
                .map_err(|e| sdk_transfer_error(path.display().to_string(), e))?;
            trace!(part_number, this_chunk, "uploaded part");

            parts.push(
                CompletedPart::builder()
                    .e_tag(uploaded.e_tag.unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
        }
        Ok(parts)
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let file_size = tokio::fs::metadata(path)
            .await
            .map_err(|e| local_read_error(path, e))?
            .len();

        with_backoff(&format!("upload {}", path.display()), &self.retry, &self.cancel, || async move {
            if file_size > CHUNK_SIZE {
                self.put_multipart(bucket, key, path, file_size).await
            } else {
                self.put_single(bucket, key, path).await
            }
        })
        .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let uri = gs_uri(bucket, key);
        let uri = uri.as_str();
        with_backoff(&format!("download {uri}"), &self.retry, &self.cancel, || async move {
            trace!(bucket, key, "get object");
            let object = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().map(|s| s.is_no_such_key()).unwrap_or(false) {
                        Error::ResourceAbsent(uri.to_string())
                    } else {
                        sdk_transfer_error(uri.to_string(), e)
                    }
                })?;
            let content = object.body.collect().await.map_err(|e| Error::Transfer {
                path: uri.to_string(),
                message: e.to_string(),
                retryable: true,
            })?;
            Ok(content.into_bytes())
        })
        .await
    }
}

/// Number of parts for a file of `file_size` bytes, and the size of the
/// last one.
fn part_plan(path: &Path, file_size: u64) -> Result<(u64, u64)> {
    let mut chunk_count = (file_size / CHUNK_SIZE) + 1;
    let mut size_of_last_chunk = file_size % CHUNK_SIZE;
    if size_of_last_chunk == 0 {
        size_of_last_chunk = CHUNK_SIZE;
        chunk_count -= 1;
    }
    if chunk_count > MAX_CHUNKS {
        return Err(Error::Transfer {
            path: path.display().to_string(),
            message: format!("{file_size} bytes needs more than {MAX_CHUNKS} parts"),
            retryable: false,
        });
    }
    Ok((chunk_count, size_of_last_chunk))
}

fn local_read_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Transfer {
        path: path.display().to_string(),
        message: e.to_string(),
        retryable: false,
    }
}

fn sdk_transfer_error<E>(path: String, err: SdkError<E, HttpResponse>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let retryable = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            status == 429 || status >= 500
        }
        _ => false,
    };
    Error::Transfer {
        path,
        message: DisplayErrorContext(&err).to_string(),
        retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::body::SdkBody;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn part_sizes() {
        let path = Path::new("big.vds");
        assert_eq!(part_plan(path, 5 * MIB + 1).unwrap(), (2, 1));
        assert_eq!(part_plan(path, 10 * MIB).unwrap(), (2, 5 * MIB));
        assert_eq!(part_plan(path, 10 * MIB + 1).unwrap(), (3, 1));
        assert_eq!(part_plan(path, CHUNK_SIZE * MAX_CHUNKS).unwrap(), (MAX_CHUNKS, CHUNK_SIZE));
    }

    #[test]
    fn too_many_parts_is_rejected() {
        let err = part_plan(Path::new("huge.bin"), CHUNK_SIZE * MAX_CHUNKS + 1).unwrap_err();
        assert!(matches!(err, Error::Transfer { retryable: false, .. }));
    }

    fn service_error(status: u16) -> SdkError<GetObjectError, HttpResponse> {
        let raw = HttpResponse::new(StatusCode::try_from(status).unwrap(), SdkBody::empty());
        SdkError::service_error(
            GetObjectError::generic(ErrorMetadata::builder().code("Boom").build()),
            raw,
        )
    }

    #[test]
    fn service_errors_are_classified_by_status() {
        for (status, retryable) in [(500, true), (503, true), (429, true), (403, false), (404, false)] {
            match sdk_transfer_error("gs://b/k".to_string(), service_error(status)) {
                Error::Transfer { retryable: r, .. } => assert_eq!(r, retryable, "HTTP {status}"),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn timeouts_are_retryable() {
        let err: SdkError<GetObjectError, HttpResponse> = SdkError::timeout_error("slow");
        assert!(sdk_transfer_error("gs://b/k".to_string(), err).is_retryable());
    }
}
