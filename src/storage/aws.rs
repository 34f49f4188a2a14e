//! S3 implementation of [`ObjectStorage`].

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    Delete, MetadataDirective, ObjectCannedAcl, ObjectIdentifier, ServerSideEncryption,
    StorageClass,
};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::ObjectOptions;
use crate::error::{CloudrigError, Result, StorageError};

use super::api::{
    BucketSummary, CopyReceipt, DeleteReport, ListObjectsRequest, ListVersionsRequest,
    ListingPage, ObjectEntry, ObjectKeyRef, ObjectStorage, UploadReceipt, VersionListingPage,
};

/// Object storage backed by the S3 API.
#[derive(Debug, Clone)]
pub struct S3Storage {
    /// SDK client.
    client: Client,
}

impl S3Storage {
    /// Creates the storage from a loaded SDK configuration.
    #[must_use]
    pub fn from_conf(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Creates the storage with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn opt_text<'a>(value: impl Into<Option<&'a str>>) -> Option<String> {
    value.into().map(ToString::to_string)
}

fn flag(value: impl Into<Option<bool>>) -> bool {
    value.into().unwrap_or(false)
}

fn size(value: impl Into<Option<i64>>) -> i64 {
    value.into().unwrap_or_default()
}

fn to_chrono(ts: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

fn api_error<E, R>(operation: &str, err: &SdkError<E, R>) -> CloudrigError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = err
        .as_service_error()
        .and_then(ProvideErrorMetadata::message)
        .map_or_else(|| DisplayErrorContext(err).to_string(), ToString::to_string);
    StorageError::api(operation, message).into()
}

/// Bytes left as-is in a `CopySource` path: unreserved characters and `/`.
const COPY_SOURCE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Formats the `CopySource` header value: URL-encoded `bucket/key`, then the version.
fn copy_source(source: &ObjectKeyRef) -> String {
    let path = utf8_percent_encode(&format!("{}/{}", source.bucket, source.key), COPY_SOURCE_SET)
        .to_string();
    match &source.version_id {
        Some(version) => format!(
            "{path}?versionId={}",
            utf8_percent_encode(version, COPY_SOURCE_SET)
        ),
        None => path,
    }
}

/// Writes `reader` into a new file at `destination`.
///
/// A partially written file is removed when the copy fails.
async fn write_to_file<R>(mut reader: R, destination: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(destination).await?;

    let copied = async {
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok::<u64, std::io::Error>(written)
    }
    .await;

    match copied {
        Ok(written) => Ok(written),
        Err(err) => {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(destination).await {
                warn!("Could not remove partial download {}: {cleanup}", destination.display());
            }
            Err(StorageError::api(
                "GetObject",
                format!("Download to {} interrupted: {err}", destination.display()),
            )
            .into())
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| api_error("ListBuckets", &e))?;

        Ok(output
            .buckets()
            .iter()
            .map(|b| BucketSummary {
                name: opt_text(b.name()).unwrap_or_default(),
                created: b.creation_date().and_then(to_chrono),
            })
            .collect())
    }

    async fn list_objects_page(&self, request: &ListObjectsRequest) -> Result<ListingPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .set_prefix(request.prefix.clone())
            .set_continuation_token(request.continuation_token.clone())
            .send()
            .await
            .map_err(|e| api_error("ListObjectsV2", &e))?;

        Ok(ListingPage {
            items: output
                .contents()
                .iter()
                .map(|o| ObjectEntry {
                    key: opt_text(o.key()).unwrap_or_default(),
                    version_id: None,
                    size: size(o.size()),
                    last_modified: o.last_modified().and_then(to_chrono),
                    etag: opt_text(o.e_tag()),
                    is_delete_marker: false,
                })
                .collect(),
            is_truncated: flag(output.is_truncated()),
            continuation_token: opt_text(output.next_continuation_token()),
        })
    }

    async fn list_object_versions_page(
        &self,
        request: &ListVersionsRequest,
    ) -> Result<VersionListingPage> {
        let output = self
            .client
            .list_object_versions()
            .bucket(&request.bucket)
            .set_prefix(request.prefix.clone())
            .set_key_marker(request.key_marker.clone())
            .set_version_id_marker(request.version_id_marker.clone())
            .send()
            .await
            .map_err(|e| api_error("ListObjectVersions", &e))?;

        let versions = output.versions().iter().map(|v| ObjectEntry {
            key: opt_text(v.key()).unwrap_or_default(),
            version_id: opt_text(v.version_id()),
            size: size(v.size()),
            last_modified: v.last_modified().and_then(to_chrono),
            etag: opt_text(v.e_tag()),
            is_delete_marker: false,
        });
        let markers = output.delete_markers().iter().map(|m| ObjectEntry {
            key: opt_text(m.key()).unwrap_or_default(),
            version_id: opt_text(m.version_id()),
            size: 0,
            last_modified: m.last_modified().and_then(to_chrono),
            etag: None,
            is_delete_marker: true,
        });

        Ok(VersionListingPage {
            items: versions.chain(markers).collect(),
            is_truncated: flag(output.is_truncated()),
            next_key_marker: opt_text(output.next_key_marker()),
            next_version_id_marker: opt_text(output.next_version_id_marker()),
        })
    }

    async fn copy_object(
        &self,
        source: &ObjectKeyRef,
        destination: &ObjectKeyRef,
        options: &ObjectOptions,
    ) -> Result<CopyReceipt> {
        let output = self
            .client
            .copy_object()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .copy_source(copy_source(source))
            .acl(ObjectCannedAcl::from(options.acl.as_str()))
            .storage_class(StorageClass::from(options.storage_class.as_str()))
            .metadata_directive(MetadataDirective::from(options.metadata_directive.as_str()))
            .set_cache_control(options.cache_control.clone())
            .set_content_disposition(options.content_disposition.clone())
            .set_content_encoding(options.content_encoding.clone())
            .set_content_language(options.content_language.clone())
            .set_content_type(options.content_type.clone())
            .set_metadata(options.metadata.clone())
            .set_server_side_encryption(
                options
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_ssekms_key_id(options.sse_kms_key_id.clone())
            .set_tagging(options.tagging.clone())
            .set_website_redirect_location(options.website_redirect_location.clone())
            .send()
            .await
            .map_err(|e| api_error("CopyObject", &e))?;

        let etag = output
            .copy_object_result()
            .and_then(|r| opt_text(r.e_tag()));

        Ok(CopyReceipt {
            new_location: destination
                .clone()
                .with_version(opt_text(output.version_id())),
            etag,
        })
    }

    async fn delete_object(&self, target: &ObjectKeyRef) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .set_version_id(target.version_id.clone())
            .send()
            .await
            .map_err(|e| api_error("DeleteObject", &e))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, targets: &[ObjectKeyRef]) -> Result<DeleteReport> {
        let identifiers = targets
            .iter()
            .map(|t| {
                ObjectIdentifier::builder()
                    .key(&t.key)
                    .set_version_id(t.version_id.clone())
                    .build()
                    .map_err(|e| CloudrigError::internal(format!("Invalid object identifier: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| CloudrigError::internal(format!("Invalid delete request: {e}")))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| api_error("DeleteObjects", &e))?;

        let failures: Vec<String> = output
            .errors()
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.key().unwrap_or_default(),
                    e.message().or(e.code()).unwrap_or("unknown error")
                )
            })
            .collect();

        Ok(DeleteReport {
            deleted: targets.len().saturating_sub(failures.len()),
            failures,
        })
    }

    async fn put_file(
        &self,
        destination: &ObjectKeyRef,
        source: &Path,
        options: &ObjectOptions,
    ) -> Result<UploadReceipt> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StorageError::api("PutObject", format!("Cannot read {}: {e}", source.display())))?;

        let output = self
            .client
            .put_object()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .body(body)
            .acl(ObjectCannedAcl::from(options.acl.as_str()))
            .storage_class(StorageClass::from(options.storage_class.as_str()))
            .set_cache_control(options.cache_control.clone())
            .set_content_disposition(options.content_disposition.clone())
            .set_content_encoding(options.content_encoding.clone())
            .set_content_language(options.content_language.clone())
            .set_content_type(options.content_type.clone())
            .set_metadata(options.metadata.clone())
            .set_server_side_encryption(
                options
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_ssekms_key_id(options.sse_kms_key_id.clone())
            .set_tagging(options.tagging.clone())
            .set_website_redirect_location(options.website_redirect_location.clone())
            .send()
            .await
            .map_err(|e| api_error("PutObject", &e))?;

        Ok(UploadReceipt {
            location: destination
                .clone()
                .with_version(opt_text(output.version_id())),
            etag: opt_text(output.e_tag()),
        })
    }

    async fn download_to_path(&self, source: &ObjectKeyRef, destination: &Path) -> Result<u64> {
        let output = self
            .client
            .get_object()
            .bucket(&source.bucket)
            .key(&source.key)
            .set_version_id(source.version_id.clone())
            .send()
            .await
            .map_err(|e| api_error("GetObject", &e))?;

        let reader = output.body.into_async_read();
        tokio::pin!(reader);
        let written = write_to_file(reader, destination).await?;
        debug!("Wrote {written} bytes to {}", destination.display());
        Ok(written)
    }
}
