//! Object storage control-plane seam.
//!
//! The bulk engine and the paginator talk to object storage only through
//! [`ObjectStorage`]; the S3 implementation lives in `aws.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::config::ObjectOptions;
use crate::error::Result;

/// Reference to one object, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectKeyRef {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Version id, for versioned buckets.
    pub version_id: Option<String>,
}

impl ObjectKeyRef {
    /// Creates a reference to the current version of an object.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Pins the reference to a version.
    #[must_use]
    pub fn with_version(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id;
        self
    }
}

impl std::fmt::Display for ObjectKeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)?;
        if let Some(version) = &self.version_id {
            write!(f, "?versionId={version}")?;
        }
        Ok(())
    }
}

/// A bucket plus a key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixRef {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix; empty means the whole bucket.
    pub prefix: String,
}

impl PrefixRef {
    /// Creates a prefix reference.
    #[must_use]
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

/// One listed object or object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    /// Object key.
    pub key: String,
    /// Version id (version-aware listings only).
    pub version_id: Option<String>,
    /// Size in bytes.
    pub size: i64,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag.
    pub etag: Option<String>,
    /// True for delete markers in version-aware listings.
    pub is_delete_marker: bool,
}

impl ObjectEntry {
    /// Creates an entry with only a key set.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
            size: 0,
            last_modified: None,
            etag: None,
            is_delete_marker: false,
        }
    }

    /// Turns the entry into a reference inside `bucket`.
    #[must_use]
    pub fn to_ref(&self, bucket: &str) -> ObjectKeyRef {
        ObjectKeyRef::new(bucket, &self.key).with_version(self.version_id.clone())
    }
}

/// A bucket as returned by the bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSummary {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
}

/// Parameters of a current-version listing request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListObjectsRequest {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix filter.
    pub prefix: Option<String>,
    /// Cursor returned by the previous page.
    pub continuation_token: Option<String>,
}

/// Parameters of a version-aware listing request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListVersionsRequest {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix filter.
    pub prefix: Option<String>,
    /// Key cursor returned by the previous page.
    pub key_marker: Option<String>,
    /// Version cursor returned by the previous page.
    pub version_id_marker: Option<String>,
}

/// One page of a current-version listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingPage {
    /// Entries on this page.
    pub items: Vec<ObjectEntry>,
    /// True if more pages follow.
    pub is_truncated: bool,
    /// Cursor for the next page.
    pub continuation_token: Option<String>,
}

/// One page of a version-aware listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionListingPage {
    /// Versions and delete markers on this page.
    pub items: Vec<ObjectEntry>,
    /// True if more pages follow.
    pub is_truncated: bool,
    /// Key cursor for the next page.
    pub next_key_marker: Option<String>,
    /// Version cursor for the next page.
    pub next_version_id_marker: Option<String>,
}

/// Result of a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyReceipt {
    /// Where the object now lives.
    pub new_location: ObjectKeyRef,
    /// Entity tag of the new object.
    pub etag: Option<String>,
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Where the object was written.
    pub location: ObjectKeyRef,
    /// Entity tag of the new object.
    pub etag: Option<String>,
}

/// Result of a delete-many call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeleteReport {
    /// Keys (or versions) reported deleted.
    pub deleted: usize,
    /// Per-key failures, formatted as `key: message`.
    pub failures: Vec<String>,
}

/// Object operations of the control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Lists all buckets visible to the credentials.
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;

    /// Fetches one page of current-version objects.
    async fn list_objects_page(&self, request: &ListObjectsRequest) -> Result<ListingPage>;

    /// Fetches one page of object versions and delete markers.
    async fn list_object_versions_page(
        &self,
        request: &ListVersionsRequest,
    ) -> Result<VersionListingPage>;

    /// Copies one object server-side.
    async fn copy_object(
        &self,
        source: &ObjectKeyRef,
        destination: &ObjectKeyRef,
        options: &ObjectOptions,
    ) -> Result<CopyReceipt>;

    /// Deletes one object (or one version of it).
    async fn delete_object(&self, target: &ObjectKeyRef) -> Result<()>;

    /// Deletes up to 1000 objects of one bucket in a single call.
    async fn delete_objects(&self, bucket: &str, targets: &[ObjectKeyRef]) -> Result<DeleteReport>;

    /// Uploads a local file.
    async fn put_file(
        &self,
        destination: &ObjectKeyRef,
        source: &Path,
        options: &ObjectOptions,
    ) -> Result<UploadReceipt>;

    /// Streams an object into a local file and returns the bytes written.
    async fn download_to_path(&self, source: &ObjectKeyRef, destination: &Path) -> Result<u64>;
}
