//! Bulk object operations engine.
//!
//! Applies single-object primitives (copy, move, delete, upload) across whole
//! prefixes and directories. Per-object calls are strictly serial, with a
//! throttle delay between consecutive calls.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{BulkOptions, ObjectOptions};
use crate::error::{require, ConfigError, Result, StorageError};

use super::api::{
    BucketSummary, CopyReceipt, ListObjectsRequest, ListVersionsRequest, ObjectEntry,
    ObjectKeyRef, ObjectStorage, PrefixRef, UploadReceipt,
};
use super::keys::{file_name_from_key, join_prefix, BulkTransferPlan};
use super::local::walk_directory;
use super::paginator::{list_all, list_all_versions};

/// Maximum keys per delete-many call.
pub const DELETE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copy,
    Move,
}

fn prefix_filter(prefix: &str) -> Option<String> {
    (!prefix.is_empty()).then(|| prefix.to_string())
}

fn require_ref(what: &str, target: &ObjectKeyRef) -> Result<()> {
    require(&format!("{what} bucket"), &target.bucket)?;
    require(&format!("{what} key"), &target.key)
}

/// Bulk engine over an [`ObjectStorage`] implementation.
#[derive(Debug)]
pub struct BulkObjectOperations<S: ObjectStorage> {
    /// Control-plane client.
    storage: S,
}

impl<S: ObjectStorage> BulkObjectOperations<S> {
    /// Creates a new engine.
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Gets the underlying storage client.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Copies one object.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket or key is empty or the copy fails.
    pub async fn copy_object(
        &self,
        source: &ObjectKeyRef,
        destination: &ObjectKeyRef,
        options: &ObjectOptions,
    ) -> Result<CopyReceipt> {
        require_ref("source", source)?;
        require_ref("destination", destination)?;

        debug!("Copying {source} to {destination}");
        self.storage.copy_object(source, destination, options).await
    }

    /// Moves one object: copy, then delete the source.
    ///
    /// The source is deleted only after the copy has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns an error if source and destination are the same object, the
    /// copy fails (nothing is deleted), or the delete fails.
    pub async fn move_object(
        &self,
        source: &ObjectKeyRef,
        destination: &ObjectKeyRef,
        options: &ObjectOptions,
    ) -> Result<CopyReceipt> {
        if source.bucket == destination.bucket && source.key == destination.key {
            return Err(ConfigError::invalid(
                "destination",
                format!("moving {source} onto itself would delete it"),
            )
            .into());
        }

        let receipt = self.copy_object(source, destination, options).await?;
        self.storage.delete_object(source).await?;
        debug!("Moved {source} to {destination}");
        Ok(receipt)
    }

    /// Copies every object under a prefix and returns how many were copied.
    ///
    /// Each object lands at the destination prefix joined with its base file
    /// name; an empty or `/` destination prefix keeps the original keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket is empty or any listing or copy fails.
    pub async fn copy_prefix(
        &self,
        source: &PrefixRef,
        destination: &PrefixRef,
        options: &BulkOptions,
        object_options: &ObjectOptions,
    ) -> Result<usize> {
        self.transfer_prefix(source, destination, options, object_options, Transfer::Copy)
            .await
    }

    /// Moves every object under a prefix and returns how many were moved.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket is empty or any listing, copy or delete
    /// fails. Objects processed before the failure stay moved.
    pub async fn move_prefix(
        &self,
        source: &PrefixRef,
        destination: &PrefixRef,
        options: &BulkOptions,
        object_options: &ObjectOptions,
    ) -> Result<usize> {
        self.transfer_prefix(source, destination, options, object_options, Transfer::Move)
            .await
    }

    async fn transfer_prefix(
        &self,
        source: &PrefixRef,
        destination: &PrefixRef,
        options: &BulkOptions,
        object_options: &ObjectOptions,
        mode: Transfer,
    ) -> Result<usize> {
        require("source bucket", &source.bucket)?;
        require("destination bucket", &destination.bucket)?;

        let plan = BulkTransferPlan::new(
            source.prefix.as_str(),
            destination.prefix.as_str(),
            options.exclude.clone(),
        );

        let keys: Vec<String> = list_all(
            &self.storage,
            ListObjectsRequest {
                bucket: source.bucket.clone(),
                prefix: prefix_filter(&source.prefix),
                continuation_token: None,
            },
        )
        .await?
        .into_iter()
        .map(|entry| entry.key)
        .filter(|key| plan.includes(key))
        .collect();

        if keys.is_empty() {
            info!("No objects to transfer under s3://{}/{}", source.bucket, source.prefix);
            return Ok(0);
        }

        let collisions = plan.collisions(&keys);
        if !collisions.is_empty() {
            let detail = collisions
                .iter()
                .map(|(to, from)| format!("{to} <- [{}]", from.join(", ")))
                .collect::<Vec<_>>()
                .join("; ");
            warn!("Refusing transfer to s3://{}/{}: {detail}", destination.bucket, destination.prefix);
            return Err(ConfigError::invalid(
                "destination",
                format!("several source objects map to the same key: {detail}"),
            )
            .into());
        }

        for (index, key) in keys.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(options.throttle).await;
            }

            let from = ObjectKeyRef::new(&source.bucket, key);
            let to = ObjectKeyRef::new(&destination.bucket, plan.destination_key(key));
            match mode {
                Transfer::Copy => self.copy_object(&from, &to, object_options).await?,
                Transfer::Move => self.move_object(&from, &to, object_options).await?,
            };
        }

        info!(
            "{} {} objects from s3://{}/{} to s3://{}/{}",
            if mode == Transfer::Copy { "Copied" } else { "Moved" },
            keys.len(),
            source.bucket,
            source.prefix,
            destination.bucket,
            destination.prefix
        );
        Ok(keys.len())
    }

    /// Deletes every version and delete marker under a prefix.
    ///
    /// Exclusions match object keys, so every version of an excluded key is
    /// kept. Returns the number of versions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket is empty, a listing or batch call fails,
    /// or the control plane reports per-key failures.
    pub async fn delete_prefix(&self, location: &PrefixRef, options: &BulkOptions) -> Result<usize> {
        require("bucket", &location.bucket)?;

        let targets: Vec<ObjectKeyRef> = list_all_versions(
            &self.storage,
            ListVersionsRequest {
                bucket: location.bucket.clone(),
                prefix: prefix_filter(&location.prefix),
                ..Default::default()
            },
        )
        .await?
        .iter()
        .filter(|entry| !options.is_excluded(&entry.key))
        .map(|entry| entry.to_ref(&location.bucket))
        .collect();

        if targets.is_empty() {
            info!("Nothing to delete under s3://{}/{}", location.bucket, location.prefix);
            return Ok(0);
        }

        let mut deleted = 0usize;
        let mut failures = Vec::new();

        for (index, batch) in targets.chunks(DELETE_BATCH_SIZE).enumerate() {
            if index > 0 {
                tokio::time::sleep(options.throttle).await;
            }

            let report = self.storage.delete_objects(&location.bucket, batch).await?;
            debug!(
                "Delete batch {}: {} deleted, {} failed",
                index + 1,
                report.deleted,
                report.failures.len()
            );
            deleted += report.deleted;
            failures.extend(report.failures);
        }

        if !failures.is_empty() {
            warn!("{} deletions failed under s3://{}/{}", failures.len(), location.bucket, location.prefix);
            return Err(StorageError::PartialDelete {
                bucket: location.bucket.clone(),
                attempted: targets.len(),
                failures,
            }
            .into());
        }

        info!("Deleted {deleted} object versions under s3://{}/{}", location.bucket, location.prefix);
        Ok(deleted)
    }

    /// Deletes one object (or one version of it).
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket or key is empty or the delete fails.
    pub async fn delete_object(&self, target: &ObjectKeyRef) -> Result<()> {
        require_ref("target", target)?;
        self.storage.delete_object(target).await?;
        info!("Deleted {target}");
        Ok(())
    }

    /// Uploads one local file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the bucket or key is empty or the
    /// file does not exist, or the upload error.
    pub async fn upload_file(
        &self,
        destination: &ObjectKeyRef,
        source: &Path,
        options: &ObjectOptions,
    ) -> Result<UploadReceipt> {
        require_ref("destination", destination)?;
        if !tokio::fs::metadata(source).await.is_ok_and(|m| m.is_file()) {
            return Err(ConfigError::FileNotFound {
                path: source.to_path_buf(),
            }
            .into());
        }

        let receipt = self.storage.put_file(destination, source, options).await?;
        info!("Uploaded {} to {destination}", source.display());
        Ok(receipt)
    }

    /// Uploads every file under a local directory.
    ///
    /// Each file lands at the destination prefix joined with its path
    /// relative to `source_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or any upload fails.
    pub async fn upload_directory(
        &self,
        source_dir: &Path,
        destination: &PrefixRef,
        options: &BulkOptions,
        object_options: &ObjectOptions,
    ) -> Result<Vec<UploadReceipt>> {
        require("bucket", &destination.bucket)?;

        let files = walk_directory(source_dir, &options.exclude).await?;
        let mut receipts = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(options.throttle).await;
            }

            let target = ObjectKeyRef::new(
                &destination.bucket,
                join_prefix(&destination.prefix, &file.relative),
            );
            receipts.push(self.upload_file(&target, &file.path, object_options).await?);
        }

        info!(
            "Uploaded {} files from {} to s3://{}/{}",
            receipts.len(),
            source_dir.display(),
            destination.bucket,
            destination.prefix
        );
        Ok(receipts)
    }

    /// Downloads one object and returns the bytes written.
    ///
    /// If `destination` is an existing directory, the object's base file
    /// name is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket or key is empty, the local path cannot
    /// be written, or the download fails.
    pub async fn download_object(&self, source: &ObjectKeyRef, destination: &Path) -> Result<u64> {
        require_ref("source", source)?;

        let target: PathBuf = if tokio::fs::metadata(destination).await.is_ok_and(|m| m.is_dir()) {
            destination.join(file_name_from_key(&source.key))
        } else {
            destination.to_path_buf()
        };

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let written = self.storage.download_to_path(source, &target).await?;
        info!("Downloaded {source} to {} ({written} bytes)", target.display());
        Ok(written)
    }

    /// Lists every current-version object under a prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket is empty or any page request fails.
    pub async fn list_bucket(&self, location: &PrefixRef) -> Result<Vec<ObjectEntry>> {
        require("bucket", &location.bucket)?;
        list_all(
            &self.storage,
            ListObjectsRequest {
                bucket: location.bucket.clone(),
                prefix: prefix_filter(&location.prefix),
                continuation_token: None,
            },
        )
        .await
    }

    /// Lists all buckets.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.storage.list_buckets().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudrigError;
    use crate::storage::api::{
        DeleteReport, ListingPage, MockObjectStorage, VersionListingPage,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory bucket contents with call recording. Listings are single pages.
    #[derive(Default)]
    struct FakeStorage {
        objects: Vec<String>,
        versions: Vec<(String, String)>,
        failing_keys: Vec<String>,
        calls: Mutex<Vec<String>>,
        copies: Mutex<Vec<(ObjectKeyRef, ObjectKeyRef)>>,
        batches: Mutex<Vec<Vec<ObjectKeyRef>>>,
        uploads: Mutex<Vec<ObjectKeyRef>>,
    }

    impl FakeStorage {
        fn with_objects(keys: &[&str]) -> Self {
            Self {
                objects: keys.iter().map(ToString::to_string).collect(),
                ..Default::default()
            }
        }

        fn with_versions(versions: &[(&str, &str)]) -> Self {
            Self {
                versions: versions
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("lock").push(call);
        }
    }

    fn matches_prefix(key: &str, prefix: Option<&String>) -> bool {
        prefix.is_none_or(|p| key.starts_with(p.as_str()))
    }

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
            Ok(vec![BucketSummary {
                name: String::from("b1"),
                created: None,
            }])
        }

        async fn list_objects_page(&self, request: &ListObjectsRequest) -> Result<ListingPage> {
            self.record(String::from("list"));
            Ok(ListingPage {
                items: self
                    .objects
                    .iter()
                    .filter(|k| matches_prefix(k, request.prefix.as_ref()))
                    .map(ObjectEntry::new)
                    .collect(),
                ..Default::default()
            })
        }

        async fn list_object_versions_page(
            &self,
            request: &ListVersionsRequest,
        ) -> Result<VersionListingPage> {
            self.record(String::from("list_versions"));
            Ok(VersionListingPage {
                items: self
                    .versions
                    .iter()
                    .filter(|(k, _)| matches_prefix(k, request.prefix.as_ref()))
                    .map(|(k, v)| ObjectEntry {
                        version_id: Some(v.clone()),
                        ..ObjectEntry::new(k)
                    })
                    .collect(),
                ..Default::default()
            })
        }

        async fn copy_object(
            &self,
            source: &ObjectKeyRef,
            destination: &ObjectKeyRef,
            _options: &ObjectOptions,
        ) -> Result<CopyReceipt> {
            self.record(format!("copy {} -> {}", source.key, destination.key));
            self.copies
                .lock()
                .expect("lock")
                .push((source.clone(), destination.clone()));
            Ok(CopyReceipt {
                new_location: destination.clone(),
                etag: None,
            })
        }

        async fn delete_object(&self, target: &ObjectKeyRef) -> Result<()> {
            self.record(format!("delete {}", target.key));
            Ok(())
        }

        async fn delete_objects(&self, _bucket: &str, targets: &[ObjectKeyRef]) -> Result<DeleteReport> {
            self.record(format!("delete_batch {}", targets.len()));
            self.batches.lock().expect("lock").push(targets.to_vec());
            let failures: Vec<String> = targets
                .iter()
                .filter(|t| self.failing_keys.contains(&t.key))
                .map(|t| format!("{}: AccessDenied", t.key))
                .collect();
            Ok(DeleteReport {
                deleted: targets.len() - failures.len(),
                failures,
            })
        }

        async fn put_file(
            &self,
            destination: &ObjectKeyRef,
            _source: &Path,
            _options: &ObjectOptions,
        ) -> Result<UploadReceipt> {
            self.record(format!("put {}", destination.key));
            self.uploads.lock().expect("lock").push(destination.clone());
            Ok(UploadReceipt {
                location: destination.clone(),
                etag: None,
            })
        }

        async fn download_to_path(&self, _source: &ObjectKeyRef, destination: &Path) -> Result<u64> {
            tokio::fs::write(destination, b"data").await?;
            Ok(4)
        }
    }

    fn fast() -> BulkOptions {
        BulkOptions::default().with_throttle(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_move_never_deletes_when_copy_fails() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_copy_object()
            .times(1)
            .returning(|_, _, _| Err(StorageError::api("CopyObject", "Access Denied").into()));
        storage.expect_delete_object().never();

        let engine = BulkObjectOperations::new(storage);
        let result = engine
            .move_object(
                &ObjectKeyRef::new("b1", "a.txt"),
                &ObjectKeyRef::new("b2", "a.txt"),
                &ObjectOptions::default(),
            )
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_move_deletes_source_after_copy() {
        let engine = BulkObjectOperations::new(FakeStorage::default());
        let receipt = engine
            .move_object(
                &ObjectKeyRef::new("b1", "in/a.txt"),
                &ObjectKeyRef::new("b1", "out/a.txt"),
                &ObjectOptions::default(),
            )
            .await
            .expect("move");

        assert_eq!(receipt.new_location.key, "out/a.txt");
        assert_eq!(
            engine.storage().calls(),
            vec!["copy in/a.txt -> out/a.txt", "delete in/a.txt"]
        );
    }

    #[tokio::test]
    async fn test_move_onto_itself_is_rejected() {
        let engine = BulkObjectOperations::new(FakeStorage::default());
        let same = ObjectKeyRef::new("b1", "a.txt");

        let err = engine
            .move_object(&same, &same, &ObjectOptions::default())
            .await
            .expect_err("must refuse");
        assert!(matches!(err, CloudrigError::Config(_)));
        assert!(engine.storage().calls().is_empty());
    }

    #[tokio::test]
    async fn test_copy_prefix_with_empty_destination_keeps_keys() {
        let engine = BulkObjectOperations::new(FakeStorage::with_objects(&[
            "logs/2024/a.txt",
            "logs/2024/b.txt",
        ]));

        let copied = engine
            .copy_prefix(
                &PrefixRef::new("src", "logs/2024/"),
                &PrefixRef::new("dst", ""),
                &fast(),
                &ObjectOptions::default(),
            )
            .await
            .expect("copy");

        assert_eq!(copied, 2);
        let copies = engine.storage().copies.lock().expect("lock").clone();
        assert_eq!(copies[0].1, ObjectKeyRef::new("dst", "logs/2024/a.txt"));
        assert_eq!(copies[1].1, ObjectKeyRef::new("dst", "logs/2024/b.txt"));
    }

    #[tokio::test]
    async fn test_copy_prefix_joins_base_names_and_filters() {
        let engine = BulkObjectOperations::new(FakeStorage::with_objects(&[
            "logs/2024/",
            "logs/2024/a.txt",
            "logs/2024/skip.txt",
            "logs/2024/nested/b.txt",
            "other/c.txt",
        ]));

        let options = fast().excluding(["logs/2024/skip.txt"]);
        engine
            .copy_prefix(
                &PrefixRef::new("b1", "logs/2024/"),
                &PrefixRef::new("b1", "archive/"),
                &options,
                &ObjectOptions::default(),
            )
            .await
            .expect("copy");

        assert_eq!(
            engine.storage().calls(),
            vec![
                "list",
                "copy logs/2024/a.txt -> archive/a.txt",
                "copy logs/2024/nested/b.txt -> archive/b.txt",
            ]
        );
    }

    #[tokio::test]
    async fn test_prefix_transfer_refuses_colliding_base_names() {
        for mode in [Transfer::Copy, Transfer::Move] {
            let engine = BulkObjectOperations::new(FakeStorage::with_objects(&[
                "logs/a/x.txt",
                "logs/b/x.txt",
                "logs/b/y.txt",
            ]));
            let (source, destination) = (PrefixRef::new("b1", "logs/"), PrefixRef::new("b1", "archive/"));

            let result = match mode {
                Transfer::Copy => {
                    engine
                        .copy_prefix(&source, &destination, &fast(), &ObjectOptions::default())
                        .await
                }
                Transfer::Move => {
                    engine
                        .move_prefix(&source, &destination, &fast(), &ObjectOptions::default())
                        .await
                }
            };

            let err = result.expect_err("colliding keys must be refused");
            assert!(matches!(err, CloudrigError::Config(ConfigError::InvalidValue { .. })));
            let message = err.to_string();
            assert!(message.contains("archive/x.txt"), "{message}");
            assert!(message.contains("logs/a/x.txt") && message.contains("logs/b/x.txt"));
            // listed, but nothing copied or deleted
            assert_eq!(engine.storage().calls(), vec!["list"]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_calls_are_throttled() {
        let engine = BulkObjectOperations::new(FakeStorage::with_objects(&["p/a", "p/b", "p/c"]));
        let started = tokio::time::Instant::now();

        engine
            .move_prefix(
                &PrefixRef::new("b1", "p/"),
                &PrefixRef::new("b2", "q/"),
                &BulkOptions::default(),
                &ObjectOptions::default(),
            )
            .await
            .expect("move");

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
        assert_eq!(engine.storage().calls().len(), 1 + 3 * 2);
    }

    #[tokio::test]
    async fn test_delete_prefix_with_empty_listing_is_noop() {
        let engine = BulkObjectOperations::new(FakeStorage::default());
        let deleted = engine
            .delete_prefix(&PrefixRef::new("b1", "gone/"), &fast())
            .await
            .expect("no-op");

        assert_eq!(deleted, 0);
        assert_eq!(engine.storage().calls(), vec!["list_versions"]);
    }

    #[tokio::test]
    async fn test_delete_prefix_batches_by_thousand() {
        let keys: Vec<String> = (0..2500).map(|i| format!("p/{i:04}")).collect();
        let versions: Vec<(&str, &str)> = keys.iter().map(|k| (k.as_str(), "v1")).collect();
        let engine = BulkObjectOperations::new(FakeStorage::with_versions(&versions));

        let deleted = engine
            .delete_prefix(&PrefixRef::new("b1", "p/"), &fast())
            .await
            .expect("delete");

        assert_eq!(deleted, 2500);
        let sizes: Vec<usize> = engine
            .storage()
            .batches
            .lock()
            .expect("lock")
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn test_delete_prefix_excludes_every_version_of_a_key() {
        let engine = BulkObjectOperations::new(FakeStorage::with_versions(&[
            ("p/a", "v1"),
            ("p/a", "v2"),
            ("p/b", "v1"),
        ]));

        let deleted = engine
            .delete_prefix(&PrefixRef::new("b1", "p/"), &fast().excluding(["p/a"]))
            .await
            .expect("delete");

        assert_eq!(deleted, 1);
        let batch = engine.storage().batches.lock().expect("lock")[0].clone();
        assert_eq!(
            batch,
            vec![ObjectKeyRef::new("b1", "p/b").with_version(Some(String::from("v1")))]
        );
    }

    #[tokio::test]
    async fn test_delete_prefix_exclusion_does_not_match_version_ids() {
        let engine = BulkObjectOperations::new(FakeStorage::with_versions(&[
            ("p/a", "v1"),
            ("p/a", "v2"),
            ("p/b", "v1"),
        ]));

        let deleted = engine
            .delete_prefix(&PrefixRef::new("b1", "p/"), &fast().excluding(["v1"]))
            .await
            .expect("delete");

        assert_eq!(deleted, 3);
    }

    #[tokio::test]
    async fn test_delete_prefix_reports_partial_failures() {
        let mut storage = FakeStorage::with_versions(&[("p/a", "v1"), ("p/b", "v1")]);
        storage.failing_keys = vec![String::from("p/b")];
        let engine = BulkObjectOperations::new(storage);

        let err = engine
            .delete_prefix(&PrefixRef::new("b1", "p/"), &fast())
            .await
            .expect_err("must report");

        match err {
            CloudrigError::Storage(StorageError::PartialDelete { attempted, failures, .. }) => {
                assert_eq!(attempted, 2);
                assert_eq!(failures, vec![String::from("p/b: AccessDenied")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_upload_directory_uploads_every_file() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("css")).expect("mkdir");
        std::fs::write(dir.path().join("index.html"), "<html/>").expect("write");
        std::fs::write(dir.path().join("css/site.css"), "body{}").expect("write");
        std::fs::write(dir.path().join(".env"), "SECRET=1").expect("write");

        let engine = BulkObjectOperations::new(FakeStorage::default());
        let receipts = engine
            .upload_directory(
                dir.path(),
                &PrefixRef::new("site", "public/"),
                &fast().excluding([".env"]),
                &ObjectOptions::default(),
            )
            .await
            .expect("upload");

        let keys: Vec<&str> = receipts.iter().map(|r| r.location.key.as_str()).collect();
        assert_eq!(keys, vec!["public/css/site.css", "public/index.html"]);
    }

    #[tokio::test]
    async fn test_upload_file_fails_fast_when_missing() {
        let dir = TempDir::new().expect("temp dir");
        let engine = BulkObjectOperations::new(FakeStorage::default());

        let err = engine
            .upload_file(
                &ObjectKeyRef::new("b1", "k"),
                &dir.path().join("missing.txt"),
                &ObjectOptions::default(),
            )
            .await
            .expect_err("must fail");

        assert!(matches!(
            err,
            CloudrigError::Config(ConfigError::FileNotFound { .. })
        ));
        assert!(engine.storage().calls().is_empty());
    }

    #[tokio::test]
    async fn test_download_into_directory_uses_base_name() {
        let dir = TempDir::new().expect("temp dir");
        let engine = BulkObjectOperations::new(FakeStorage::default());

        let written = engine
            .download_object(&ObjectKeyRef::new("b1", "reports/q1.csv"), dir.path())
            .await
            .expect("download");

        assert_eq!(written, 4);
        assert!(dir.path().join("q1.csv").is_file());
    }

    #[tokio::test]
    async fn test_empty_bucket_fails_before_network() {
        let engine = BulkObjectOperations::new(FakeStorage::default());
        assert!(engine.list_bucket(&PrefixRef::new("", "")).await.is_err());
        assert!(engine
            .delete_object(&ObjectKeyRef::new("b1", ""))
            .await
            .is_err());
        assert!(engine.storage().calls().is_empty());
    }
}
