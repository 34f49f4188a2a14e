//! Object storage operations for cloudrig.
//!
//! This module manages objects across whole prefixes:
//! - Paginated listings materialized into one sequence
//! - Serial, throttled copy/move/delete/upload across a prefix or directory
//! - Version-aware prefix deletion in batches

mod api;
mod aws;
mod bulk;
mod keys;
mod local;
mod paginator;

pub use api::{
    BucketSummary, CopyReceipt, DeleteReport, ListObjectsRequest, ListVersionsRequest,
    ListingPage, ObjectEntry, ObjectKeyRef, ObjectStorage, PrefixRef, UploadReceipt,
    VersionListingPage,
};
#[cfg(test)]
pub use api::MockObjectStorage;
pub use aws::S3Storage;
pub use bulk::{BulkObjectOperations, DELETE_BATCH_SIZE};
pub use keys::{file_name_from_key, is_placeholder, join_prefix, BulkTransferPlan, SEPARATOR};
pub use local::{walk_directory, LocalFile};
pub use paginator::{list_all, list_all_versions};
