//! Listing paginator.
//!
//! Follows continuation cursors until the control plane reports a page that
//! is not truncated, accumulating every entry in listing order. Only one page
//! response is held at a time.

use tracing::debug;

use crate::error::{Result, StorageError};

use super::api::{ListObjectsRequest, ListVersionsRequest, ObjectEntry, ObjectStorage};

/// Lists every current-version object matching the request.
///
/// # Errors
///
/// Returns an error if any page request fails, or if a truncated page
/// carries no continuation token.
pub async fn list_all<S>(storage: &S, mut request: ListObjectsRequest) -> Result<Vec<ObjectEntry>>
where
    S: ObjectStorage + ?Sized,
{
    let mut entries = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = storage.list_objects_page(&request).await?;
        pages += 1;
        debug!(
            "Listing page {pages} of s3://{}: {} items, truncated={}",
            request.bucket,
            page.items.len(),
            page.is_truncated
        );
        entries.extend(page.items);

        if !page.is_truncated {
            break;
        }

        match page.continuation_token {
            Some(token) if !token.is_empty() => request.continuation_token = Some(token),
            _ => {
                return Err(StorageError::invalid_response(
                    "truncated listing page without a continuation token",
                )
                .into())
            }
        }
    }

    Ok(entries)
}

/// Lists every version and delete marker matching the request.
///
/// Both cursors are threaded into the next request independently.
///
/// # Errors
///
/// Returns an error if any page request fails, or if a truncated page
/// carries neither cursor.
pub async fn list_all_versions<S>(
    storage: &S,
    mut request: ListVersionsRequest,
) -> Result<Vec<ObjectEntry>>
where
    S: ObjectStorage + ?Sized,
{
    let mut entries = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = storage.list_object_versions_page(&request).await?;
        pages += 1;
        debug!(
            "Version listing page {pages} of s3://{}: {} items, truncated={}",
            request.bucket,
            page.items.len(),
            page.is_truncated
        );
        entries.extend(page.items);

        if !page.is_truncated {
            break;
        }

        if page.next_key_marker.is_none() && page.next_version_id_marker.is_none() {
            return Err(StorageError::invalid_response(
                "truncated version listing page without markers",
            )
            .into());
        }

        request.key_marker = page.next_key_marker;
        request.version_id_marker = page.next_version_id_marker;
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudrigError;
    use crate::storage::api::{ListingPage, MockObjectStorage, VersionListingPage};
    use mockall::Sequence;

    fn keys(entries: &[ObjectEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_accumulates_pages_in_order() {
        let mut storage = MockObjectStorage::new();
        let mut seq = Sequence::new();

        storage
            .expect_list_objects_page()
            .withf(|r| r.continuation_token.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(ListingPage {
                    items: vec![ObjectEntry::new("a"), ObjectEntry::new("b")],
                    is_truncated: true,
                    continuation_token: Some(String::from("x")),
                })
            });
        storage
            .expect_list_objects_page()
            .withf(|r| r.continuation_token.as_deref() == Some("x"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(ListingPage {
                    items: vec![ObjectEntry::new("c")],
                    is_truncated: false,
                    continuation_token: None,
                })
            });

        let request = ListObjectsRequest {
            bucket: String::from("b1"),
            ..Default::default()
        };
        let entries = list_all(&storage, request).await.expect("listing");
        assert_eq!(keys(&entries), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_truncated_page_without_token_is_rejected() {
        let mut storage = MockObjectStorage::new();
        storage.expect_list_objects_page().times(1).returning(|_| {
            Ok(ListingPage {
                items: vec![ObjectEntry::new("a")],
                is_truncated: true,
                continuation_token: None,
            })
        });

        let err = list_all(&storage, ListObjectsRequest::default())
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            CloudrigError::Storage(StorageError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_version_markers_are_threaded_independently() {
        let mut storage = MockObjectStorage::new();
        let mut seq = Sequence::new();

        storage
            .expect_list_object_versions_page()
            .withf(|r| r.key_marker.is_none() && r.version_id_marker.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(VersionListingPage {
                    items: vec![ObjectEntry::new("a")],
                    is_truncated: true,
                    next_key_marker: Some(String::from("a")),
                    next_version_id_marker: None,
                })
            });
        storage
            .expect_list_object_versions_page()
            .withf(|r| r.key_marker.as_deref() == Some("a") && r.version_id_marker.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(VersionListingPage {
                    items: vec![ObjectEntry::new("b")],
                    is_truncated: true,
                    next_key_marker: Some(String::from("b")),
                    next_version_id_marker: Some(String::from("v2")),
                })
            });
        storage
            .expect_list_object_versions_page()
            .withf(|r| {
                r.key_marker.as_deref() == Some("b") && r.version_id_marker.as_deref() == Some("v2")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(VersionListingPage {
                    items: vec![ObjectEntry::new("b")],
                    ..Default::default()
                })
            });

        let entries = list_all_versions(&storage, ListVersionsRequest::default())
            .await
            .expect("listing");
        assert_eq!(keys(&entries), vec!["a", "b", "b"]);
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_list_objects_page()
            .times(1)
            .returning(|_| Err(StorageError::api("ListObjectsV2", "Access Denied").into()));

        assert!(list_all(&storage, ListObjectsRequest::default()).await.is_err());
    }
}
