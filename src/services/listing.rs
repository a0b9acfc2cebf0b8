//! Container listings: normalize what the metadata service returns into
//! uniform pages, and walk every page of a listing.

use super::object_storage::ObjectStorage;
use crate::{
    context::RequestContext,
    errors::OioResult,
    models::{
        listing::{HEADER_LIST_MARKER, HEADER_LIST_TRUNCATED, ListParams, ListingPage, RawListing},
        object::{ObjectMetadata, Properties, unquote_plus},
    },
};
use serde::Deserialize;
use tracing::warn;

/// Listing entry as the metadata service spells it.
#[derive(Deserialize)]
struct WireEntry {
    name: String,
    #[serde(alias = "ver", default)]
    version: i64,
    #[serde(alias = "content", default)]
    content_id: String,
    #[serde(default)]
    policy: String,
    #[serde(default)]
    chunk_method: String,
    #[serde(alias = "size", default)]
    length: u64,
    #[serde(default)]
    hash: String,
    #[serde(rename = "mime-type", alias = "mime_type", default)]
    mime_type: String,
    #[serde(default)]
    deleted: bool,
    #[serde(alias = "mtime", default)]
    ctime: i64,
    #[serde(default)]
    properties: Properties,
}

/// Turn a raw listing into a page of canonical object descriptions.
pub fn normalize_listing(
    account: &str,
    container: &str,
    raw: RawListing,
) -> OioResult<ListingPage> {
    let objects = raw
        .objects
        .into_iter()
        .map(|value| {
            let wire: WireEntry = serde_json::from_value(value)?;
            Ok(ObjectMetadata {
                account: account.to_string(),
                container: container.to_string(),
                name: wire.name,
                version: wire.version,
                content_id: wire.content_id,
                policy: wire.policy,
                chunk_method: wire.chunk_method,
                length: wire.length,
                hash: wire.hash,
                mime_type: wire.mime_type,
                properties: wire.properties,
                deleted: wire.deleted,
                ctime: wire.ctime,
            })
        })
        .collect::<OioResult<Vec<_>>>()?;

    let truncated = raw
        .headers
        .get(HEADER_LIST_TRUNCATED)
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));
    let next_marker = match raw.headers.get(HEADER_LIST_MARKER) {
        Some(marker) => Some(unquote_plus(marker)),
        None if truncated => objects.last().map(|obj| obj.name.clone()),
        None => None,
    };

    Ok(ListingPage {
        objects,
        prefixes: raw.prefixes,
        truncated,
        next_marker,
    })
}

impl ObjectStorage {
    /// One page of the objects of a container.
    pub async fn object_list(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        params: &ListParams,
    ) -> OioResult<ListingPage> {
        let raw = self
            .metadata
            .content_list(ctx, account, container, params)
            .await?;
        normalize_listing(account, container, raw)
    }

    pub fn object_pager<'a>(
        &'a self,
        ctx: &'a RequestContext,
        account: &str,
        container: &str,
        params: ListParams,
    ) -> ObjectPager<'a> {
        ObjectPager {
            storage: self,
            ctx,
            account: account.to_string(),
            container: container.to_string(),
            params,
            done: false,
        }
    }
}

/// Walks a listing page by page, following `next_marker`.
pub struct ObjectPager<'a> {
    storage: &'a ObjectStorage,
    ctx: &'a RequestContext,
    account: String,
    container: String,
    params: ListParams,
    done: bool,
}

impl ObjectPager<'_> {
    pub async fn next_page(&mut self) -> OioResult<Option<ListingPage>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .storage
            .object_list(self.ctx, &self.account, &self.container, &self.params)
            .await?;
        match (&page.next_marker, page.truncated) {
            (Some(marker), true) if self.params.marker.as_ref() != Some(marker) => {
                self.params.marker = Some(marker.clone());
            }
            (_, true) => {
                warn!(
                    account = %self.account,
                    container = %self.container,
                    "truncated listing without progress, stopping"
                );
                self.done = true;
            }
            (_, false) => self.done = true,
        }
        Ok(Some(page))
    }

    /// Every remaining object.
    pub async fn collect_all(mut self) -> OioResult<Vec<ObjectMetadata>> {
        let mut objects = Vec::new();
        while let Some(page) = self.next_page().await? {
            objects.extend(page.objects);
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn backend_field_names_are_normalized() {
        let raw = RawListing {
            headers: HashMap::from([
                (HEADER_LIST_TRUNCATED.to_string(), "True".to_string()),
                (HEADER_LIST_MARKER.to_string(), "dir%2Fmy+file".to_string()),
            ]),
            objects: vec![json!({
                "name": "dir/my file",
                "ver": 17,
                "content": "ABCD",
                "size": 12,
                "hash": "00FF",
                "mime-type": "text/plain",
                "deleted": false,
                "policy": "SINGLE"
            })],
            prefixes: vec![],
        };
        let page = normalize_listing("acct", "ct", raw).unwrap();
        assert!(page.truncated);
        assert_eq!(page.next_marker.as_deref(), Some("dir/my file"));
        let obj = &page.objects[0];
        assert_eq!(obj.version, 17);
        assert_eq!(obj.content_id, "ABCD");
        assert_eq!(obj.length, 12);
        assert_eq!(obj.mime_type, "text/plain");
        assert_eq!(obj.account, "acct");
    }

    #[test]
    fn missing_headers_mean_last_page() {
        let raw = RawListing {
            objects: vec![json!({"name": "a", "version": 1})],
            ..RawListing::default()
        };
        let page = normalize_listing("acct", "ct", raw).unwrap();
        assert!(!page.truncated);
        assert!(page.next_marker.is_none());
    }
}
