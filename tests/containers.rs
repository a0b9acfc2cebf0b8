mod common;

use common::{harness, harness_with, payload, read_all};
use storage_orchestrator::{
    OioError,
    clients::{ContentCreate, MetadataClient},
    models::{
        listing::{ContainerListParams, ListParams},
        object::{ObjectRef, Properties},
    },
    services::{FetchOptions, LocateOptions, OrchestratorConfig, reaper::ChunkReaper},
};

#[tokio::test]
async fn pager_walks_every_page_in_order() {
    let h = harness().await;
    let names = ["a/1", "a/2", "b/1", "c", "d e"];
    for name in names {
        h.put("list", name, name.as_bytes(), "SINGLE").await.unwrap();
    }

    let params = ListParams {
        limit: Some(2),
        ..ListParams::default()
    };
    let listed: Vec<String> = h
        .storage
        .object_pager(&h.ctx, "acct", "list", params)
        .collect_all()
        .await
        .unwrap()
        .into_iter()
        .map(|obj| obj.name)
        .collect();
    assert_eq!(listed, names);
}

#[tokio::test]
async fn delimiter_folds_names_into_prefixes() {
    let h = harness().await;
    for name in ["a/1", "a/2", "b/1", "c"] {
        h.put("list", name, b"x", "SINGLE").await.unwrap();
    }

    let params = ListParams {
        delimiter: Some("/".into()),
        ..ListParams::default()
    };
    let page = h
        .storage
        .object_list(&h.ctx, "acct", "list", &params)
        .await
        .unwrap();
    let objects: Vec<_> = page.objects.iter().map(|obj| obj.name.as_str()).collect();
    assert_eq!(objects, ["c"]);
    assert_eq!(page.prefixes, ["a/", "b/"]);
    assert!(!page.truncated);

    let params = ListParams {
        prefix: Some("a/".into()),
        ..ListParams::default()
    };
    let page = h
        .storage
        .object_list(&h.ctx, "acct", "list", &params)
        .await
        .unwrap();
    assert_eq!(page.objects.len(), 2);
}

#[tokio::test]
async fn purge_keeps_the_newest_versions() {
    let h = harness().await;
    h.make_versioned("hist").await;
    let mut versions = Vec::new();
    for i in 1..=4u8 {
        versions.push(h.put("hist", "doc", &[i; 10], "SINGLE").await.unwrap());
    }

    let deleted = h
        .storage
        .container_purge(&h.ctx, "acct", "hist", Some(2))
        .await
        .unwrap();
    let mut deleted_versions: Vec<i64> = deleted.iter().map(|(_, v)| *v).collect();
    deleted_versions.sort();
    assert_eq!(deleted_versions, versions[..2]);

    let params = ListParams {
        versions: true,
        ..ListParams::default()
    };
    let remaining = h
        .storage
        .object_pager(&h.ctx, "acct", "hist", params)
        .collect_all()
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(h.get("hist", "doc").await.unwrap(), [4u8; 10]);
    assert_eq!(h.blob_chunks().len(), 2);
}

#[tokio::test]
async fn purge_retention_edge_values() {
    let h = harness().await;
    h.make_versioned("hist").await;
    for i in 1..=3u8 {
        h.put("hist", "doc", &[i; 4], "SINGLE").await.unwrap();
    }

    // The container keeps every version, and so does a negative override.
    let none = h
        .storage
        .container_purge(&h.ctx, "acct", "hist", None)
        .await
        .unwrap();
    assert!(none.is_empty());
    let none = h
        .storage
        .container_purge(&h.ctx, "acct", "hist", Some(-1))
        .await
        .unwrap();
    assert!(none.is_empty());

    // Zero behaves like one.
    let deleted = h
        .storage
        .container_purge(&h.ctx, "acct", "hist", Some(0))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 2);
    assert_eq!(h.get("hist", "doc").await.unwrap(), [3u8; 4]);
}

#[tokio::test]
async fn versioned_delete_leaves_a_marker() {
    let h = harness().await;
    h.make_versioned("hist").await;
    let version = h.put("hist", "doc", b"keep me", "SINGLE").await.unwrap();

    h.storage
        .object_delete(&h.ctx, "acct", "hist", "doc", None)
        .await
        .unwrap();
    assert!(matches!(
        h.get("hist", "doc").await,
        Err(OioError::NoSuchObject(_))
    ));

    let meta = h
        .storage
        .object_get_properties(&h.ctx, "acct", "hist", "doc", Some(version))
        .await
        .unwrap();
    assert_eq!(meta.length, 7);
}

#[tokio::test]
async fn snapshot_copies_live_objects_and_unfreezes() {
    let h = harness_with(OrchestratorConfig {
        snapshot_batch: 2,
        ..OrchestratorConfig::default()
    })
    .await;
    let data = payload(150);
    for name in ["one", "two", "three"] {
        h.put("src", name, &data, "SINGLE").await.unwrap();
    }
    let before = h.blob_chunks().len();

    let report = h
        .storage
        .container_snapshot(&h.ctx, "acct", "src", "acct", "snap", None)
        .await
        .unwrap();
    assert_eq!(report.objects, 3);
    assert_eq!(report.chunks, 9);
    assert_eq!(report.batches, 3);
    assert_eq!(h.blob_chunks().len(), before * 2);

    let info = h
        .storage
        .container_show(&h.ctx, "acct", "src")
        .await
        .unwrap();
    assert!(!info.frozen);

    // The copy stands on its own once the source is gone.
    h.storage
        .object_delete(&h.ctx, "acct", "src", "two", None)
        .await
        .unwrap();
    assert_eq!(h.get("snap", "two").await.unwrap(), data);

    let again = h
        .storage
        .container_snapshot(&h.ctx, "acct", "src", "acct", "snap", None)
        .await
        .unwrap_err();
    assert!(again.is_conflict());
    assert!(!h.storage.container_show(&h.ctx, "acct", "src").await.unwrap().frozen);
}

#[tokio::test]
async fn snapshot_versions_never_share_source_chunks() {
    let h = harness().await;
    h.make_versioned("src").await;
    let first = payload(100);
    let v1 = h.put("src", "doc", &first, "SINGLE").await.unwrap();
    h.put("src", "doc", &payload(30), "SINGLE").await.unwrap();
    h.storage
        .object_delete(&h.ctx, "acct", "src", "doc", None)
        .await
        .unwrap();
    // 64 + 36 bytes for the first version, 30 for the second.
    assert_eq!(h.blob_chunks().len(), 3);

    let report = h
        .storage
        .container_snapshot(&h.ctx, "acct", "src", "acct", "snap", None)
        .await
        .unwrap();
    assert_eq!(report.objects, 2);
    assert_eq!(report.chunks, 3);
    assert_eq!(h.blob_chunks().len(), 6);

    h.storage
        .object_delete(&h.ctx, "acct", "snap", "doc", Some(v1))
        .await
        .unwrap();
    assert_eq!(h.blob_chunks().len(), 4);

    let options = FetchOptions {
        version: Some(v1),
        ..FetchOptions::default()
    };
    let (_, body) = h
        .storage
        .object_fetch(&h.ctx, "acct", "src", "doc", options)
        .await
        .unwrap();
    assert_eq!(read_all(body).await.unwrap(), first);
}

#[tokio::test]
async fn foreign_chunks_survive_a_delete() {
    let h = harness().await;
    let data = payload(100);
    h.put("src", "orig", &data, "SINGLE").await.unwrap();
    let (_, chunks) = h
        .storage
        .object_locate(&h.ctx, "acct", "src", "orig", None, LocateOptions::default())
        .await
        .unwrap();

    // Records of another container pointing at chunks it does not own.
    h.put("other", "stray", b"x", "SINGLE").await.unwrap();
    let stray = ContentCreate {
        account: "acct".into(),
        container: "other".into(),
        name: "borrowed".into(),
        version: 1,
        content_id: "BORROWED".into(),
        size: 100,
        checksum: String::new(),
        policy: "SINGLE".into(),
        chunk_method: "plain/nb_copy=1".into(),
        mime_type: "application/octet-stream".into(),
        chunks,
        properties: Properties::new(),
        append: false,
    };
    h.meta.content_create(&h.ctx, &stray).await.unwrap();
    h.storage
        .object_delete(&h.ctx, "acct", "other", "borrowed", None)
        .await
        .unwrap();

    assert_eq!(h.get("src", "orig").await.unwrap(), data);
}

#[tokio::test]
async fn failed_snapshot_removes_its_links_and_unfreezes() {
    let h = harness().await;
    h.put("src", "whole", &payload(150), "SINGLE").await.unwrap();
    let chunks = h.blob_chunks();
    std::fs::remove_file(&chunks[1]).unwrap();

    let result = h
        .storage
        .container_snapshot(&h.ctx, "acct", "src", "acct", "snap", None)
        .await;
    assert!(result.is_err());
    assert_eq!(h.blob_chunks().len(), chunks.len() - 1);
    assert!(!h.storage.container_show(&h.ctx, "acct", "src").await.unwrap().frozen);
}

#[tokio::test]
async fn fastcopy_shares_bytes_across_accounts() {
    let h = harness().await;
    let data = payload(100);
    let version = h.put("src", "orig", &data, "THREECOPIES").await.unwrap();

    let source = ObjectRef::new("acct", "src", "orig");
    let destination = ObjectRef::new("other", "dst", "copy");
    h.storage
        .container_create(&h.ctx, "other", "dst", &Properties::new())
        .await
        .unwrap();
    h.storage
        .object_fastcopy(&h.ctx, &source, &destination, None)
        .await
        .unwrap();

    assert_eq!(h.blob_chunks().len(), 12);
    let (meta, copies) = h
        .storage
        .object_locate(&h.ctx, "other", "dst", "copy", None, LocateOptions::default())
        .await
        .unwrap();
    let (_, originals) = h
        .storage
        .object_locate(&h.ctx, "acct", "src", "orig", None, LocateOptions::default())
        .await
        .unwrap();
    assert_eq!(meta.version, version);
    assert!(copies.iter().all(|copy| originals.iter().all(|o| o.url != copy.url)));
    let (_, body) = h
        .storage
        .object_fetch(&h.ctx, "other", "dst", "copy", Default::default())
        .await
        .unwrap();
    assert_eq!(read_all(body).await.unwrap(), data);
}

#[tokio::test]
async fn reaping_twice_is_harmless() {
    let h = harness().await;
    h.put("docs", "doomed", &payload(100), "THREECOPIES").await.unwrap();
    let (_, chunks) = h
        .storage
        .object_locate(&h.ctx, "acct", "docs", "doomed", None, LocateOptions::default())
        .await
        .unwrap();

    let reaper = ChunkReaper::new(h.blob.clone(), 4);
    let first = reaper.reap(&h.ctx, &chunks, None).await;
    let second = reaper.reap(&h.ctx, &chunks, None).await;

    assert_eq!(first.deleted, 6);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.missing, 6);
    assert_eq!(second.failed, 0);
    assert!(h.blob_chunks().is_empty());
}

#[tokio::test]
async fn refresh_recomputes_counters() {
    let h = harness().await;
    h.put("docs", "a", &payload(30), "SINGLE").await.unwrap();
    h.put("docs", "b", &payload(20), "SINGLE").await.unwrap();
    h.put("other", "c", &payload(5), "SINGLE").await.unwrap();

    h.storage
        .container_refresh(&h.ctx, "acct", "docs")
        .await
        .unwrap();
    h.storage.account_refresh(&h.ctx, Some("acct")).await.unwrap();
    h.storage.account_refresh(&h.ctx, None).await.unwrap();

    let info = h.storage.account_show(&h.ctx, "acct").await.unwrap();
    assert_eq!(info.containers, 2);
    assert_eq!(info.objects, 3);
    assert_eq!(info.bytes, 55);

    let containers = h
        .storage
        .container_list(&h.ctx, "acct", &ContainerListParams::default())
        .await
        .unwrap();
    let docs = containers.iter().find(|c| c.name == "docs").unwrap();
    assert_eq!((docs.objects, docs.bytes), (2, 50));
}

#[tokio::test]
async fn delete_many_reports_each_name() {
    let h = harness().await;
    h.put("docs", "a", b"1", "SINGLE").await.unwrap();
    h.put("docs", "b", b"2", "SINGLE").await.unwrap();

    let names = vec!["a".to_string(), "ghost".to_string(), "b".to_string()];
    let results = h
        .storage
        .object_delete_many(&h.ctx, "acct", "docs", &names)
        .await
        .unwrap();
    assert_eq!(
        results,
        vec![
            ("a".to_string(), true),
            ("ghost".to_string(), false),
            ("b".to_string(), true)
        ]
    );
    assert!(h.blob_chunks().is_empty());
}

#[tokio::test]
async fn container_with_objects_cannot_be_deleted() {
    let h = harness().await;
    h.put("docs", "a", b"1", "SINGLE").await.unwrap();

    let err = h
        .storage
        .container_delete(&h.ctx, "acct", "docs")
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    h.storage
        .object_delete(&h.ctx, "acct", "docs", "a", None)
        .await
        .unwrap();
    h.storage
        .container_delete(&h.ctx, "acct", "docs")
        .await
        .unwrap();
}

#[tokio::test]
#[allow(deprecated)]
async fn deprecated_update_can_clear_properties() {
    let h = harness().await;
    let first = Properties::from([("color".to_string(), "red".to_string())]);
    let request = storage_orchestrator::services::ObjectCreate::new("acct", "docs", "tagged", b"x".to_vec())
        .with_properties(first);
    h.storage.object_create(&h.ctx, request).await.unwrap();

    let second = Properties::from([("size".to_string(), "xl".to_string())]);
    h.storage
        .object_update(&h.ctx, "acct", "docs", "tagged", None, &second, true)
        .await
        .unwrap();

    let meta = h
        .storage
        .object_show(&h.ctx, "acct", "docs", "tagged", None)
        .await
        .unwrap();
    assert_eq!(meta.properties, second);
}
