mod common;

use bytes::Bytes;
use common::{CHUNK_SIZE, harness, payload, read_all};
use futures::{StreamExt, stream};
use std::{io, time::Duration};
use storage_orchestrator::{
    OioError, RequestContext,
    clients::MetadataClient,
    context::{PerfLedger, STAGE_RAWX, STAGE_TTFB, STAGE_TTLB},
    models::object::Properties,
    services::{ByteRange, FetchOptions, LocateOptions, ObjectCreate, ObjectSource, TrustLevel},
};

#[tokio::test]
async fn single_copy_round_trip_spans_metachunks() {
    let h = harness().await;
    let data = payload(150);
    h.put("docs", "report.bin", &data, "SINGLE").await.unwrap();

    // 64 + 64 + 22 bytes, one copy each.
    assert_eq!(h.blob_chunks().len(), 3);
    assert_eq!(h.get("docs", "report.bin").await.unwrap(), data);

    let meta = h
        .storage
        .object_get_properties(&h.ctx, "acct", "docs", "report.bin", None)
        .await
        .unwrap();
    assert_eq!(meta.length, 150);
    assert_eq!(meta.hash, format!("{:X}", md5::compute(&data)));
}

#[tokio::test]
async fn replicated_read_survives_a_lost_copy() {
    let h = harness().await;
    let data = payload(100);
    h.put("docs", "triple", &data, "THREECOPIES").await.unwrap();

    let chunks = h.blob_chunks();
    assert_eq!(chunks.len(), 6);
    std::fs::remove_file(&chunks[0]).unwrap();

    assert_eq!(h.get("docs", "triple").await.unwrap(), data);
}

#[tokio::test]
async fn erasure_coded_round_trip_and_degraded_read() {
    let h = harness().await;
    let data = payload(150);
    h.put("docs", "ec", &data, "EC").await.unwrap();

    // k=4 data fragments plus one parity fragment per metachunk.
    let chunks = h.blob_chunks();
    assert_eq!(chunks.len(), 15);
    assert_eq!(h.get("docs", "ec").await.unwrap(), data);

    std::fs::remove_file(&chunks[0]).unwrap();
    assert_eq!(h.get("docs", "ec").await.unwrap(), data);
}

#[tokio::test]
async fn cold_objects_never_touch_blob_nodes() {
    let h = harness().await;
    let data = payload(90);
    h.put("archive", "old.log", &data, "COLD").await.unwrap();

    assert!(h.blob_chunks().is_empty());
    assert!(h.cold_root().join("archive").is_dir());
    assert_eq!(h.get("archive", "old.log").await.unwrap(), data);

    let options = FetchOptions {
        ranges: vec![ByteRange::new(60, Some(69))],
        ..FetchOptions::default()
    };
    let (_, body) = h
        .storage
        .object_fetch(&h.ctx, "acct", "archive", "old.log", options)
        .await
        .unwrap();
    assert_eq!(read_all(body).await.unwrap(), data[60..70]);
}

fn cold_files(h: &common::Harness) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(h.cold_root().join("archive"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[tokio::test]
async fn cold_provider_returning_nothing_fails_the_read() {
    let h = harness().await;
    h.put("archive", "lost.log", &payload(90), "COLD").await.unwrap();
    for file in cold_files(&h) {
        std::fs::write(file, b"").unwrap();
    }

    let err = h.get("archive", "lost.log").await.unwrap_err();
    assert!(matches!(err, OioError::Oio(msg) if msg.contains("downloading")));
}

#[tokio::test]
async fn short_cold_download_is_corruption() {
    let h = harness().await;
    let data = payload(90);
    h.put("archive", "cut.log", &data, "COLD").await.unwrap();
    for file in cold_files(&h) {
        let kept = std::fs::read(&file).unwrap();
        std::fs::write(&file, &kept[..kept.len() / 2]).unwrap();
    }

    let err = h.get("archive", "cut.log").await.unwrap_err();
    assert!(matches!(err, OioError::CorruptedChunk(_)));
}

#[tokio::test]
async fn ranges_cross_metachunk_boundaries() {
    let h = harness().await;
    let data = payload(200);
    for (name, policy) in [("plain", "SINGLE"), ("coded", "EC")] {
        h.put("docs", name, &data, policy).await.unwrap();

        let options = FetchOptions {
            ranges: vec![ByteRange::new(60, Some(130)), ByteRange::new(190, None)],
            ..FetchOptions::default()
        };
        let (_, body) = h
            .storage
            .object_fetch(&h.ctx, "acct", "docs", name, options)
            .await
            .unwrap();
        let mut expected = data[60..=130].to_vec();
        expected.extend_from_slice(&data[190..]);
        assert_eq!(read_all(body).await.unwrap(), expected, "{policy}");
    }
}

#[tokio::test]
async fn range_past_the_end_is_unsatisfiable() {
    let h = harness().await;
    h.put("docs", "small", b"0123456789", "SINGLE").await.unwrap();

    let options = FetchOptions {
        ranges: vec![ByteRange::new(10, None)],
        ..FetchOptions::default()
    };
    let result = h
        .storage
        .object_fetch(&h.ctx, "acct", "docs", "small", options)
        .await;
    assert!(matches!(result, Err(OioError::UnsatisfiableRange(_))));
}

#[tokio::test]
async fn etag_mismatch_leaves_no_chunks() {
    let h = harness().await;
    let request = ObjectCreate::new("acct", "docs", "bad", payload(100))
        .with_policy("THREECOPIES")
        .with_etag("00000000000000000000000000000000");
    let err = h.storage.object_create(&h.ctx, request).await.unwrap_err();

    assert!(matches!(err, OioError::EtagMismatch { .. }));
    assert!(h.blob_chunks().is_empty());
    let head = h
        .storage
        .object_head(&h.ctx, "acct", "docs", "bad", None, TrustLevel::Metadata)
        .await
        .unwrap();
    assert!(!head);
}

#[tokio::test]
async fn matching_etag_is_case_insensitive() {
    let h = harness().await;
    let data = payload(40);
    let etag = format!("{:x}", md5::compute(&data));
    let request = ObjectCreate::new("acct", "docs", "good", data).with_etag(etag);
    let created = h.storage.object_create(&h.ctx, request).await.unwrap();
    assert_eq!(created.size, 40);
}

#[tokio::test]
async fn commit_into_frozen_container_rolls_back() {
    let h = harness().await;
    h.storage
        .container_create(&h.ctx, "acct", "cold-feet", &Properties::new())
        .await
        .unwrap();
    h.meta
        .container_freeze(&h.ctx, "acct", "cold-feet")
        .await
        .unwrap();

    let err = h
        .put("cold-feet", "late", &payload(150), "SINGLE")
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(h.blob_chunks().is_empty());
}

#[tokio::test]
async fn failing_source_reaps_written_chunks() {
    let h = harness().await;
    let parts: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from(payload(CHUNK_SIZE as usize + 20))),
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")),
    ];
    let source = ObjectSource::Stream(Box::pin(stream::iter(parts)));
    let request = ObjectCreate::new("acct", "docs", "partial", source);

    let err = h.storage.object_create(&h.ctx, request).await.unwrap_err();
    assert!(matches!(err, OioError::SourceRead(_)));
    assert!(h.blob_chunks().is_empty());
}

#[tokio::test]
async fn expired_deadline_still_removes_written_chunks() {
    let h = harness().await;
    let ctx = RequestContext::new().with_timeout(Duration::from_millis(150));
    let first = stream::once(async { Ok::<_, io::Error>(Bytes::from(payload(CHUNK_SIZE as usize))) });
    let stalled = stream::once(async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Bytes::from(payload(10)))
    });
    let source = ObjectSource::Stream(first.chain(stalled).boxed());
    let request = ObjectCreate::new("acct", "docs", "slow", source);

    let err = h.storage.object_create(&ctx, request).await.unwrap_err();
    assert!(matches!(err, OioError::DeadlineReached));
    assert!(h.blob_chunks().is_empty());
    let head = h
        .storage
        .object_head(&h.ctx, "acct", "docs", "slow", None, TrustLevel::Metadata)
        .await
        .unwrap();
    assert!(!head);
}

#[tokio::test]
async fn missing_source_name_or_file() {
    let h = harness().await;

    let no_data = ObjectCreate {
        source: None,
        ..ObjectCreate::new("acct", "docs", "empty", Vec::new())
    };
    assert!(matches!(
        h.storage.object_create(&h.ctx, no_data).await,
        Err(OioError::MissingData)
    ));

    let no_name = ObjectCreate::new("acct", "docs", "", payload(3));
    assert!(matches!(
        h.storage.object_create(&h.ctx, no_name).await,
        Err(OioError::MissingName)
    ));

    let missing = h.tmp_path().join("nope.txt");
    let no_file = ObjectCreate::from_path("acct", "docs", &missing);
    assert!(matches!(
        h.storage.object_create(&h.ctx, no_file).await,
        Err(OioError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn upload_from_path_uses_the_file_name() {
    let h = harness().await;
    let path = h.tmp_path().join("notes.txt");
    std::fs::write(&path, b"remember the milk").unwrap();

    let created = h
        .storage
        .object_create(&h.ctx, ObjectCreate::from_path("acct", "docs", &path))
        .await
        .unwrap();
    assert_eq!(created.meta.name, "notes.txt");
    assert_eq!(h.get("docs", "notes.txt").await.unwrap(), b"remember the milk");
}

#[tokio::test]
async fn append_extends_the_latest_version() {
    let h = harness().await;
    let first = h.put("docs", "journal", b"hello", "SINGLE").await.unwrap();

    let request = ObjectCreate::new("acct", "docs", "journal", b" world".to_vec()).appending();
    let appended = h.storage.object_create(&h.ctx, request).await.unwrap();

    assert_eq!(appended.meta.version, first);
    assert_eq!(appended.meta.length, 11);
    assert_eq!(h.get("docs", "journal").await.unwrap(), b"hello world");
}

#[tokio::test]
async fn head_checks_as_deep_as_asked() {
    let h = harness().await;
    h.put("docs", "checked", &payload(100), "SINGLE").await.unwrap();

    let deep = h
        .storage
        .object_head(&h.ctx, "acct", "docs", "checked", None, TrustLevel::AllChunks)
        .await
        .unwrap();
    assert!(deep);
    assert!(matches!(
        h.storage
            .object_head(&h.ctx, "acct", "docs", "checked", None, TrustLevel::Readable)
            .await,
        Err(OioError::Unsupported(_))
    ));

    std::fs::remove_file(&h.blob_chunks()[0]).unwrap();
    let shallow = h
        .storage
        .object_head(&h.ctx, "acct", "docs", "checked", None, TrustLevel::Metadata)
        .await
        .unwrap();
    let deep = h
        .storage
        .object_head(&h.ctx, "acct", "docs", "checked", None, TrustLevel::AllChunks)
        .await
        .unwrap();
    assert!(shallow);
    assert!(!deep);
}

#[tokio::test]
async fn locate_records_chunk_check_failures() {
    let h = harness().await;
    h.put("docs", "located", &payload(100), "SINGLE").await.unwrap();
    std::fs::remove_file(&h.blob_chunks()[0]).unwrap();

    let options = LocateOptions {
        chunk_info: true,
        ..LocateOptions::default()
    };
    let (meta, chunks) = h
        .storage
        .object_locate(&h.ctx, "acct", "docs", "located", None, options)
        .await
        .unwrap();
    assert_eq!(meta.length, 100);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks.iter().filter(|c| c.error.is_some()).count(), 1);
    assert_eq!(chunks.iter().filter(|c| c.probe.is_some()).count(), 1);
}

#[tokio::test]
async fn drain_forgets_and_removes_chunks() {
    let h = harness().await;
    h.put("docs", "drained", &payload(100), "SINGLE").await.unwrap();

    h.storage
        .object_drain(&h.ctx, "acct", "docs", "drained", None)
        .await
        .unwrap();

    let (_, chunks) = h
        .storage
        .object_locate(&h.ctx, "acct", "docs", "drained", None, LocateOptions::default())
        .await
        .unwrap();
    assert!(chunks.is_empty());
    assert!(h.blob_chunks().is_empty());
}

#[tokio::test]
async fn perfdata_collects_each_stage() {
    let h = harness().await;
    let ledger = PerfLedger::new();
    let ctx = RequestContext::new().with_perfdata(ledger.clone());

    let request = ObjectCreate::new("acct", "docs", "timed", payload(150));
    h.storage.object_create(&ctx, request).await.unwrap();
    let (_, body) = h
        .storage
        .object_fetch(&ctx, "acct", "docs", "timed", FetchOptions::default())
        .await
        .unwrap();
    read_all(body).await.unwrap();

    let rawx = ledger.get(STAGE_RAWX).unwrap();
    let ttfb = ledger.get(STAGE_TTFB).unwrap();
    let ttlb = ledger.get(STAGE_TTLB).unwrap();
    assert!(rawx >= 0.0);
    assert!(ttfb <= ttlb);
}

#[tokio::test]
async fn fetch_of_unknown_object_is_not_found() {
    let h = harness().await;
    h.put("docs", "present", b"x", "SINGLE").await.unwrap();

    let err = h.get("docs", "absent").await.unwrap_err();
    assert!(matches!(err, OioError::NoSuchObject(_)));
    let err = h.get("nowhere", "absent").await.unwrap_err();
    assert!(matches!(err, OioError::NoSuchContainer(_)));
}
