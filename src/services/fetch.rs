//! Object retrieval: locate, order chunks into metachunks, plan the byte
//! ranges and hand back a lazy stream of segments.

use super::{
    object_storage::ObjectStorage,
    read::{
        ChunkReader, Metachunk, Segment, cold::ColdReader, ec::EcReader,
        replicated::ReplicatedReader,
    },
    storage_method::StorageMethod,
};
use crate::{
    clients::cold::KeyFileCredentials,
    context::{PerfLedger, RequestContext, STAGE_TTFB, STAGE_TTLB},
    errors::{OioError, OioResult},
    models::{chunk::ChunkDescriptor, object::ObjectMetadata},
};
use bytes::Bytes;
use futures::{
    StreamExt, future,
    stream::{self, BoxStream},
};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Instant};
use tracing::debug;

/// Lazy, single-pass object body.
pub type ByteStream = BoxStream<'static, OioResult<Bytes>>;

/// Inclusive byte range; an open end reads to the end of the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Parse an HTTP `Range` header value such as `bytes=0-99,200-`.
    /// Suffix ranges (`-500`) are not supported.
    pub fn parse_header(value: &str) -> OioResult<Vec<ByteRange>> {
        let invalid = || OioError::InvalidArgument(format!("invalid range `{value}`"));
        let ranges = value.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        ranges
            .split(',')
            .map(|part| {
                let (start, end) = part.trim().split_once('-').ok_or_else(invalid)?;
                let start = start.parse::<u64>().map_err(|_| invalid())?;
                let end = match end {
                    "" => None,
                    end => Some(end.parse::<u64>().map_err(|_| invalid())?),
                };
                if end.is_some_and(|end| end < start) {
                    return Err(invalid());
                }
                Ok(ByteRange::new(start, end))
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub version: Option<i64>,
    /// Empty reads the whole object.
    pub ranges: Vec<ByteRange>,
    /// Overrides the configured cold-storage key file.
    pub key_file: Option<PathBuf>,
}

/// Group chunks by metachunk, ordered numerically, and place each
/// metachunk in the object.
pub fn sort_chunks(chunks: Vec<ChunkDescriptor>) -> Vec<Metachunk> {
    let mut grouped: BTreeMap<u32, Vec<ChunkDescriptor>> = BTreeMap::new();
    for chunk in chunks {
        grouped.entry(chunk.pos.meta).or_default().push(chunk);
    }
    let mut offset = 0;
    grouped
        .into_iter()
        .map(|(pos, mut chunks)| {
            chunks.sort_by_key(|chunk| chunk.pos);
            let size = chunks.first().map(|chunk| chunk.size).unwrap_or(0);
            let metachunk = Metachunk {
                pos,
                offset,
                size,
                chunks,
            };
            offset += size;
            metachunk
        })
        .collect()
}

/// Segments to read, in order, for `ranges` over an object of `total`
/// bytes.
pub fn plan_segments(
    metachunks: &[Arc<Metachunk>],
    total: u64,
    ranges: &[ByteRange],
) -> OioResult<Vec<Segment>> {
    if ranges.is_empty() {
        return Ok(metachunks
            .iter()
            .filter(|mc| mc.size > 0)
            .map(|mc| Segment {
                metachunk: mc.clone(),
                range: None,
            })
            .collect());
    }

    let mut plan = Vec::new();
    for range in ranges {
        if range.start >= total {
            return Err(OioError::UnsatisfiableRange(format!(
                "start {} past object end {}",
                range.start, total
            )));
        }
        let end = range.end.map_or(total - 1, |end| end.min(total - 1));
        for mc in metachunks {
            if mc.size == 0 {
                continue;
            }
            let mc_end = mc.offset + mc.size - 1;
            if mc_end < range.start || mc.offset > end {
                continue;
            }
            let start = range.start.max(mc.offset) - mc.offset;
            let stop = end.min(mc_end) - mc.offset;
            let whole = start == 0 && stop == mc.size - 1;
            plan.push(Segment {
                metachunk: mc.clone(),
                range: (!whole).then_some((start, stop)),
            });
        }
    }
    Ok(plan)
}

/// Record time to first and to last segment into `ledger`, once each.
pub fn with_perfdata(inner: ByteStream, ledger: PerfLedger, started: Instant) -> ByteStream {
    stream::unfold(
        (inner, ledger, false),
        move |(mut inner, ledger, mut seen)| async move {
            match inner.next().await {
                Some(item) => {
                    if !seen {
                        ledger.record_once(STAGE_TTFB, started.elapsed());
                        seen = true;
                    }
                    Some((item, (inner, ledger, seen)))
                }
                None => {
                    let elapsed = started.elapsed();
                    ledger.record_once(STAGE_TTFB, elapsed);
                    ledger.record_once(STAGE_TTLB, elapsed);
                    None
                }
            }
        },
    )
    .boxed()
}

impl ObjectStorage {
    /// Object metadata and its body. Nothing is read from blob nodes until
    /// the stream is polled; dropping it stops further reads.
    pub async fn object_fetch(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        options: FetchOptions,
    ) -> OioResult<(ObjectMetadata, ByteStream)> {
        let started = Instant::now();
        let (meta, chunks) = self
            .metadata
            .content_locate(ctx, account, container, name, options.version, true)
            .await?;
        let method = StorageMethod::load(&meta.chunk_method)?;
        let metachunks: Vec<Arc<Metachunk>> =
            sort_chunks(chunks).into_iter().map(Arc::new).collect();
        let plan = plan_segments(&metachunks, meta.length, &options.ranges)?;
        debug!(
            request_id = %ctx.request_id,
            object = %meta.full_path(),
            segments = plan.len(),
            method = %method,
            "fetch planned"
        );

        let reader = match &method {
            StorageMethod::Replicated { .. } => {
                ChunkReader::Replicated(ReplicatedReader::new(self.blob.clone()))
            }
            StorageMethod::Ec(params) => ChunkReader::Ec(EcReader::new(
                self.blob.clone(),
                params.clone(),
                self.codec.clone(),
            )),
            StorageMethod::Cold(params) => {
                let key_file = options
                    .key_file
                    .unwrap_or_else(|| self.config.key_file.clone());
                let creds =
                    KeyFileCredentials::load(&key_file, &params.account_id, &params.bucket_name)
                        .await?;
                ChunkReader::Cold(ColdReader::new(self.cold.clone(), creds))
            }
        };

        let reader = Arc::new(reader);
        let stream_ctx = ctx.clone();
        let body = stream::iter(plan)
            .then(move |segment| {
                let reader = reader.clone();
                let ctx = stream_ctx.clone();
                async move { reader.read(&ctx, &segment).await }
            })
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .boxed();

        let body = match &ctx.perfdata {
            Some(ledger) => with_perfdata(body, ledger.clone(), started),
            None => body,
        };
        Ok((meta, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::ChunkPosition;

    fn chunk(pos: ChunkPosition, size: u64) -> ChunkDescriptor {
        ChunkDescriptor::new(format!("http://blob/{pos}"), pos, size, "")
    }

    fn metachunks(sizes: &[u64]) -> Vec<Arc<Metachunk>> {
        let chunks = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| chunk(ChunkPosition::meta(i as u32), *size))
            .collect();
        sort_chunks(chunks).into_iter().map(Arc::new).collect()
    }

    #[test]
    fn sorting_is_numeric_and_keeps_fragments_together() {
        let chunks = vec![
            chunk(ChunkPosition::sub(10, 1), 5),
            chunk(ChunkPosition::sub(2, 0), 7),
            chunk(ChunkPosition::sub(10, 0), 5),
            chunk(ChunkPosition::sub(2, 1), 7),
        ];
        let sorted = sort_chunks(chunks);
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].pos, 2);
        assert_eq!(sorted[0].offset, 0);
        assert_eq!(sorted[1].pos, 10);
        assert_eq!(sorted[1].offset, 7);
        assert_eq!(sorted[1].chunks[0].pos, ChunkPosition::sub(10, 0));
    }

    #[test]
    fn range_spanning_metachunks() {
        let mcs = metachunks(&[10, 10, 5]);
        let plan = plan_segments(&mcs, 25, &[ByteRange::new(8, Some(21))]).unwrap();
        let spans: Vec<_> = plan.iter().map(|s| (s.metachunk.pos, s.range)).collect();
        assert_eq!(
            spans,
            vec![(0, Some((8, 9))), (1, None), (2, Some((0, 1)))]
        );
        assert_eq!(plan.iter().map(Segment::len).sum::<u64>(), 14);
    }

    #[test]
    fn open_and_clamped_ranges() {
        let mcs = metachunks(&[10, 10]);
        let open = plan_segments(&mcs, 20, &[ByteRange::new(15, None)]).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].range, Some((5, 9)));

        let clamped = plan_segments(&mcs, 20, &[ByteRange::new(0, Some(500))]).unwrap();
        assert_eq!(clamped.len(), 2);
        assert!(clamped.iter().all(|s| s.range.is_none()));
    }

    #[test]
    fn start_past_end_is_unsatisfiable() {
        let mcs = metachunks(&[10]);
        assert!(matches!(
            plan_segments(&mcs, 10, &[ByteRange::new(10, None)]),
            Err(OioError::UnsatisfiableRange(_))
        ));
    }

    #[test]
    fn empty_object_has_no_segments() {
        let mcs = metachunks(&[0]);
        assert!(plan_segments(&mcs, 0, &[]).unwrap().is_empty());
    }

    #[test]
    fn range_header_parsing() {
        assert_eq!(
            ByteRange::parse_header("bytes=0-99, 200-").unwrap(),
            vec![ByteRange::new(0, Some(99)), ByteRange::new(200, None)]
        );
        assert!(ByteRange::parse_header("bytes=-500").is_err());
        assert!(ByteRange::parse_header("items=0-1").is_err());
        assert!(ByteRange::parse_header("bytes=9-3").is_err());
    }

    #[tokio::test]
    async fn perf_wrapper_records_each_stage_once() {
        let ledger = PerfLedger::new();
        let parts: Vec<OioResult<Bytes>> =
            vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))];
        let wrapped = with_perfdata(stream::iter(parts).boxed(), ledger.clone(), Instant::now());
        let collected: Vec<_> = wrapped.collect().await;
        assert_eq!(collected.len(), 2);
        let ttfb = ledger.get(STAGE_TTFB).unwrap();
        let ttlb = ledger.get(STAGE_TTLB).unwrap();
        assert!(ttfb <= ttlb);
        assert_eq!(ledger.snapshot().len(), 2);
    }
}
