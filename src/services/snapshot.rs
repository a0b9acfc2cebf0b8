//! Container snapshots: a copy-on-write duplicate of every version of every
//! object of a container, taken while the source is frozen.
//!
//! The destination starts as a copy of the source records, so until a
//! version is re-linked its chunk records point at the source's chunks.
//! Every version holding chunks is therefore re-linked, not only the
//! latest one.

use super::{copy::generate_copies, object_storage::ObjectStorage};
use crate::{
    clients::ChunkOwner,
    context::RequestContext,
    errors::OioResult,
    models::{
        chunk::{ChunkBean, ChunkDescriptor},
        container::container_id,
        listing::ListParams,
        object::full_path,
    },
};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub objects: usize,
    pub chunks: usize,
    /// Raw updates issued.
    pub batches: usize,
}

/// Target and copy records waiting for a raw update, with the linked
/// copies they describe.
#[derive(Default)]
struct StagedBeans {
    targets: Vec<ChunkBean>,
    copies: Vec<ChunkBean>,
    linked: Vec<ChunkDescriptor>,
}

impl StagedBeans {
    fn len(&self) -> usize {
        self.targets.len()
    }

    fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn clear(&mut self) {
        self.targets.clear();
        self.copies.clear();
        self.linked.clear();
    }
}

impl ObjectStorage {
    /// Duplicate `account/container` into `dst_account/dst_container`.
    ///
    /// The source is frozen for the whole copy and unfrozen exactly once
    /// afterwards, whatever the outcome. An unfreeze failure is reported only
    /// when the copy itself succeeded.
    pub async fn container_snapshot(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        dst_account: &str,
        dst_container: &str,
        batch_size: Option<usize>,
    ) -> OioResult<SnapshotReport> {
        self.metadata.container_freeze(ctx, account, container).await?;
        debug!(account, container, "container frozen for snapshot");

        let copied = self
            .snapshot_frozen(ctx, account, container, dst_account, dst_container, batch_size)
            .await;
        let unfrozen = self.metadata.container_enable(ctx, account, container).await;

        match (copied, unfrozen) {
            (Ok(report), Ok(())) => {
                info!(
                    request_id = %ctx.request_id,
                    account,
                    container,
                    dst_account,
                    dst_container,
                    objects = report.objects,
                    chunks = report.chunks,
                    "container snapshot done"
                );
                Ok(report)
            }
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Err(unfreeze)) => {
                warn!(account, container, error = %unfreeze, "failed to unfreeze container");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    async fn snapshot_frozen(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        dst_account: &str,
        dst_container: &str,
        batch_size: Option<usize>,
    ) -> OioResult<SnapshotReport> {
        let batch_size = batch_size.unwrap_or(self.config.snapshot_batch).max(1);
        self.metadata
            .container_snapshot(ctx, account, container, dst_account, dst_container)
            .await?;

        let mut report = SnapshotReport::default();
        let mut staged = StagedBeans::default();
        let copied = self
            .snapshot_objects(
                ctx,
                (account, container),
                (dst_account, dst_container),
                batch_size,
                &mut staged,
                &mut report,
            )
            .await;
        if let Err(err) = copied {
            // Copies linked since the last flush are referenced by nothing.
            let cid = container_id(dst_account, dst_container);
            self.reaper().reap(ctx, &staged.linked, Some(&cid)).await;
            return Err(err);
        }
        Ok(report)
    }

    async fn snapshot_objects(
        &self,
        ctx: &RequestContext,
        (account, container): (&str, &str),
        (dst_account, dst_container): (&str, &str),
        batch_size: usize,
        staged: &mut StagedBeans,
        report: &mut SnapshotReport,
    ) -> OioResult<()> {
        let params = ListParams {
            versions: true,
            ..ListParams::default()
        };
        let dst_cid = container_id(dst_account, dst_container);
        let mut pager = self.object_pager(ctx, dst_account, dst_container, params);
        while let Some(page) = pager.next_page().await? {
            for obj in page.objects.into_iter().filter(|obj| !obj.deleted) {
                let (meta, chunks) = self
                    .metadata
                    .content_locate(ctx, account, container, &obj.name, Some(obj.version), false)
                    .await?;
                if chunks.is_empty() {
                    continue;
                }
                let copies = generate_copies(&chunks, self.config.random_hex);
                let owner = ChunkOwner {
                    full_path: full_path(dst_account, dst_container, &obj.name, obj.version),
                    content_id: meta.content_id.clone(),
                    container_id: dst_cid.clone(),
                };
                self.link_chunks(ctx, &chunks, &copies, &owner).await?;

                for (target, copy) in chunks.iter().zip(&copies) {
                    staged
                        .targets
                        .push(ChunkBean::new(&target.url, target, &meta.content_id));
                    staged
                        .copies
                        .push(ChunkBean::new(&copy.url, copy, &meta.content_id));
                }
                staged.linked.extend(copies);
                report.objects += 1;
                report.chunks += chunks.len();

                if staged.len() >= batch_size {
                    self.flush_beans(ctx, dst_account, dst_container, staged)
                        .await?;
                    report.batches += 1;
                }
            }
        }
        if !staged.is_empty() {
            self.flush_beans(ctx, dst_account, dst_container, staged)
                .await?;
            report.batches += 1;
        }
        Ok(())
    }

    async fn flush_beans(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        staged: &mut StagedBeans,
    ) -> OioResult<()> {
        debug!(account, container, beans = staged.len(), "flushing chunk records");
        self.metadata
            .container_raw_update(ctx, &staged.targets, &staged.copies, account, container, true)
            .await?;
        staged.clear();
        Ok(())
    }
}
