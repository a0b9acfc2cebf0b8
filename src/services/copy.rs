//! Chunk-level copies: new unpredictable locations for existing chunks,
//! hard links at the blob layer, and `object_fastcopy` built on both.

use super::object_storage::{LocateOptions, ObjectStorage};
use crate::{
    clients::{ChunkOwner, ContentCreate},
    context::RequestContext,
    errors::OioResult,
    models::{chunk::ChunkDescriptor, container::container_id, object::ObjectRef},
};
use futures::{StreamExt, stream};
use rand::Rng;
use std::collections::HashSet;
use tracing::{info, warn};

const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";

fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())] as char)
        .collect()
}

/// Copy of every chunk with the last `random_hex` characters of its url
/// replaced by random upper-case hex digits. No copy collides with a
/// source url or with another copy.
pub fn generate_copies(chunks: &[ChunkDescriptor], random_hex_len: usize) -> Vec<ChunkDescriptor> {
    let mut taken: HashSet<String> = chunks.iter().map(|chunk| chunk.url.clone()).collect();
    chunks
        .iter()
        .map(|chunk| {
            let keep = chunk.url.chars().count().saturating_sub(random_hex_len);
            let prefix: String = chunk.url.chars().take(keep).collect();
            let url = loop {
                let candidate = format!("{prefix}{}", random_hex(random_hex_len));
                if taken.insert(candidate.clone()) {
                    break candidate;
                }
            };
            ChunkDescriptor {
                url,
                probe: None,
                error: None,
                ..chunk.clone()
            }
        })
        .collect()
}

impl ObjectStorage {
    /// Hard-link `targets[i]` as `copies[i]`, owned by `owner`. Every link
    /// is attempted; if any fails, the copies that were created are removed
    /// and the first error is returned.
    pub(crate) async fn link_chunks(
        &self,
        ctx: &RequestContext,
        targets: &[ChunkDescriptor],
        copies: &[ChunkDescriptor],
        owner: &ChunkOwner,
    ) -> OioResult<()> {
        let links: Vec<_> = targets
            .iter()
            .zip(copies)
            .map(|(target, copy)| {
                let blob = self.blob.clone();
                let ctx = ctx.clone();
                let owner = owner.clone();
                let target = target.url.clone();
                let copy = copy.clone();
                async move {
                    let result = blob.chunk_link(&ctx, &target, &copy.url, &owner).await;
                    (copy, result)
                }
            })
            .collect();
        let results: Vec<_> = stream::iter(links)
            .buffer_unordered(self.config.link_concurrency.max(1))
            .collect()
            .await;

        let mut linked = Vec::new();
        let mut first_error = None;
        for (copy, result) in results {
            match result {
                Ok(()) => linked.push(copy),
                Err(err) => {
                    warn!(url = %copy.url, error = %err, "chunk link failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => {
                self.reaper()
                    .reap(ctx, &linked, Some(&owner.container_id))
                    .await;
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Shallow copy of an object, across containers and accounts. The copy
    /// keeps the source version and shares its bytes through hard links.
    pub async fn object_fastcopy(
        &self,
        ctx: &RequestContext,
        source: &ObjectRef,
        destination: &ObjectRef,
        version: Option<i64>,
    ) -> OioResult<()> {
        let (meta, chunks) = self
            .object_locate(
                ctx,
                &source.account,
                &source.container,
                &source.name,
                version,
                LocateOptions::default(),
            )
            .await?;
        let copies = generate_copies(&chunks, self.config.random_hex);
        let full_path = destination.full_path(meta.version);
        let owner = ChunkOwner {
            full_path: full_path.clone(),
            content_id: meta.content_id.clone(),
            container_id: container_id(&destination.account, &destination.container),
        };

        self.link_chunks(ctx, &chunks, &copies, &owner).await?;

        let commit = ContentCreate {
            account: destination.account.clone(),
            container: destination.container.clone(),
            name: destination.name.clone(),
            version: meta.version,
            content_id: meta.content_id.clone(),
            size: meta.length,
            checksum: meta.hash.clone(),
            policy: meta.policy.clone(),
            chunk_method: meta.chunk_method.clone(),
            mime_type: meta.mime_type.clone(),
            chunks: copies.clone(),
            properties: meta.properties.clone(),
            append: false,
        };
        if let Err(err) = self.metadata.content_create(ctx, &commit).await {
            warn!(
                request_id = %ctx.request_id,
                destination = %full_path,
                error = %err,
                "fast copy commit failed, removing linked chunks"
            );
            self.reaper()
                .reap(ctx, &copies, Some(&owner.container_id))
                .await;
            return Err(err);
        }
        info!(
            request_id = %ctx.request_id,
            source = %source.full_path(meta.version),
            destination = %full_path,
            chunks = copies.len(),
            "object copied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::ChunkPosition;

    fn chunk(url: &str) -> ChunkDescriptor {
        ChunkDescriptor::new(url, ChunkPosition::meta(0), 10, "HASH")
    }

    #[test]
    fn copies_keep_prefix_and_replace_suffix() {
        let id = "A".repeat(64);
        let source = chunk(&format!("http://blob-1/{id}"));
        let copies = generate_copies(std::slice::from_ref(&source), 64);

        let copy = &copies[0];
        assert!(copy.url.starts_with("http://blob-1/"));
        assert_eq!(copy.url.len(), source.url.len());
        assert_ne!(copy.url, source.url);
        let suffix = &copy.url["http://blob-1/".len()..];
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_eq!(copy.hash, "HASH");
        assert_eq!(copy.pos, source.pos);
    }

    #[test]
    fn copies_never_collide() {
        // Two hex digits leave 256 possible suffixes; 40 copies of urls
        // sharing a prefix must still be pairwise distinct.
        let chunks: Vec<_> = (0..40).map(|i| chunk(&format!("http://b/{i:02X}"))).collect();
        let copies = generate_copies(&chunks, 2);
        let mut seen: HashSet<&str> = chunks.iter().map(|c| c.url.as_str()).collect();
        for copy in &copies {
            assert!(seen.insert(copy.url.as_str()), "duplicate {}", copy.url);
        }
    }
}
