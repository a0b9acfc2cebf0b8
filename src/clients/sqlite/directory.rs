use super::SqliteMeta;
use crate::{
    clients::{DirectoryClient, MetadataClient, PrepareRequest, PreparedContent, PreparedMeta},
    context::RequestContext,
    errors::{OioError, OioResult},
    models::{
        chunk::{ChunkPosition, ChunkSlot},
        object::Properties,
    },
    services::storage_method::StorageMethod,
};
use async_trait::async_trait;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

/// 64 upper-case hex characters.
fn random_chunk_id() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple().to_string().to_uppercase(),
        Uuid::new_v4().simple().to_string().to_uppercase()
    )
}

impl SqliteMeta {
    /// Spread the chunks of one metachunk over distinct services when
    /// there are enough of them.
    fn allocate_slots(&self, method: &StorageMethod, position: u32) -> OioResult<Vec<ChunkSlot>> {
        let services = &self.placement.services;
        if services.is_empty() {
            return Err(OioError::ConfigurationException(
                "no blob service to place chunks on".into(),
            ));
        }
        let start = rand::rng().random_range(0..services.len());
        let slots = (0..method.expected_chunks())
            .map(|i| {
                let service = &services[(start + i) % services.len()];
                let pos = if method.is_ec() {
                    ChunkPosition::sub(position, i as u32)
                } else {
                    ChunkPosition::meta(position)
                };
                ChunkSlot {
                    url: format!("http://{service}/{}", random_chunk_id()),
                    pos,
                }
            })
            .collect();
        Ok(slots)
    }
}

#[async_trait]
impl DirectoryClient for SqliteMeta {
    async fn content_prepare(
        &self,
        ctx: &RequestContext,
        request: &PrepareRequest,
    ) -> OioResult<PreparedContent> {
        ctx.check_deadline()?;
        let (account, container, name) = (
            request.account.as_str(),
            request.container.as_str(),
            request.name.as_str(),
        );

        if MetadataClient::container_create(self, ctx, account, container, &Properties::new()).await? {
            debug!(account, container, "container created on first upload");
        }

        let latest = self.latest_row(account, container, name).await?;
        let appending = latest
            .as_ref()
            .filter(|row| request.append && !row.deleted);

        let meta = match appending {
            Some(row) => {
                let chunks = self.fetch_chunks(account, container, name, row.version).await?;
                let next_position = chunks.iter().map(|c| c.pos.meta + 1).max().unwrap_or(0);
                PreparedMeta {
                    version: row.version,
                    content_id: row.content_id.clone(),
                    policy: row.policy.clone(),
                    chunk_method: row.chunk_method.clone(),
                    chunk_size: self.placement.chunk_size,
                    first_position: next_position,
                    first_offset: row.length.max(0) as u64,
                }
            }
            None => {
                let policy = request
                    .policy
                    .clone()
                    .unwrap_or_else(|| self.placement.default_policy.clone());
                let chunk_method = self.placement.policies.get(&policy).cloned().ok_or_else(|| {
                    OioError::InvalidArgument(format!("unknown storage policy `{policy}`"))
                })?;
                let version = latest
                    .as_ref()
                    .map_or(super::now_micros(), |row| super::now_micros().max(row.version + 1));
                PreparedMeta {
                    version,
                    content_id: Uuid::new_v4().simple().to_string().to_uppercase(),
                    policy,
                    chunk_method,
                    chunk_size: self.placement.chunk_size,
                    first_position: 0,
                    first_offset: 0,
                }
            }
        };

        let method = StorageMethod::load(&meta.chunk_method)?;
        let position = if request.position == 0 {
            meta.first_position
        } else {
            request.position
        };
        let chunks = self.allocate_slots(&method, position)?;
        Ok(PreparedContent { meta, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_long_hex() {
        let id = random_chunk_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
