use super::{
    CONTENT_COLUMNS, ContentRow, SqliteMeta, compute_common_prefix,
    is_unique_violation, now_micros, now_secs, parse_props, props_json,
};
use crate::{
    clients::{ContentCreate, MetadataClient},
    context::RequestContext,
    errors::{OioError, OioResult},
    models::{
        chunk::{ChunkBean, ChunkDescriptor},
        container::ContainerInfo,
        listing::{HEADER_LIST_MARKER, HEADER_LIST_TRUNCATED, ListParams, RawListing},
        object::{ObjectMetadata, Properties, quote_plus},
    },
};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: usize = 1000;

/// Append the WHERE clause shared by the listing queries.
fn push_listing_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    account: &str,
    container: &str,
    params: &ListParams,
) {
    builder
        .push(" WHERE c.account = ")
        .push_bind(account.to_string())
        .push(" AND c.container = ")
        .push_bind(container.to_string());
    if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
        builder
            .push(" AND substr(c.name, 1, length(")
            .push_bind(prefix.to_string())
            .push(")) = ")
            .push_bind(prefix.to_string());
    }
    if let Some(marker) = &params.marker {
        builder.push(" AND c.name > ").push_bind(marker.clone());
    }
    if let Some(end_marker) = &params.end_marker {
        builder.push(" AND c.name < ").push_bind(end_marker.clone());
    }
    if !params.versions {
        builder.push(
            " AND c.version = (SELECT MAX(l.version) FROM contents l \
             WHERE l.account = c.account AND l.container = c.container AND l.name = c.name)",
        );
    }
    if !params.deleted {
        builder.push(" AND c.deleted = 0");
    }
}

impl SqliteMeta {
    /// Rows of the listing page plus whether more entries follow.
    async fn listing_rows(
        &self,
        account: &str,
        container: &str,
        params: &ListParams,
    ) -> OioResult<(Vec<ContentRow>, bool)> {
        let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {CONTENT_COLUMNS} FROM contents c"));
        push_listing_filters(&mut builder, account, container, params);
        builder
            .push(" ORDER BY c.name ASC, c.version DESC LIMIT ")
            .push_bind((limit + 1) as i64);
        let mut rows = builder
            .build_query_as::<ContentRow>()
            .fetch_all(&*self.db)
            .await?;

        let mut truncated = rows.len() > limit;
        rows.truncate(limit);

        // A page never splits the versions of one name.
        if params.versions && truncated {
            if let Some(last) = rows.last() {
                let (name, oldest) = (last.name.clone(), last.version);
                let mut tail = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {CONTENT_COLUMNS} FROM contents c WHERE c.account = "
                ));
                tail.push_bind(account.to_string())
                    .push(" AND c.container = ")
                    .push_bind(container.to_string())
                    .push(" AND c.name = ")
                    .push_bind(name.clone())
                    .push(" AND c.version < ")
                    .push_bind(oldest);
                if !params.deleted {
                    tail.push(" AND c.deleted = 0");
                }
                tail.push(" ORDER BY c.version DESC");
                rows.extend(tail.build_query_as::<ContentRow>().fetch_all(&*self.db).await?);

                let mut next = params.clone();
                next.marker = Some(name);
                let mut probe = QueryBuilder::<Sqlite>::new("SELECT c.name FROM contents c");
                push_listing_filters(&mut probe, account, container, &next);
                probe.push(" LIMIT 1");
                truncated = probe
                    .build_query_scalar::<String>()
                    .fetch_optional(&*self.db)
                    .await?
                    .is_some();
            }
        }
        Ok((rows, truncated))
    }

    async fn remove_rows(
        &self,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<(u64, Vec<String>)> {
        let mut tx = self.db.begin().await?;
        let urls: Vec<String> = match version {
            Some(version) => sqlx::query_scalar(
                "SELECT url FROM chunks WHERE account = ? AND container = ? AND name = ? AND version = ?",
            )
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(version)
            .fetch_all(&mut *tx)
            .await?,
            None => sqlx::query_scalar(
                "SELECT url FROM chunks WHERE account = ? AND container = ? AND name = ?",
            )
            .bind(account)
            .bind(container)
            .bind(name)
            .fetch_all(&mut *tx)
            .await?,
        };
        let removed = match version {
            Some(version) => {
                sqlx::query(
                    "DELETE FROM chunks WHERE account = ? AND container = ? AND name = ? AND version = ?",
                )
                .bind(account)
                .bind(container)
                .bind(name)
                .bind(version)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "DELETE FROM contents WHERE account = ? AND container = ? AND name = ? AND version = ?",
                )
                .bind(account)
                .bind(container)
                .bind(name)
                .bind(version)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
            None => {
                sqlx::query("DELETE FROM chunks WHERE account = ? AND container = ? AND name = ?")
                    .bind(account)
                    .bind(container)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM contents WHERE account = ? AND container = ? AND name = ?")
                    .bind(account)
                    .bind(container)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            }
        };
        tx.commit().await?;
        Ok((removed, urls))
    }

    async fn write_content_properties(
        &self,
        row: &ContentRow,
        properties: &Properties,
    ) -> OioResult<()> {
        sqlx::query(
            "UPDATE contents SET properties = ?
             WHERE account = ? AND container = ? AND name = ? AND version = ?",
        )
        .bind(props_json(properties)?)
        .bind(&row.account)
        .bind(&row.container)
        .bind(&row.name)
        .bind(row.version)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn write_container_properties(
        &self,
        account: &str,
        container: &str,
        properties: &Properties,
        system: &Properties,
    ) -> OioResult<()> {
        sqlx::query("UPDATE containers SET properties = ?, system = ? WHERE account = ? AND name = ?")
            .bind(props_json(properties)?)
            .bind(props_json(system)?)
            .bind(account)
            .bind(container)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn set_frozen(&self, account: &str, container: &str, frozen: bool) -> OioResult<()> {
        let updated = sqlx::query("UPDATE containers SET frozen = ? WHERE account = ? AND name = ?")
            .bind(frozen)
            .bind(account)
            .bind(container)
            .execute(&*self.db)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(OioError::NoSuchContainer(format!("{account}/{container}")));
        }
        Ok(())
    }

    /// Create the account row if missing.
    pub(super) async fn ensure_account(&self, account: &str) -> OioResult<bool> {
        let created = sqlx::query(
            "INSERT OR IGNORE INTO accounts (name, ctime, mtime, properties) VALUES (?, ?, ?, '{}')",
        )
        .bind(account)
        .bind(now_micros() / 1_000_000)
        .bind(now_secs())
        .execute(&*self.db)
        .await?
        .rows_affected();
        Ok(created > 0)
    }
}

#[async_trait]
impl MetadataClient for SqliteMeta {
    async fn container_create(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
    ) -> OioResult<bool> {
        self.ensure_account(account).await?;
        let inserted = sqlx::query(
            "INSERT INTO containers (account, name, ctime, frozen, properties, system)
             VALUES (?, ?, ?, 0, ?, '{}')",
        )
        .bind(account)
        .bind(container)
        .bind(now_micros() / 1_000_000)
        .bind(props_json(properties)?)
        .execute(&*self.db)
        .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(false),
            Err(err) => return Err(err.into()),
        }
        self.push_stats(account, container).await?;
        info!(account, container, "container created");
        Ok(true)
    }

    async fn container_delete(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        self.ensure_writable(account, container).await?;
        let contents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contents WHERE account = ? AND container = ?")
                .bind(account)
                .bind(container)
                .fetch_one(&*self.db)
                .await?;
        if contents > 0 {
            return Err(OioError::Conflict(format!("container {account}/{container} is not empty")));
        }
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM containers WHERE account = ? AND name = ?")
            .bind(account)
            .bind(container)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE container_stats SET dtime = ? WHERE account = ? AND name = ?")
            .bind(now_secs())
            .bind(account)
            .bind(container)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(account, container, "container deleted");
        Ok(())
    }

    async fn container_show(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<ContainerInfo> {
        self.fetch_container(account, container).await?.into_info()
    }

    async fn container_set_properties(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
        system: &Properties,
        clear: bool,
    ) -> OioResult<()> {
        let row = self.fetch_container(account, container).await?;
        let mut current = if clear {
            Properties::new()
        } else {
            parse_props(&row.properties)?
        };
        current.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut current_system = parse_props(&row.system)?;
        current_system.extend(system.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_container_properties(account, container, &current, &current_system)
            .await
    }

    async fn container_del_properties(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        keys: &[String],
    ) -> OioResult<()> {
        let row = self.fetch_container(account, container).await?;
        let mut current = parse_props(&row.properties)?;
        let mut system = parse_props(&row.system)?;
        for key in keys {
            current.remove(key);
            system.remove(key);
        }
        self.write_container_properties(account, container, &current, &system)
            .await
    }

    async fn container_touch(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        self.fetch_container(account, container).await?;
        self.push_stats(account, container).await
    }

    async fn container_freeze(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        self.set_frozen(account, container, true).await
    }

    async fn container_enable(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        self.set_frozen(account, container, false).await
    }

    async fn container_snapshot(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        dst_account: &str,
        dst_container: &str,
    ) -> OioResult<()> {
        let source = self.fetch_container(account, container).await?;
        self.ensure_account(dst_account).await?;

        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO containers (account, name, ctime, frozen, properties, system)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(dst_account)
        .bind(dst_container)
        .bind(now_micros() / 1_000_000)
        .bind(&source.properties)
        .bind(&source.system)
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(OioError::Conflict(format!(
                    "snapshot destination {dst_account}/{dst_container} already exists"
                )));
            }
            Err(err) => return Err(err.into()),
        }
        sqlx::query(
            "INSERT INTO contents (account, container, name, version, content_id, policy,
                chunk_method, length, hash, mime_type, properties, deleted, ctime)
             SELECT ?, ?, name, version, content_id, policy, chunk_method, length, hash,
                mime_type, properties, deleted, ctime
             FROM contents WHERE account = ? AND container = ?",
        )
        .bind(dst_account)
        .bind(dst_container)
        .bind(account)
        .bind(container)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO chunks (account, container, name, version, url, pos, size, hash)
             SELECT ?, ?, name, version, url, pos, size, hash
             FROM chunks WHERE account = ? AND container = ?",
        )
        .bind(dst_account)
        .bind(dst_container)
        .bind(account)
        .bind(container)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.push_stats(dst_account, dst_container).await?;
        info!(account, container, dst_account, dst_container, "container records copied");
        Ok(())
    }

    async fn container_raw_update(
        &self,
        _ctx: &RequestContext,
        targets: &[ChunkBean],
        copies: &[ChunkBean],
        account: &str,
        container: &str,
        frozen: bool,
    ) -> OioResult<()> {
        if targets.len() != copies.len() {
            return Err(OioError::InvalidArgument(format!(
                "{} targets for {} copies",
                targets.len(),
                copies.len()
            )));
        }
        let row = self.fetch_container(account, container).await?;
        if row.frozen && !frozen {
            return Err(OioError::Conflict(format!("container {account}/{container} is frozen")));
        }

        let mut tx = self.db.begin().await?;
        for (target, copy) in targets.iter().zip(copies) {
            let updated = sqlx::query(
                "UPDATE chunks SET url = ?, pos = ?, size = ?, hash = ?
                 WHERE account = ? AND container = ? AND url = ?",
            )
            .bind(&copy.id)
            .bind(copy.pos.to_string())
            .bind(copy.size as i64)
            .bind(&copy.hash)
            .bind(account)
            .bind(container)
            .bind(&target.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if updated == 0 {
                return Err(OioError::NotFound(format!("chunk record {}", target.id)));
            }
        }
        tx.commit().await?;
        debug!(account, container, count = targets.len(), "chunk records replaced");
        Ok(())
    }

    async fn content_list(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        params: &ListParams,
    ) -> OioResult<RawListing> {
        self.fetch_container(account, container).await?;
        let (rows, truncated) = self.listing_rows(account, container, params).await?;

        let mut headers = HashMap::new();
        headers.insert(HEADER_LIST_TRUNCATED.to_string(), truncated.to_string());
        if truncated {
            if let Some(last) = rows.last() {
                headers.insert(HEADER_LIST_MARKER.to_string(), quote_plus(&last.name));
            }
        }

        let delimiter = params.delimiter.as_deref().unwrap_or("");
        let mut prefixes = BTreeSet::new();
        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            match compute_common_prefix(&row.name, params.prefix.as_deref(), delimiter) {
                Some(prefix) => {
                    prefixes.insert(prefix);
                }
                None => objects.push(row.to_listing_entry(params.properties)?),
            }
        }

        Ok(RawListing {
            headers,
            objects,
            prefixes: prefixes.into_iter().collect(),
        })
    }

    async fn content_locate(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        properties: bool,
    ) -> OioResult<(ObjectMetadata, Vec<ChunkDescriptor>)> {
        let row = self.fetch_content(account, container, name, version).await?;
        if row.deleted {
            return Err(OioError::NoSuchObject(format!(
                "{account}/{container}/{name} (deleted)"
            )));
        }
        let chunks = self.fetch_chunks(account, container, name, row.version).await?;
        Ok((row.into_meta(properties)?, chunks))
    }

    async fn content_create(&self, ctx: &RequestContext, request: &ContentCreate) -> OioResult<()> {
        ctx.check_deadline()?;
        let (account, container, name) = (
            request.account.as_str(),
            request.container.as_str(),
            request.name.as_str(),
        );
        let row = self.ensure_writable(account, container).await?;
        let versioned = self.is_versioned(&row).await?;

        let mut tx = self.db.begin().await?;
        let appended = if request.append {
            sqlx::query(
                "UPDATE contents SET length = length + ?, hash = ''
                 WHERE account = ? AND container = ? AND name = ? AND version = ? AND deleted = 0",
            )
            .bind(request.size as i64)
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(request.version)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0
        } else {
            false
        };

        if !appended {
            let inserted = sqlx::query(
                "INSERT INTO contents (account, container, name, version, content_id, policy,
                    chunk_method, length, hash, mime_type, properties, deleted, ctime)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(request.version)
            .bind(&request.content_id)
            .bind(&request.policy)
            .bind(&request.chunk_method)
            .bind(request.size as i64)
            .bind(&request.checksum)
            .bind(&request.mime_type)
            .bind(props_json(&request.properties)?)
            .bind(now_micros() / 1_000_000)
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Err(OioError::Conflict(format!(
                        "{account}/{container}/{name} version {} already exists",
                        request.version
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }

        for chunk in &request.chunks {
            let inserted = sqlx::query(
                "INSERT INTO chunks (account, container, name, version, url, pos, size, hash)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(request.version)
            .bind(&chunk.url)
            .bind(chunk.pos.to_string())
            .bind(chunk.size as i64)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Err(OioError::Conflict(format!("chunk {} already referenced", chunk.url)));
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut replaced = Vec::new();
        if !versioned && !request.append {
            replaced = sqlx::query_scalar(
                "SELECT url FROM chunks WHERE account = ? AND container = ? AND name = ? AND version < ?",
            )
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(request.version)
            .fetch_all(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM chunks WHERE account = ? AND container = ? AND name = ? AND version < ?")
                .bind(account)
                .bind(container)
                .bind(name)
                .bind(request.version)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "DELETE FROM contents WHERE account = ? AND container = ? AND name = ? AND version < ?",
            )
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(request.version)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.push_stats(account, container).await?;
        self.discard_chunks(ctx, account, container, replaced).await;
        debug!(account, container, name, version = request.version, "content committed");
        Ok(())
    }

    async fn content_delete(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()> {
        let row = self.ensure_writable(account, container).await?;
        let not_found = || OioError::NoSuchObject(format!("{account}/{container}/{name}"));

        let urls = match version {
            Some(version) => {
                let (removed, urls) = self.remove_rows(account, container, name, Some(version)).await?;
                if removed == 0 {
                    return Err(not_found());
                }
                urls
            }
            None => {
                let latest = self
                    .latest_row(account, container, name)
                    .await?
                    .filter(|latest| !latest.deleted)
                    .ok_or_else(not_found)?;
                if self.is_versioned(&row).await? {
                    sqlx::query(
                        "INSERT INTO contents (account, container, name, version, content_id, policy,
                            chunk_method, length, hash, mime_type, properties, deleted, ctime)
                         VALUES (?, ?, ?, ?, ?, ?, ?, 0, '', ?, '{}', 1, ?)",
                    )
                    .bind(account)
                    .bind(container)
                    .bind(name)
                    .bind(now_micros().max(latest.version + 1))
                    .bind(Uuid::new_v4().simple().to_string().to_uppercase())
                    .bind(&latest.policy)
                    .bind(&latest.chunk_method)
                    .bind(&latest.mime_type)
                    .bind(now_micros() / 1_000_000)
                    .execute(&*self.db)
                    .await?;
                    Vec::new()
                } else {
                    self.remove_rows(account, container, name, None).await?.1
                }
            }
        };

        self.push_stats(account, container).await?;
        self.discard_chunks(ctx, account, container, urls).await;
        Ok(())
    }

    async fn content_delete_many(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        names: &[String],
    ) -> OioResult<Vec<(String, bool)>> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            match self.content_delete(ctx, account, container, name, None).await {
                Ok(()) => results.push((name.clone(), true)),
                Err(OioError::NoSuchObject(_)) => results.push((name.clone(), false)),
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }

    async fn content_get_properties(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<ObjectMetadata> {
        self.fetch_content(account, container, name, version)
            .await?
            .into_meta(true)
    }

    async fn content_set_properties(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        properties: &Properties,
    ) -> OioResult<()> {
        self.ensure_writable(account, container).await?;
        let row = self.fetch_content(account, container, name, version).await?;
        let mut current = parse_props(&row.properties)?;
        current.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_content_properties(&row, &current).await
    }

    async fn content_del_properties(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        keys: &[String],
    ) -> OioResult<bool> {
        self.ensure_writable(account, container).await?;
        let row = self.fetch_content(account, container, name, version).await?;
        let mut current = parse_props(&row.properties)?;
        let before = current.len();
        current.retain(|key, _| !keys.contains(key));
        if current.len() == before {
            return Ok(false);
        }
        self.write_content_properties(&row, &current).await?;
        Ok(true)
    }

    async fn content_touch(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()> {
        self.fetch_content(account, container, name, version).await?;
        self.push_stats(account, container).await
    }

    async fn content_drain(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<Vec<ChunkDescriptor>> {
        self.ensure_writable(account, container).await?;
        let row = self.fetch_content(account, container, name, version).await?;
        let chunks = self
            .fetch_chunks(account, container, name, row.version)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE account = ? AND container = ? AND name = ? AND version = ?")
            .bind(account)
            .bind(container)
            .bind(name)
            .bind(row.version)
            .execute(&*self.db)
            .await?;
        info!(account, container, name, version = row.version, chunks = chunks.len(), "content drained");
        Ok(chunks)
    }

    async fn namespace_config(&self, _ctx: &RequestContext) -> OioResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM namespace_config")
            .fetch_all(&*self.db)
            .await?;
        Ok(rows.into_iter().collect())
    }
}
