use super::{SqliteMeta, compute_common_prefix, now_secs, parse_props, props_json};
use crate::{
    clients::AccountClient,
    context::RequestContext,
    errors::{OioError, OioResult},
    models::{
        container::AccountInfo,
        listing::{ContainerEntry, ContainerListParams},
        object::Properties,
    },
};
use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::info;

const DEFAULT_CONTAINER_LIMIT: usize = 1000;

#[derive(FromRow)]
struct AccountRow {
    name: String,
    ctime: i64,
    mtime: f64,
    properties: String,
}

#[derive(FromRow)]
struct StatsRow {
    name: String,
    objects: i64,
    bytes: i64,
    mtime: f64,
}

impl SqliteMeta {
    async fn fetch_account(&self, account: &str) -> OioResult<AccountRow> {
        sqlx::query_as::<_, AccountRow>(
            "SELECT name, ctime, mtime, properties FROM accounts WHERE name = ?",
        )
        .bind(account)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| OioError::NoSuchAccount(account.to_string()))
    }
}

#[async_trait]
impl AccountClient for SqliteMeta {
    async fn account_create(&self, _ctx: &RequestContext, account: &str) -> OioResult<bool> {
        let created = self.ensure_account(account).await?;
        if created {
            info!(account, "account created");
        }
        Ok(created)
    }

    async fn account_delete(&self, _ctx: &RequestContext, account: &str) -> OioResult<()> {
        self.fetch_account(account).await?;
        let containers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE account = ?")
            .bind(account)
            .fetch_one(&*self.db)
            .await?;
        if containers > 0 {
            return Err(OioError::Conflict(format!("account {account} still has containers")));
        }
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM container_stats WHERE account = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM accounts WHERE name = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(account, "account deleted");
        Ok(())
    }

    async fn account_show(&self, _ctx: &RequestContext, account: &str) -> OioResult<AccountInfo> {
        let row = self.fetch_account(account).await?;
        let (containers, objects, bytes): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(objects), 0), COALESCE(SUM(bytes), 0)
             FROM container_stats WHERE account = ? AND dtime = 0",
        )
        .bind(account)
        .fetch_one(&*self.db)
        .await?;
        Ok(AccountInfo {
            name: row.name,
            ctime: row.ctime,
            mtime: row.mtime,
            containers: containers.max(0) as u64,
            objects: objects.max(0) as u64,
            bytes: bytes.max(0) as u64,
            properties: parse_props(&row.properties)?,
        })
    }

    async fn account_list(&self, _ctx: &RequestContext) -> OioResult<Vec<String>> {
        Ok(sqlx::query_scalar("SELECT name FROM accounts ORDER BY name")
            .fetch_all(&*self.db)
            .await?)
    }

    async fn account_update(
        &self,
        _ctx: &RequestContext,
        account: &str,
        properties: Option<&Properties>,
        to_delete: Option<&[String]>,
    ) -> OioResult<()> {
        let row = self.fetch_account(account).await?;
        let mut current = parse_props(&row.properties)?;
        if let Some(properties) = properties {
            current.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(keys) = to_delete {
            current.retain(|key, _| !keys.contains(key));
        }
        sqlx::query("UPDATE accounts SET properties = ?, mtime = ? WHERE name = ?")
            .bind(props_json(&current)?)
            .bind(now_secs())
            .bind(account)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn container_list(
        &self,
        _ctx: &RequestContext,
        account: &str,
        params: &ContainerListParams,
    ) -> OioResult<Vec<ContainerEntry>> {
        self.fetch_account(account).await?;
        let limit = params.limit.unwrap_or(DEFAULT_CONTAINER_LIMIT).max(1);

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT name, objects, bytes, mtime FROM container_stats WHERE account = ",
        );
        builder.push_bind(account.to_string()).push(" AND dtime = 0");
        if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
            builder
                .push(" AND substr(name, 1, length(")
                .push_bind(prefix.to_string())
                .push(")) = ")
                .push_bind(prefix.to_string());
        }
        if let Some(marker) = &params.marker {
            builder.push(" AND name > ").push_bind(marker.clone());
        }
        if let Some(end_marker) = &params.end_marker {
            builder.push(" AND name < ").push_bind(end_marker.clone());
        }
        builder.push(" ORDER BY name LIMIT ").push_bind(limit as i64);
        let rows = builder
            .build_query_as::<StatsRow>()
            .fetch_all(&*self.db)
            .await?;

        let delimiter = params.delimiter.as_deref().unwrap_or("");
        let mut entries: Vec<ContainerEntry> = Vec::with_capacity(rows.len());
        for row in rows {
            match compute_common_prefix(&row.name, params.prefix.as_deref(), delimiter) {
                Some(prefix) => {
                    if entries.last().is_none_or(|last| last.name != prefix) {
                        entries.push(ContainerEntry {
                            name: prefix,
                            objects: 0,
                            bytes: 0,
                            is_prefix: true,
                            mtime: 0.0,
                        });
                    }
                }
                None => entries.push(ContainerEntry {
                    name: row.name,
                    objects: row.objects.max(0) as u64,
                    bytes: row.bytes.max(0) as u64,
                    is_prefix: false,
                    mtime: row.mtime,
                }),
            }
        }
        Ok(entries)
    }

    async fn container_reset(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        mtime: f64,
    ) -> OioResult<()> {
        self.fetch_account(account).await?;
        sqlx::query(
            "UPDATE container_stats SET objects = 0, bytes = 0, mtime = ?
             WHERE account = ? AND name = ?",
        )
        .bind(mtime)
        .bind(account)
        .bind(container)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn container_update(
        &self,
        _ctx: &RequestContext,
        account: &str,
        container: &str,
        dtime: f64,
    ) -> OioResult<()> {
        self.fetch_account(account).await?;
        sqlx::query(
            "INSERT INTO container_stats (account, name, objects, bytes, mtime, dtime)
             VALUES (?, ?, 0, 0, ?, ?)
             ON CONFLICT(account, name) DO UPDATE SET dtime = excluded.dtime",
        )
        .bind(account)
        .bind(container)
        .bind(dtime)
        .bind(dtime)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn account_refresh(&self, _ctx: &RequestContext, account: &str) -> OioResult<()> {
        self.fetch_account(account).await?;
        sqlx::query("UPDATE accounts SET mtime = ? WHERE name = ?")
            .bind(now_secs())
            .bind(account)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn account_flush(&self, _ctx: &RequestContext, account: &str) -> OioResult<()> {
        self.fetch_account(account).await?;
        let flushed = sqlx::query("DELETE FROM container_stats WHERE account = ?")
            .bind(account)
            .execute(&*self.db)
            .await?
            .rows_affected();
        info!(account, flushed, "account flushed");
        Ok(())
    }
}
