//! Counter refresh of containers and accounts.

use super::object_storage::ObjectStorage;
use crate::{
    context::RequestContext,
    errors::OioResult,
    models::listing::ContainerListParams,
};
use chrono::Utc;
use tracing::{debug, info, warn};

fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl ObjectStorage {
    /// Recompute a container's counters in its account, then touch it so
    /// the metadata service reports fresh statistics. A container that no
    /// longer exists is recorded as deleted.
    pub async fn container_refresh(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        let attempts = self.config.refresh_attempts.max(1);
        for attempt in 1..=attempts {
            match self
                .account
                .container_reset(ctx, account, container, now())
                .await
            {
                Ok(()) => break,
                Err(err) if err.is_conflict() && attempt < attempts => {
                    debug!(account, container, attempt, "container reset conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        match self.metadata.container_touch(ctx, account, container).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                warn!(account, container, "refreshed container is gone, recording deletion");
                self.account
                    .container_update(ctx, account, container, now())
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Refresh one account and all its containers, or every account when
    /// `account` is `None`. Entities removed in the meantime are skipped.
    pub async fn account_refresh(&self, ctx: &RequestContext, account: Option<&str>) -> OioResult<()> {
        let Some(account) = account else {
            for account in self.account.account_list(ctx).await? {
                match self.refresh_one_account(ctx, &account).await {
                    Err(err) if err.is_not_found() => {
                        debug!(account = %account, "account vanished during refresh");
                    }
                    other => other?,
                }
            }
            return Ok(());
        };
        self.refresh_one_account(ctx, account).await
    }

    async fn refresh_one_account(&self, ctx: &RequestContext, account: &str) -> OioResult<()> {
        self.account.account_refresh(ctx, account).await?;

        let mut params = ContainerListParams::default();
        let mut refreshed = 0usize;
        loop {
            let containers = self.account.container_list(ctx, account, &params).await?;
            let Some(last) = containers.last() else {
                break;
            };
            params.marker = Some(last.name.clone());
            for entry in containers.iter().filter(|entry| !entry.is_prefix) {
                match self.container_refresh(ctx, account, &entry.name).await {
                    Ok(()) => refreshed += 1,
                    Err(err) if err.is_not_found() => {
                        debug!(account, container = %entry.name, "container vanished during refresh");
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        info!(request_id = %ctx.request_id, account, containers = refreshed, "account refreshed");
        Ok(())
    }
}
