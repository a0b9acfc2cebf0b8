//! Older names of facade operations, kept for existing callers.

use super::object_storage::{LocateOptions, ObjectStorage};
use crate::{
    context::RequestContext,
    errors::OioResult,
    models::{
        chunk::ChunkDescriptor,
        object::{ObjectMetadata, Properties},
    },
};

impl ObjectStorage {
    #[deprecated(note = "use `account_set_properties` or `account_del_properties`")]
    pub async fn account_update(
        &self,
        ctx: &RequestContext,
        account: &str,
        properties: Option<&Properties>,
        to_delete: Option<&[String]>,
    ) -> OioResult<()> {
        self.account
            .account_update(ctx, account, properties, to_delete)
            .await
    }

    #[deprecated(note = "use `container_set_properties`")]
    pub async fn container_update(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
        clear: bool,
    ) -> OioResult<()> {
        self.container_set_properties(ctx, account, container, properties, &Properties::new(), clear)
            .await
    }

    #[deprecated(note = "use `object_set_properties`")]
    pub async fn object_update(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        properties: &Properties,
        clear: bool,
    ) -> OioResult<()> {
        if clear {
            let current = self
                .object_get_properties(ctx, account, container, name, version)
                .await?;
            let keys: Vec<String> = current
                .properties
                .keys()
                .filter(|key| !properties.contains_key(*key))
                .cloned()
                .collect();
            if !keys.is_empty() {
                self.object_del_properties(ctx, account, container, name, version, &keys)
                    .await?;
            }
        }
        self.object_set_properties(ctx, account, container, name, version, properties)
            .await
    }

    #[deprecated(note = "use `object_get_properties`")]
    pub async fn object_show(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<ObjectMetadata> {
        self.object_get_properties(ctx, account, container, name, version)
            .await
    }

    #[deprecated(note = "use `object_locate`")]
    pub async fn object_analyze(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<(ObjectMetadata, Vec<ChunkDescriptor>)> {
        self.object_locate(ctx, account, container, name, version, LocateOptions::default())
            .await
    }

    #[deprecated(note = "use `account_refresh(None)`")]
    pub async fn all_accounts_refresh(&self, ctx: &RequestContext) -> OioResult<()> {
        self.account_refresh(ctx, None).await
    }
}
