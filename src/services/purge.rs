//! Version retention: delete every version of every object beyond the
//! `maxvers` most recent live ones.

use super::object_storage::ObjectStorage;
use crate::{
    context::RequestContext,
    errors::{OioError, OioResult},
    models::{
        container::{NS_MAX_VERSIONS, SYS_MAX_VERSIONS},
        listing::ListParams,
    },
};
use std::collections::HashSet;
use tracing::{debug, info};

/// Versions of one object name, gathered across listing pages.
///
/// Listings return versions newest first. The last object of a page may
/// reappear at the top of the next one, so versions already seen are
/// ignored. Deleted markers are never retained nor deleted.
#[derive(Debug, Default)]
pub struct VersionAccumulator {
    name: Option<String>,
    versions: Vec<i64>,
    seen: HashSet<i64>,
}

/// Versions of `name` to delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Excess {
    pub name: String,
    pub versions: Vec<i64>,
}

impl VersionAccumulator {
    /// Feed one listing entry. When it starts a new name, the previous
    /// name's excess versions are returned.
    pub fn push(&mut self, name: &str, version: i64, deleted: bool, maxvers: usize) -> Option<Excess> {
        let flushed = match &self.name {
            Some(current) if current == name => None,
            _ => {
                let flushed = self.finish(maxvers);
                self.name = Some(name.to_string());
                flushed
            }
        };
        if self.seen.insert(version) && !deleted {
            self.versions.push(version);
        }
        flushed
    }

    /// Excess versions of the name being accumulated, if any.
    pub fn finish(&mut self, maxvers: usize) -> Option<Excess> {
        let name = self.name.take()?;
        self.seen.clear();
        let versions = std::mem::take(&mut self.versions);
        let excess: Vec<i64> = versions.into_iter().skip(maxvers).collect();
        (!excess.is_empty()).then_some(Excess {
            name,
            versions: excess,
        })
    }
}

fn parse_max_versions(raw: &str, source: &str) -> OioResult<i64> {
    raw.trim().parse().map_err(|_| {
        OioError::ConfigurationException(format!("invalid max versions `{raw}` in {source}"))
    })
}

impl ObjectStorage {
    /// Retention of a container: its own system property, else the
    /// namespace default.
    async fn resolve_max_versions(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<i64> {
        let info = self.metadata.container_show(ctx, account, container).await?;
        if let Some(raw) = info.system.get(SYS_MAX_VERSIONS) {
            return parse_max_versions(raw, SYS_MAX_VERSIONS);
        }
        let config = self.metadata.namespace_config(ctx).await?;
        match config.get(NS_MAX_VERSIONS) {
            Some(raw) => parse_max_versions(raw, NS_MAX_VERSIONS),
            None => Err(OioError::ConfigurationException(format!(
                "no `{SYS_MAX_VERSIONS}` on container and no `{NS_MAX_VERSIONS}` in namespace"
            ))),
        }
    }

    /// Delete versions beyond retention. A negative `maxvers` keeps
    /// everything, zero keeps the latest. Returns the deleted
    /// `(name, version)` pairs.
    pub async fn container_purge(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        maxvers: Option<i64>,
    ) -> OioResult<Vec<(String, i64)>> {
        let maxvers = match maxvers {
            Some(maxvers) => maxvers,
            None => self.resolve_max_versions(ctx, account, container).await?,
        };
        if maxvers < 0 {
            debug!(account, container, "unlimited retention, nothing to purge");
            return Ok(Vec::new());
        }
        let maxvers = maxvers.max(1) as usize;

        let params = ListParams {
            versions: true,
            deleted: true,
            ..ListParams::default()
        };
        let mut deleted = Vec::new();
        let mut accumulator = VersionAccumulator::default();
        let mut pager = self.object_pager(ctx, account, container, params);
        while let Some(page) = pager.next_page().await? {
            for obj in &page.objects {
                if let Some(excess) = accumulator.push(&obj.name, obj.version, obj.deleted, maxvers) {
                    self.delete_versions(ctx, account, container, excess, &mut deleted)
                        .await?;
                }
            }
        }
        if let Some(excess) = accumulator.finish(maxvers) {
            self.delete_versions(ctx, account, container, excess, &mut deleted)
                .await?;
        }

        info!(
            request_id = %ctx.request_id,
            account,
            container,
            maxvers,
            deleted = deleted.len(),
            "container purged"
        );
        Ok(deleted)
    }

    async fn delete_versions(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        excess: Excess,
        deleted: &mut Vec<(String, i64)>,
    ) -> OioResult<()> {
        for version in excess.versions {
            match self
                .metadata
                .content_delete(ctx, account, container, &excess.name, Some(version))
                .await
            {
                Ok(()) => deleted.push((excess.name.clone(), version)),
                Err(OioError::NoSuchObject(_)) => {
                    debug!(name = %excess.name, version, "version already gone");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(entries: &[(&str, i64, bool)], maxvers: usize) -> Vec<Excess> {
        let mut acc = VersionAccumulator::default();
        let mut out: Vec<Excess> = entries
            .iter()
            .filter_map(|(name, version, deleted)| acc.push(name, *version, *deleted, maxvers))
            .collect();
        out.extend(acc.finish(maxvers));
        out
    }

    #[test]
    fn keeps_the_most_recent_versions() {
        let out = feed(&[("a", 4, false), ("a", 3, false), ("a", 2, false), ("a", 1, false)], 2);
        assert_eq!(
            out,
            vec![Excess {
                name: "a".into(),
                versions: vec![2, 1]
            }]
        );
    }

    #[test]
    fn flushes_on_name_change() {
        let out = feed(
            &[("a", 2, false), ("a", 1, false), ("b", 9, false), ("b", 8, false), ("b", 7, false)],
            1,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "a");
        assert_eq!(out[0].versions, vec![1]);
        assert_eq!(out[1].name, "b");
        assert_eq!(out[1].versions, vec![8, 7]);
    }

    #[test]
    fn repeated_versions_across_pages_are_ignored() {
        // The last object of page one is listed again on page two.
        let out = feed(&[("a", 3, false), ("a", 3, false), ("a", 2, false), ("a", 1, false)], 2);
        assert_eq!(out[0].versions, vec![1]);
    }

    #[test]
    fn deleted_markers_do_not_count() {
        let out = feed(&[("a", 5, true), ("a", 4, false), ("a", 3, false), ("a", 2, false)], 2);
        assert_eq!(out[0].versions, vec![2]);
    }

    #[test]
    fn nothing_in_excess_yields_nothing() {
        assert!(feed(&[("a", 2, false), ("b", 1, false)], 1).is_empty());
        assert!(feed(&[], 1).is_empty());
    }
}
