//! Represents accounts and containers, the two namespaces above objects.

use super::object::Properties;
use serde::{Deserialize, Serialize};

/// System property holding a container's version retention.
pub const SYS_MAX_VERSIONS: &str = "sys.m2.policy.version";
/// Namespace configuration key for the default retention.
pub const NS_MAX_VERSIONS: &str = "meta2.max_versions";

/// A container within an account.
///
/// User properties and system properties are kept apart; freezing is a
/// system-level state that rejects content mutation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ContainerInfo {
    pub account: String,
    pub name: String,
    pub properties: Properties,
    pub system: Properties,
    pub frozen: bool,
    pub ctime: i64,
}

/// Summary of an account and its counters.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AccountInfo {
    pub name: String,
    pub ctime: i64,
    pub mtime: f64,
    pub containers: u64,
    pub objects: u64,
    pub bytes: u64,
    pub properties: Properties,
}

/// Stable identifier of a container, derived from its names.
pub fn container_id(account: &str, container: &str) -> String {
    format!("{:X}", md5::compute(format!("{account}\0{container}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_is_stable_and_distinct() {
        assert_eq!(container_id("acct", "c1"), container_id("acct", "c1"));
        assert_ne!(container_id("acct", "c1"), container_id("acct", "c2"));
        assert_ne!(container_id("ac", "ct"), container_id("a", "cct"));
        assert_eq!(container_id("acct", "c1").len(), 32);
    }
}
