//! Represents an object (one version of a named content) stored in a container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Properties = BTreeMap<String, String>;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Description of one object version.
///
/// The struct carries metadata only; bytes live in chunks on blob nodes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ObjectMetadata {
    pub account: String,
    pub container: String,
    pub name: String,

    /// Microsecond timestamp, unique and increasing per name.
    pub version: i64,

    /// Identifier shared by every chunk of this version.
    pub content_id: String,

    pub policy: String,

    /// Raw storage method descriptor, e.g. `ec/algo=xor_parity,k=4,m=1`.
    pub chunk_method: String,

    pub length: u64,

    /// Upper-case MD5 of the whole object.
    pub hash: String,

    pub mime_type: String,

    #[serde(default)]
    pub properties: Properties,

    /// Marker version left by a delete on a versioned container.
    #[serde(default)]
    pub deleted: bool,

    /// Creation time, seconds since the epoch.
    #[serde(default)]
    pub ctime: i64,
}

impl ObjectMetadata {
    /// Token binding chunks to this exact object identity.
    pub fn full_path(&self) -> String {
        full_path(&self.account, &self.container, &self.name, self.version)
    }
}

/// Names an object independently of its version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub account: String,
    pub container: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            name: name.into(),
        }
    }

    pub fn full_path(&self, version: i64) -> String {
        full_path(&self.account, &self.container, &self.name, version)
    }
}

/// `account/container/name/version`, each name percent-encoded.
pub fn full_path(account: &str, container: &str, name: &str, version: i64) -> String {
    format!(
        "{}/{}/{}/{}",
        quote_plus(account),
        quote_plus(container),
        quote_plus(name),
        version
    )
}

/// Form-style encoding: spaces become `+`, everything else non-alphanumeric
/// is percent-encoded.
pub fn quote_plus(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

pub fn unquote_plus(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_path_encodes_every_component() {
        let path = full_path("my account", "c/1", "photos/été.jpg", 42);
        assert_eq!(path, "my+account/c%2F1/photos%2F%C3%A9t%C3%A9.jpg/42");
    }

    #[test]
    fn unquote_reverses_quote() {
        let name = "a b/c+d%e";
        assert_eq!(unquote_plus(&quote_plus(name)), name);
    }
}
