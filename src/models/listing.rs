//! Listing parameters and pages, for objects in a container and for
//! containers in an account.

use super::object::ObjectMetadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const HEADER_LIST_TRUNCATED: &str = "x-oio-list-truncated";
pub const HEADER_LIST_MARKER: &str = "x-oio-list-marker";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Include object properties in each entry.
    pub properties: bool,
    /// List every version, not only the latest.
    pub versions: bool,
    /// Include deleted-marker versions.
    pub deleted: bool,
}

/// Listing as returned by the metadata service, before normalization:
/// truncation and marker travel as headers, entries use backend field names.
#[derive(Clone, Debug, Default)]
pub struct RawListing {
    pub headers: HashMap<String, String>,
    pub objects: Vec<serde_json::Value>,
    pub prefixes: Vec<String>,
}

/// One page of a container listing.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ListingPage {
    pub objects: Vec<ObjectMetadata>,
    pub prefixes: Vec<String>,
    pub truncated: bool,
    /// Last-seen object name, percent-decoded. Pass as `marker` to continue.
    pub next_marker: Option<String>,
}

/// Entry of an account's container listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub name: String,
    pub objects: u64,
    pub bytes: u64,
    pub is_prefix: bool,
    pub mtime: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContainerListParams {
    pub limit: Option<usize>,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}
