//! Chunk descriptors and their composite positions.

use crate::errors::{OioError, OioResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{cmp::Ordering, fmt, str::FromStr};

/// Position of a chunk inside an object: metachunk index plus, for
/// erasure-coded content, the fragment index (`"3"` or `"3.1"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkPosition {
    pub meta: u32,
    pub sub: Option<u32>,
}

impl ChunkPosition {
    pub fn meta(meta: u32) -> Self {
        Self { meta, sub: None }
    }

    pub fn sub(meta: u32, sub: u32) -> Self {
        Self {
            meta,
            sub: Some(sub),
        }
    }
}

impl Ord for ChunkPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.meta
            .cmp(&other.meta)
            .then_with(|| self.sub.unwrap_or(0).cmp(&other.sub.unwrap_or(0)))
    }
}

impl PartialOrd for ChunkPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.meta, sub),
            None => write!(f, "{}", self.meta),
        }
    }
}

impl FromStr for ChunkPosition {
    type Err = OioError;

    fn from_str(s: &str) -> OioResult<Self> {
        let invalid = || OioError::InvalidArgument(format!("invalid chunk position `{s}`"));
        match s.split_once('.') {
            Some((meta, sub)) => Ok(Self::sub(
                meta.parse().map_err(|_| invalid())?,
                sub.parse().map_err(|_| invalid())?,
            )),
            None => Ok(Self::meta(s.parse().map_err(|_| invalid())?)),
        }
    }
}

impl Serialize for ChunkPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Extended attributes reported by a blob node for one chunk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChunkProbe {
    pub chunk_size: u64,
    pub chunk_hash: String,
    pub full_path: String,
    pub content_id: String,
    pub chunk_pos: ChunkPosition,
    /// Size of the whole metachunk the fragment belongs to.
    pub metachunk_size: u64,
}

/// One chunk of an object as recorded by the metadata service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChunkDescriptor {
    /// Opaque backend-assigned location.
    pub url: String,
    pub pos: ChunkPosition,
    /// Size of the metachunk this chunk belongs to.
    pub size: u64,
    pub hash: String,
    /// Byte offset of the metachunk within the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ChunkProbe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkDescriptor {
    pub fn new(url: impl Into<String>, pos: ChunkPosition, size: u64, hash: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pos,
            size,
            hash: hash.into(),
            offset: None,
            probe: None,
            error: None,
        }
    }

    /// Last path segment of the url.
    pub fn chunk_id(&self) -> &str {
        chunk_id_of(&self.url)
    }
}

pub fn chunk_id_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// A slot handed out by the directory for a chunk not yet written.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChunkSlot {
    pub url: String,
    pub pos: ChunkPosition,
}

/// Chunk record as consumed by the raw update of the metadata service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChunkBean {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub hash: String,
    pub size: u64,
    pub pos: ChunkPosition,
    pub content: String,
}

impl ChunkBean {
    pub fn new(url: &str, meta: &ChunkDescriptor, content_id: &str) -> Self {
        Self {
            kind: "chunk".into(),
            id: url.to_string(),
            hash: meta.hash.clone(),
            size: meta.size,
            pos: meta.pos,
            content: content_id.to_string(),
        }
    }
}
