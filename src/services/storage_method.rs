//! Parses `chunk_method` descriptors (`scheme/param=value,...`) into the
//! closed set of redundancy schemes the write and read paths understand.

use crate::errors::{OioError, OioResult};
use std::{
    collections::HashMap,
    fmt,
    sync::{LazyLock, RwLock},
};

pub const DEFAULT_EC_ALGO: &str = "xor_parity";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcParams {
    pub algo: String,
    /// Data fragments per metachunk.
    pub k: usize,
    /// Parity fragments per metachunk.
    pub m: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColdParams {
    pub account_id: String,
    pub bucket_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageMethod {
    Ec(EcParams),
    Replicated { nb_copy: usize },
    Cold(ColdParams),
}

static CACHE: LazyLock<RwLock<HashMap<String, StorageMethod>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

impl StorageMethod {
    pub fn parse(chunk_method: &str) -> OioResult<Self> {
        let invalid = || OioError::InvalidStorageMethod(chunk_method.to_string());
        let (scheme, raw_params) = match chunk_method.split_once('/') {
            Some((scheme, params)) => (scheme, params),
            None => (chunk_method, ""),
        };

        let mut params = HashMap::new();
        for pair in raw_params.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
            params.insert(key.trim(), value.trim());
        }
        let numeric = |key: &str| -> OioResult<Option<usize>> {
            params
                .get(key)
                .map(|v| v.parse::<usize>().map_err(|_| invalid()))
                .transpose()
        };
        let text = |key: &str| -> OioResult<String> {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .ok_or_else(invalid)
        };

        match scheme {
            "ec" => {
                let k = numeric("k")?.ok_or_else(invalid)?;
                let m = numeric("m")?.ok_or_else(invalid)?;
                if k == 0 {
                    return Err(invalid());
                }
                let algo = params
                    .get("algo")
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| DEFAULT_EC_ALGO.to_string());
                Ok(StorageMethod::Ec(EcParams { algo, k, m }))
            }
            "plain" | "replicated" => {
                let nb_copy = numeric("nb_copy")?.unwrap_or(1);
                if nb_copy == 0 {
                    return Err(invalid());
                }
                Ok(StorageMethod::Replicated { nb_copy })
            }
            "backblaze" | "cold" => Ok(StorageMethod::Cold(ColdParams {
                account_id: text("account_id")?,
                bucket_name: text("bucket_name")?,
            })),
            _ => Err(invalid()),
        }
    }

    /// Memoized `parse`.
    pub fn load(chunk_method: &str) -> OioResult<Self> {
        if let Some(found) = CACHE
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(chunk_method)
        {
            return Ok(found.clone());
        }
        let parsed = Self::parse(chunk_method)?;
        CACHE
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(chunk_method.to_string(), parsed.clone());
        Ok(parsed)
    }

    pub fn is_ec(&self) -> bool {
        matches!(self, StorageMethod::Ec(_))
    }

    /// Chunks a complete metachunk is made of.
    pub fn expected_chunks(&self) -> usize {
        match self {
            StorageMethod::Ec(ec) => ec.k + ec.m,
            StorageMethod::Replicated { nb_copy } => *nb_copy,
            StorageMethod::Cold(_) => 1,
        }
    }

    /// Chunks needed to read a metachunk back.
    pub fn min_chunks_to_read(&self) -> usize {
        match self {
            StorageMethod::Ec(ec) => ec.k,
            StorageMethod::Replicated { .. } | StorageMethod::Cold(_) => 1,
        }
    }

    /// Replicas that must be written for a metachunk upload to succeed.
    pub fn write_quorum(&self) -> usize {
        match self {
            StorageMethod::Ec(ec) => ec.k + ec.m,
            StorageMethod::Replicated { nb_copy } => nb_copy / 2 + 1,
            StorageMethod::Cold(_) => 1,
        }
    }
}

impl fmt::Display for StorageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMethod::Ec(ec) => write!(f, "ec/algo={},k={},m={}", ec.algo, ec.k, ec.m),
            StorageMethod::Replicated { nb_copy } => write!(f, "plain/nb_copy={nb_copy}"),
            StorageMethod::Cold(cold) => write!(
                f,
                "backblaze/account_id={},bucket_name={}",
                cold.account_id, cold.bucket_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_erasure_coding() {
        let method = StorageMethod::parse("ec/algo=liberasurecode_rs_vand,k=6,m=3").unwrap();
        assert_eq!(
            method,
            StorageMethod::Ec(EcParams {
                algo: "liberasurecode_rs_vand".into(),
                k: 6,
                m: 3
            })
        );
        assert_eq!(method.expected_chunks(), 9);
        assert_eq!(method.min_chunks_to_read(), 6);
    }

    #[test]
    fn parses_replication_with_default_copies() {
        assert_eq!(
            StorageMethod::parse("plain/nb_copy=3").unwrap(),
            StorageMethod::Replicated { nb_copy: 3 }
        );
        assert_eq!(
            StorageMethod::parse("plain").unwrap(),
            StorageMethod::Replicated { nb_copy: 1 }
        );
        assert_eq!(
            StorageMethod::parse("replicated/nb_copy=3")
                .unwrap()
                .write_quorum(),
            2
        );
    }

    #[test]
    fn parses_cold_storage() {
        let method = StorageMethod::parse("backblaze/account_id=acc,bucket_name=bkt").unwrap();
        assert_eq!(
            method,
            StorageMethod::Cold(ColdParams {
                account_id: "acc".into(),
                bucket_name: "bkt".into()
            })
        );
        assert_eq!(StorageMethod::parse(&method.to_string()).unwrap(), method);
    }

    #[test]
    fn rejects_bad_descriptors() {
        for bad in [
            "raid/level=5",
            "ec/k=6",
            "ec/k=six,m=3",
            "plain/nb_copy=-1",
            "plain/nb_copy",
            "backblaze/account_id=acc",
            "",
        ] {
            assert!(
                matches!(
                    StorageMethod::parse(bad),
                    Err(OioError::InvalidStorageMethod(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn load_memoizes() {
        let first = StorageMethod::load("ec/k=2,m=1").unwrap();
        let second = StorageMethod::load("ec/k=2,m=1").unwrap();
        assert_eq!(first, second);
        assert!(CACHE.read().unwrap().contains_key("ec/k=2,m=1"));
    }
}
