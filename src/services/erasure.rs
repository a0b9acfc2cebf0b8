//! Erasure coding seam.
//!
//! The orchestrators only need to split a metachunk into `k + m` fragments
//! and rebuild it from whatever fragments could be read. `XorParityCodec`
//! writes one XOR parity block into every parity slot, which survives the
//! loss of any single fragment.

use super::storage_method::EcParams;
use crate::errors::{OioError, OioResult};
use bytes::Bytes;

pub trait ErasureCodec: Send + Sync {
    fn encode(&self, params: &EcParams, data: &[u8]) -> OioResult<Vec<Bytes>>;

    /// Rebuild `size` bytes from `k + m` optional fragments, in position order.
    fn decode(&self, params: &EcParams, fragments: &[Option<Bytes>], size: usize)
    -> OioResult<Bytes>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct XorParityCodec;

impl XorParityCodec {
    fn fragment_size(params: &EcParams, size: usize) -> usize {
        size.div_ceil(params.k)
    }
}

impl ErasureCodec for XorParityCodec {
    fn encode(&self, params: &EcParams, data: &[u8]) -> OioResult<Vec<Bytes>> {
        let fragment_size = Self::fragment_size(params, data.len());
        let mut fragments = Vec::with_capacity(params.k + params.m);
        let mut parity = vec![0u8; fragment_size];
        for idx in 0..params.k {
            let start = (idx * fragment_size).min(data.len());
            let end = (start + fragment_size).min(data.len());
            let mut fragment = vec![0u8; fragment_size];
            fragment[..end - start].copy_from_slice(&data[start..end]);
            for (p, b) in parity.iter_mut().zip(&fragment) {
                *p ^= b;
            }
            fragments.push(Bytes::from(fragment));
        }
        let parity = Bytes::from(parity);
        for _ in 0..params.m {
            fragments.push(parity.clone());
        }
        Ok(fragments)
    }

    fn decode(
        &self,
        params: &EcParams,
        fragments: &[Option<Bytes>],
        size: usize,
    ) -> OioResult<Bytes> {
        if fragments.len() != params.k + params.m {
            return Err(OioError::UnrecoverableContent(format!(
                "expected {} fragments, got {}",
                params.k + params.m,
                fragments.len()
            )));
        }
        let fragment_size = Self::fragment_size(params, size);
        let missing: Vec<usize> = (0..params.k).filter(|i| fragments[*i].is_none()).collect();
        let rebuilt = match missing.as_slice() {
            [] => None,
            [lost] => {
                let parity = fragments[params.k..]
                    .iter()
                    .flatten()
                    .next()
                    .ok_or_else(|| {
                        OioError::UnrecoverableContent("no parity fragment available".into())
                    })?;
                let mut block = parity.to_vec();
                for fragment in fragments[..params.k].iter().flatten() {
                    for (b, x) in block.iter_mut().zip(fragment.iter()) {
                        *b ^= x;
                    }
                }
                Some((*lost, Bytes::from(block)))
            }
            _ => {
                return Err(OioError::UnrecoverableContent(format!(
                    "{} data fragments missing",
                    missing.len()
                )));
            }
        };

        let mut out = Vec::with_capacity(fragment_size * params.k);
        for idx in 0..params.k {
            let fragment = match (&fragments[idx], &rebuilt) {
                (Some(fragment), _) => fragment,
                (None, Some((lost, block))) if *lost == idx => block,
                (None, _) => {
                    return Err(OioError::UnrecoverableContent(format!(
                        "fragment {idx} missing"
                    )));
                }
            };
            if fragment.len() != fragment_size {
                return Err(OioError::CorruptedChunk(format!(
                    "fragment {idx} has {} bytes, expected {fragment_size}",
                    fragment.len()
                )));
            }
            out.extend_from_slice(fragment);
        }
        out.truncate(size);
        Ok(Bytes::from(out))
    }
}
