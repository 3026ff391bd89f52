/// Reed-Solomon erasure coding over shard buffers (spec.md §4.3, C3).
use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::error::{DfsError, DfsResult};

pub struct ErasureCoder {
    k: usize,
    m: usize,
    rs: ReedSolomon,
}

impl ErasureCoder {
    /// `k` data shards, `m` parity shards. `k` must be at least 1 and
    /// `k + m` must not exceed 256 (the Galois field's shard-count ceiling).
    pub fn new(k: usize, m: usize) -> DfsResult<Self> {
        if k == 0 {
            return Err(DfsError::Config("erasure coder requires at least one data shard".into()));
        }
        if k + m > 256 {
            return Err(DfsError::Config(format!(
                "erasure coder shard count {} exceeds the 256-shard limit",
                k + m
            )));
        }
        let rs = ReedSolomon::new(k, m)
            .map_err(|e| DfsError::Config(format!("failed to build reed-solomon coder: {:?}", e)))?;
        Ok(Self { k, m, rs })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn m(&self) -> usize {
        self.m
    }

    /// Splits `data` into `k` equally-sized shards, zero-padding the final
    /// shard if the input doesn't divide evenly.
    pub fn split(&self, data: &[u8]) -> Vec<Vec<u8>> {
        let shard_len = (data.len() + self.k - 1) / self.k.max(1);
        let shard_len = shard_len.max(1);
        let mut shards = Vec::with_capacity(self.k);
        for i in 0..self.k {
            let start = i * shard_len;
            let mut shard = vec![0u8; shard_len];
            if start < data.len() {
                let end = (start + shard_len).min(data.len());
                shard[..end - start].copy_from_slice(&data[start..end]);
            }
            shards.push(shard);
        }
        shards
    }

    /// Computes the `m` parity shards for a set of `k` equally-sized data shards.
    pub fn encode(&self, data_shards: &[Vec<u8>]) -> DfsResult<Vec<Vec<u8>>> {
        if data_shards.len() != self.k {
            return Err(DfsError::Config(format!(
                "expected {} data shards, got {}",
                self.k,
                data_shards.len()
            )));
        }
        let shard_len = data_shards[0].len();
        let mut all_shards: Vec<Vec<u8>> = data_shards.to_vec();
        all_shards.extend(std::iter::repeat(vec![0u8; shard_len]).take(self.m));

        self.rs
            .encode(&mut all_shards)
            .map_err(|e| DfsError::Corruption(format!("reed-solomon encode failed: {:?}", e)))?;

        Ok(all_shards.split_off(self.k))
    }

    /// Verifies that the given data + parity shards are mutually consistent.
    pub fn verify(&self, shards: &[Vec<u8>]) -> DfsResult<bool> {
        if shards.len() != self.k + self.m {
            return Err(DfsError::Corruption(format!(
                "expected {} shards to verify, got {}",
                self.k + self.m,
                shards.len()
            )));
        }
        self.rs
            .verify(shards)
            .map_err(|e| DfsError::Corruption(format!("reed-solomon verify failed: {:?}", e)))
    }

    /// Reconstructs any missing shards given at least `k` of the `k + m`
    /// total shards. `shards[i]` is `None` for a shard not currently held.
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> DfsResult<()> {
        if shards.len() != self.k + self.m {
            return Err(DfsError::Corruption(format!(
                "expected {} shard slots, got {}",
                self.k + self.m,
                shards.len()
            )));
        }
        let present = shards.iter().filter(|s| s.is_some()).count();
        if present < self.k {
            return Err(DfsError::Corruption(format!(
                "insufficient shards to reconstruct: have {}, need {}",
                present, self.k
            )));
        }

        self.rs
            .reconstruct(shards)
            .map_err(|e| DfsError::Corruption(format!("reed-solomon reconstruct failed: {:?}", e)))
    }

    /// Joins `k` data shards back into the original byte stream, trimming
    /// the zero-padding added by [`split`](Self::split) beyond `original_len`.
    pub fn join(&self, data_shards: &[Vec<u8>], original_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(original_len);
        for shard in data_shards {
            out.extend_from_slice(shard);
        }
        out.truncate(original_len);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_reconstruct_from_minimum_shards() {
        let coder = ErasureCoder::new(4, 2).unwrap();
        let data = b"the quick brown fox jumps over the lazy dog, many times over";
        let data_shards = coder.split(data);
        let parity_shards = coder.encode(&data_shards).unwrap();

        let mut all: Vec<Option<Vec<u8>>> = data_shards
            .iter()
            .cloned()
            .map(Some)
            .chain(parity_shards.iter().cloned().map(Some))
            .collect();

        // Drop two shards (the coder's redundancy budget) and reconstruct.
        all[0] = None;
        all[4] = None;
        coder.reconstruct(&mut all).unwrap();

        let recovered_data: Vec<Vec<u8>> = all[..4].iter().map(|s| s.clone().unwrap()).collect();
        let joined = coder.join(&recovered_data, data.len());
        assert_eq!(joined, data);
    }

    #[test]
    fn reconstruct_fails_with_too_few_shards() {
        let coder = ErasureCoder::new(4, 2).unwrap();
        let data = b"short data";
        let data_shards = coder.split(data);
        let parity_shards = coder.encode(&data_shards).unwrap();

        let mut all: Vec<Option<Vec<u8>>> = data_shards
            .iter()
            .cloned()
            .map(Some)
            .chain(parity_shards.iter().cloned().map(Some))
            .collect();
        all[0] = None;
        all[1] = None;
        all[2] = None;

        assert!(coder.reconstruct(&mut all).is_err());
    }

    #[test]
    fn new_rejects_zero_data_shards() {
        assert!(ErasureCoder::new(0, 2).is_err());
    }
}
