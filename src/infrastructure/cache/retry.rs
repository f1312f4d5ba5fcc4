//! Node placement and retry-with-re-routing for the sharded cache
//!
//! A failed attempt is not retried against the same node: every retry
//! re-derives the placement hash from `(original hash, retry number)`, which
//! moves the request to another node.

use std::future::Future;

use tracing::debug;

use crate::domain::DomainError;

/// Retries after the first attempt before a failure is propagated
pub const MAX_RETRIES: u32 = 5;

/// 15-bit CRC32-derived server hash, never zero
pub fn server_hash(bytes: &[u8]) -> u32 {
    match (crc32fast::hash(bytes) >> 16) & 0x7fff {
        0 => 1,
        hash => hash,
    }
}

/// Placement hash of `key` for a given retry attempt.
///
/// Attempt 0 hashes the key itself. Later attempts hash the decimal original
/// hash followed by the decimal retry number.
pub fn placement_hash(key: &str, retry: u32) -> u32 {
    let hash = server_hash(key.as_bytes());
    if retry == 0 {
        hash
    } else {
        server_hash(format!("{}{}", hash, retry).as_bytes())
    }
}

/// Bounded retry loop selecting a node index per attempt
#[derive(Debug, Clone, Copy)]
pub struct Rerouter {
    max_retries: u32,
    rehash: fn(&str, u32) -> u32,
}

impl Default for Rerouter {
    fn default() -> Self {
        Self::new(MAX_RETRIES, placement_hash)
    }
}

impl Rerouter {
    pub fn new(max_retries: u32, rehash: fn(&str, u32) -> u32) -> Self {
        Self {
            max_retries,
            rehash,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Node index used for `key` on the given attempt
    pub fn node_index(
        &self,
        key: &str,
        retry: u32,
        node_count: usize,
    ) -> Result<usize, DomainError> {
        if node_count == 0 {
            return Err(DomainError::configuration("Cannot place a key without cache nodes"));
        }
        Ok((self.rehash)(key, retry) as usize % node_count)
    }

    /// Runs `op` against the selected node until it succeeds or the retry
    /// budget is spent, in which case the last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        key: &str,
        node_count: usize,
        mut op: F,
    ) -> Result<T, DomainError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut retry = 0;
        loop {
            let index = self.node_index(key, retry, node_count)?;
            match op(index).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    retry += 1;
                    if retry > self.max_retries {
                        return Err(e);
                    }
                    debug!(key = %key, node = index, retry, error = %e, "Re-routing cache call");
                }
            }
        }
    }
}
