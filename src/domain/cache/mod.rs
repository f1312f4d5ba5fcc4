//! Cache domain - cache backend contract and key derivation

mod backend;
mod key;

pub use backend::{CacheBackend, CacheValue};
pub use key::{key_component, CacheKey};
