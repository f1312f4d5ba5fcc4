//! Infrastructure layer - backends, storage and model orchestration

pub mod cache;
pub mod logging;
pub mod models;
pub mod storage;
