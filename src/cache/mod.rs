//! Local cache store used as an offline fallback and read-through cache.
//!
//! This module provides:
//! - A durable string-keyed backend (`SqliteStorage`) and an in-process one
//! - One JSON array of records per logical key, namespaced with a fixed prefix
//! - Corruption-tolerant typed reads and idempotent inserts

mod layer;
mod storage;
mod traits;

pub use layer::LocalCache;
pub use storage::{namespaced, CacheStorage, MemoryStorage, SqliteStorage, KEY_PREFIX};
pub use traits::{decode_record, Record, ID_FIELD, TENANT_FIELD, UPDATED_AT_FIELD};
