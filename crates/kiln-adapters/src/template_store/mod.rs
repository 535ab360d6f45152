//! Template store adapters.

mod cache;
mod memory;

pub use cache::{CacheError, CacheStore, INDEX_FILE, tree_hash};
pub use memory::InMemoryStore;
