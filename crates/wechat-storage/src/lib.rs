//! Storage collaborator and the expiry-aware caches built on top of it.
//!
//! The `Storage` trait is the minimal key-value capability the adapter
//! requires from its host (`read(keys) -> map`, `write(map)`,
//! `delete(keys)`). The access-token and attachment caches are thin
//! decorators over it that add expiry semantics and serialization.

mod attachment_cache;
mod hash;
mod providers;
mod token_cache;

pub use attachment_cache::AttachmentCache;
pub use hash::content_hash;
pub use providers::{FileStorage, MemoryStorage, Storage};
pub use token_cache::{AccessTokenCache, TOKEN_NEAR_EXPIRY_WINDOW_SECS};
