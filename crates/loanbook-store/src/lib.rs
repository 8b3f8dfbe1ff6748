//! Storage backends for loanbook.
//!
//! [`LedgerStore`], [`AttachmentStore`] and [`Identity`] are the seams the
//! CLI programs against. [`memory::MemoryStore`] implements all three in
//! process; the `google` feature adds Sheets, Drive and Google sign-in.

pub mod error;
pub mod memory;
pub mod store;

#[cfg(feature = "google")]
pub mod google;

pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use memory::MemoryStore;
pub use store::{
    AttachmentFile, AttachmentStore, BoxFuture, Identity, LedgerStore, SchemaMigration,
    mime_type_for,
};
