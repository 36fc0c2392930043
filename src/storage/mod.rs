pub mod blob;
pub mod keys;

pub use blob::{LocalBlobStore, StorageError, StoredBlob};
