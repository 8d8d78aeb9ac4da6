mod error;
mod traits;

pub mod filesystem;
pub mod keys;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::StorageError;
pub use traits::{BlobStore, PresignedUrl};
