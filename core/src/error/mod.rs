#[allow(clippy::module_inception)]
pub mod error;
pub mod kind;

pub use error::{Result, StorageError};
pub use kind::ErrorKind;
