//! Conversion between component state objects, the internal JSON tree and
//! the bytes of a storage unit.

mod document;
mod fingerprint;
mod value;

pub use document::{UnitDocument, UnitFormat, DOCUMENT_VERSION};
pub use fingerprint::Fingerprint;
pub use value::{from_internal, merge_into, to_internal};
