//! Component state storage.
//!
//! A `Storage` reads component state lazily from its units and saves it in
//! cycles: `start_externalization` collects state, `start_save` turns the
//! collected state into a `SaveSession` that writes the dirty units, and
//! `finish_save` ends the cycle. Units changed outside the process are
//! detected by fingerprint and announced on the storage's message bus.

mod externalization;
mod reconcile;
mod save_session;
mod storage;
pub mod transitions;
pub mod types;

pub use externalization::ExternalizationSession;
pub use save_session::SaveSession;
pub use storage::{Storage, StorageBuilder, DEFAULT_SPEC};
pub use transitions::{PhaseTransition, TransitionError};
pub use types::{CyclePhase, PendingWrite, StorageFile, StorageId, StorageSpec};
