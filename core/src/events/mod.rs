//! Change notification channel.

mod bus;
mod types;

pub use bus::{BroadcastDirection, Listener, MessageBus, Topic};
pub use types::{ChangeEvent, StorageListener, STORAGE_TOPIC};
