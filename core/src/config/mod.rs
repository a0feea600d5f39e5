mod load;
mod types;

pub use load::{load_default, load_from_path, CONFIG_ENV, LOCAL_CONFIG_FILE};
pub use types::{EventsConfig, LoggingConfig, StorageConfig, WatchConfig};
