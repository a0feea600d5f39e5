use statekeep_core::api::{ErrorKind, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// 11: config error, 20: io failure, 30: bad state data,
    /// 40: protocol misuse, 50: internal/uncategorized.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 11,
            CliError::Storage(e) => match e.kind() {
                ErrorKind::IoFailure => 20,
                ErrorKind::SchemaViolation => 30,
                ErrorKind::ProtocolMisuse => 40,
                ErrorKind::NotFound => 50,
            },
            CliError::Io(_) => 20,
            CliError::Command(_) => 20,
            CliError::Anyhow(_) => 50,
        }
    }
}
