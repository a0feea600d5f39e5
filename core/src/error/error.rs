use std::path::PathBuf;

use thiserror::Error;

use super::kind::ErrorKind;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// The single checked error of the storage boundary.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("state of component '{component}' does not fit its schema: {message}")]
    Schema {
        component: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("io error on storage unit {}: {source}", unit.display())]
    Io {
        unit: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage spec '{spec}' references unknown macro ${macro_name}$")]
    UnresolvedMacro { spec: String, macro_name: String },

    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    #[error("session belongs to storage '{found}', not '{expected}'")]
    ForeignSession { expected: String, found: String },
}

impl StorageError {
    pub fn schema(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            component: component.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn schema_with_source<E>(component: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Schema {
            component: component.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(unit: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            unit: unit.into(),
            source,
        }
    }

    pub fn misuse(message: impl Into<String>) -> Self {
        Self::ProtocolMisuse(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema { .. } => ErrorKind::SchemaViolation,
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::UnresolvedMacro { .. } => ErrorKind::IoFailure,
            Self::ProtocolMisuse(_) => ErrorKind::ProtocolMisuse,
            Self::ForeignSession { .. } => ErrorKind::ProtocolMisuse,
        }
    }

    /// The physical unit the failure happened on, when there is one.
    pub fn unit(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { unit, .. } => Some(unit.as_path()),
            _ => None,
        }
    }
}
