/// Failure taxonomy shared by every fallible storage operation.
///
/// `NotFound` is never raised: read APIs surface it as `None` / `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    SchemaViolation,
    IoFailure,
    ProtocolMisuse,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::SchemaViolation => "schema_violation",
            Self::IoFailure => "io_failure",
            Self::ProtocolMisuse => "protocol_misuse",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
