/// Core error type.
///
/// Adapter crates map their specific errors into this type so startup and
/// transport failures are reported consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure talking to the record or conversation backend.
///
/// The message carries backend detail for logs; it is never shown to users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The backend answered, but what it holds cannot be decoded.
    #[error("corrupt data: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Everything that can go wrong in a single conversation turn.
///
/// The command router picks the user-facing text per variant; none of these
/// are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("not authorized")]
    AuthorizationDenied,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no record for passkey")]
    NotFound,

    #[error("malformed conversation state: {0}")]
    MalformedState(String),
}
