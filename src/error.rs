use thiserror::Error;

/// A trade event failed structural checks at the ledger boundary and was not stored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// The ledger backend could not be reached or returned something unreadable.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid trade event: {0}")]
    Validation(#[from] ValidationError),
    #[error("ledger storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Failure of an external collaborator (market data or signal source).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0} is not configured")]
    Disabled(&'static str),
}

/// Aggregation aborted; callers fall back to an empty snapshot.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("realized profit became non-finite after {0} round-trips")]
    NonFinite(usize),
}
