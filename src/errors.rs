use thiserror::Error;

/// Failure reported by a `DocumentStore` backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("listener failed: {0}")]
    Listener(String),
    #[error("read of {path} failed: {reason}")]
    Read { path: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything the ride list can surface to the user. None of these are fatal;
/// they end up in `RideListState::error_message`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RideError {
    #[error("driver id is required")]
    Validation,
    #[error("could not load rides: {0}")]
    Query(String),
    #[error("could not read {what} {id}: {reason}")]
    Decode {
        what: &'static str,
        id: String,
        reason: String,
    },
    #[error("could not load {what} for ride {id}: {reason}")]
    Fetch {
        what: &'static str,
        id: String,
        reason: String,
    },
    #[error("no rides found on this date")]
    EmptyResult,
    #[error("timed out loading {what} for ride {id}")]
    Timeout { what: &'static str, id: String },
}

impl From<StoreError> for RideError {
    fn from(value: StoreError) -> Self {
        RideError::Query(value.to_string())
    }
}

impl RideError {
    pub fn decode(what: &'static str, id: impl Into<String>, reason: impl ToString) -> Self {
        RideError::Decode {
            what,
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
