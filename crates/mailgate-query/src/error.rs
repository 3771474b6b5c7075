//! Error types for query construction and card decoding.

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors raised while building a query or decoding a card.
///
/// Evaluation never fails: every token is validated when the query is
/// constructed, before any record is examined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Unknown `anyof`/`allof` combinator.
    #[error("unknown query filter test {0:?}")]
    UnknownFilterTest(String),

    /// Unknown text-match type.
    #[error("unknown text match type {0:?}")]
    UnknownMatchType(String),

    /// Unknown collation identifier.
    #[error("unknown collation {0:?}")]
    UnknownCollation(String),

    /// The card text is not a valid vCard.
    #[error("invalid card: {0}")]
    InvalidCard(String),

    /// The serialized query could not be decoded.
    #[error("malformed query: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
