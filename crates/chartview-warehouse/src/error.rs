use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the store and the market data provider.
///
/// An empty price series is not an error; callers render a placeholder for it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database file is missing, unreadable, or locked by another process.
    #[error("store unavailable at {}: {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Network or provider failure; recovered by falling back to persisted rows.
    #[error("market data fetch failed for {symbol}: {reason}")]
    FetchTimeout { symbol: String, reason: String },

    /// The provider answered, but had no rows for the symbol.
    #[error("provider returned no rows for {0}")]
    UnknownSymbol(String),
}

impl Error {
    /// Fetch errors degrade to persisted data instead of failing the interaction.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FetchTimeout { .. } | Self::UnknownSymbol(_))
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
