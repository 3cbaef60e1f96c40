use crate::error::Result;
use crate::model::{DateRange, Listing, PriceBar};
use async_trait::async_trait;

/// Data access framework.
///
/// The dashboard reads from two places, split into two traits so that either side can be
/// swapped out (e.g., for an in-memory double in tests);
///
/// ```text
/// 1. `[Store]` - the rows already persisted in the local database file.
/// 2. `[Http]` - fresh rows fetched from a market data provider.
/// ```
pub trait Store {
    /// Names of every user table in the database, in name order.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Distinct symbols of `table`, ordered by symbol.
    fn read_symbols(&self, table: &str) -> Result<Vec<Listing>>;

    /// The persisted series of `symbol` in `table`, ordered by date ascending.
    fn read_series(&self, table: &str, symbol: &str) -> Result<Vec<PriceBar>>;
}

/// API to a market data provider; how are the rows of one symbol **extracted** and
/// **transformed** into [`PriceBar`]s?
#[async_trait]
pub trait Http {
    /// Daily bars of `symbol` within `range`, strictly increasing by date.
    async fn fetch(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceBar>>;
}
