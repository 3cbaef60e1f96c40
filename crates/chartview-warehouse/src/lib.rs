pub mod api;
pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use crate::api::{Http, Store};
pub use crate::error::{Error, Result};
pub use crate::model::{DateRange, Listing, PriceBar};
pub use crate::schema::stock::prices::YahooFinance;
pub use crate::store::SqliteStore;
