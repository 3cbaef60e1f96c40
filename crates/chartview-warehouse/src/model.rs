use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar of a single symbol.
///
/// ```json
/// {
///     "symbol": "RELIANCE",
///     "timestamp": "2024-05-02",
///     "open": 2870.0,
///     "high": 2935.5,
///     "low": 2861.2,
///     "close": 2925.9,
///     "volume": 6029120
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, utoipa::ToSchema)]
pub struct PriceBar {
    pub symbol: String,
    pub timestamp: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceBar {
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// Sort bars by date and keep only the last bar seen for each date, so that timestamps
/// come out strictly increasing.
pub fn normalize(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    // stable sort keeps input order among equal dates; the later row wins
    bars.sort_by_key(|bar| bar.timestamp);
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// A distinct symbol of a table, with the name it is displayed under.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, utoipa::ToSchema)]
pub struct Listing {
    pub symbol: String,
    pub name: String,
}

impl Listing {
    pub fn new(symbol: impl Into<String>, name: Option<String>) -> Self {
        let symbol = symbol.into();
        let name = name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| symbol.clone());
        Self { symbol, name }
    }

    /// Case-insensitive match against both the symbol and the display name.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.symbol.to_lowercase().contains(&term)
            || self.name.to_lowercase().contains(&term)
    }
}

/// Inclusive range of trading days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// The `days` calendar days up to and including `end`; clamped at the earliest
    /// representable date.
    pub fn lookback(end: NaiveDate, days: u32) -> Self {
        let start = end
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
