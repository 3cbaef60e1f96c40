use crate::api::Http;
use crate::error::{Error, Result};
use crate::model::{normalize, DateRange, PriceBar};
use crate::schema::common::convert_timestamp;
use async_trait::async_trait;
use chrono::{Days, NaiveTime};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

///////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Prices from Yahoo Finance, per ticker
//
///////////////////////////////////////////////////////////////////////////////////////////////////////

pub static YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Market data fetcher backed by the Yahoo Finance chart endpoint.
///
/// Symbols are stored without their exchange suffix (`RELIANCE`), while Yahoo expects it
/// (`RELIANCE.NS`); `suffix` bridges the two.
#[derive(Debug, Clone)]
pub struct YahooFinance {
    client: HttpClient,
    base_url: String,
    suffix: String,
}

impl YahooFinance {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: YAHOO_BASE_URL.to_string(),
            suffix: String::new(),
        }
    }

    /// Build the underlying client; `timeout` bounds the whole request and surfaces as
    /// [`Error::FetchTimeout`].
    pub fn build(user_agent: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self::new(client))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// The provider's ticker for a stored symbol, e.g., `tcs` -> `TCS.NS`.
    pub fn ticker(&self, symbol: &str) -> String {
        let tckr = symbol.trim().to_uppercase();
        let suffix = self.suffix.to_uppercase();
        if suffix.is_empty() || tckr.ends_with(&suffix) {
            tckr
        } else {
            format!("{tckr}{suffix}")
        }
    }

    fn url(&self, ticker: &str) -> String {
        format!("{}/v8/finance/chart/{ticker}", self.base_url)
    }
}

// -------------------------------------------------------------------------------------------------

#[async_trait]
impl Http for YahooFinance {
    async fn fetch(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceBar>> {
        let ticker = self.ticker(symbol);
        let url = self.url(&ticker);

        // `period2` is exclusive on Yahoo's side
        let period1 = range.start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = (range.end + Days::new(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        trace!("Fetching price data for [{ticker}] from Yahoo Finance");
        let time = std::time::Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div|split".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("[{ticker}] price fetching error: {e}\nURL: {url}");
                Error::FetchTimeout {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            error!("[{ticker}] byte transformation error: {e}\nURL: {url}");
            Error::FetchTimeout {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            }
        })?;

        let bars = extract(symbol, status, &body, range)?;
        debug!(
            "[{ticker}] {} bars fetched. Elapsed time: {} ms",
            bars.len(),
            time.elapsed().as_millis()
        );
        Ok(bars)
    }
}

/// Classify a raw provider response and transform it into bars.
pub(crate) fn extract(
    symbol: &str,
    status: StatusCode,
    body: &[u8],
    range: DateRange,
) -> Result<Vec<PriceBar>> {
    let timeout = |reason: String| Error::FetchTimeout {
        symbol: symbol.to_string(),
        reason,
    };

    // error check the deserialization
    let de = match serde_json::from_slice::<PriceHistory>(body) {
        Ok(data) => data,
        Err(e) if status.is_success() => {
            error!("[{symbol}] deserialization error: {e}");
            return Err(timeout(format!("undecodable response: {e}")));
        }
        Err(_) => return Err(timeout(format!("provider answered {status}"))),
    };

    // Yahoo answers unknown tickers with 404 and `{"chart": {"error": {"code": "Not Found"}}}`
    if let Some(err) = &de.chart.error {
        warn!("[{symbol}] provider error {}: {}", err.code, err.description);
        return if status == StatusCode::NOT_FOUND || err.code == "Not Found" {
            Err(Error::UnknownSymbol(symbol.to_string()))
        } else {
            Err(timeout(format!("{}: {}", err.code, err.description)))
        };
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::UnknownSymbol(symbol.to_string()));
    }
    if !status.is_success() {
        return Err(timeout(format!("provider answered {status}")));
    }

    let bars = transform(symbol, de, range);
    if bars.is_empty() {
        warn!("[{symbol}] contained no rows within {} .. {}", range.start, range.end);
        return Err(Error::UnknownSymbol(symbol.to_string()));
    }
    Ok(bars)
}

/// Scale Yahoo's column-wise arrays into rows; rows with any missing price are dropped.
pub fn transform(symbol: &str, history: PriceHistory, range: DateRange) -> Vec<PriceBar> {
    let Some(base) = history.chart.result.and_then(|r| r.into_iter().next()) else {
        return vec![];
    };
    let Some(price) = base.indicators.quote.into_iter().next() else {
        return vec![];
    };
    let gmtoffset = base.meta.gmtoffset;

    let bars = price
        .open
        .iter()
        .zip(price.high.iter())
        .zip(price.low.iter())
        .zip(price.close.iter())
        .zip(price.volume.iter())
        .zip(base.timestamp.iter())
        .filter_map(|(((((open, high), low), close), volume), timestamp)| {
            let timestamp = convert_timestamp(*timestamp, gmtoffset)?;
            if !range.contains(timestamp) {
                return None;
            }
            Some(PriceBar {
                symbol: symbol.to_string(),
                timestamp,
                open: (*open)?,
                high: (*high)?,
                low: (*low)?,
                close: (*close)?,
                volume: volume.unwrap_or(0.0) as i64,
            })
        })
        .collect::<Vec<_>>();

    normalize(bars)
}

///////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Deserialization
//
///////////////////////////////////////////////////////////////////////////////////////////////////////

// Input: Yahoo Finance
#[derive(Deserialize, Debug)]
pub struct PriceHistory {
    pub chart: PriceResponse,
}

#[derive(Deserialize, Debug)]
pub struct PriceResponse {
    pub result: Option<Vec<PriceCategories>>,
    pub error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
pub struct ChartError {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Debug)]
pub struct PriceCategories {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Deserialize, Debug, Default)]
pub struct Meta {
    #[serde(default)]
    pub gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
pub struct Indicators {
    pub quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
pub struct Quote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-03-04 .. 2024-03-07 at 09:15 IST, with the 6th repeated and the 7th half-empty
    static CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "currency": "INR", "symbol": "TCS.NS", "gmtoffset": 19800 },
                "timestamp": [1709523900, 1709610300, 1709696700, 1709696760, 1709783100],
                "indicators": {
                    "quote": [{
                        "open":   [4000.0, 4050.0, 4100.0, 4110.0, null],
                        "high":   [4060.0, 4120.0, 4150.0, 4160.0, 4200.0],
                        "low":    [3990.0, 4040.0, 4080.0, 4090.0, null],
                        "close":  [4050.0, 4100.0, 4120.0, 4130.0, null],
                        "volume": [1000, 2000, 3000, 3500, null]
                    }],
                    "adjclose": [{ "adjclose": [4050.0, 4100.0, 4120.0, 4130.0, null] }]
                }
            }],
            "error": null
        }
    }"#;

    static NOT_FOUND: &str = r#"{
        "chart": {
            "result": null,
            "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
        }
    }"#;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn transforms_columns_into_unique_ordered_bars() {
        let history: PriceHistory = serde_json::from_str(CHART).unwrap();
        let bars = transform("TCS", history, DateRange::new(day(1), day(31)));

        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(dates, vec![day(4), day(5), day(6)]);
        assert_eq!(bars[2].close, 4130.0);
        assert_eq!(bars[2].volume, 3500);
        assert!(bars.iter().all(|b| b.symbol == "TCS"));
    }

    #[test]
    fn transform_respects_the_requested_range() {
        let history: PriceHistory = serde_json::from_str(CHART).unwrap();
        let bars = transform("TCS", history, DateRange::new(day(5), day(5)));
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, day(5));
    }

    #[test]
    fn classifies_provider_answers() {
        let range = DateRange::new(day(1), day(31));

        let bars = extract("TCS", StatusCode::OK, CHART.as_bytes(), range).unwrap();
        assert_eq!(bars.len(), 3);

        let err = extract("XYZ", StatusCode::NOT_FOUND, NOT_FOUND.as_bytes(), range).unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol(ref s) if s == "XYZ"));

        let err = extract("TCS", StatusCode::OK, CHART.as_bytes(), DateRange::new(day(20), day(25)))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol(_)));

        let err = extract("TCS", StatusCode::TOO_MANY_REQUESTS, b"Too Many Requests", range)
            .unwrap_err();
        assert!(matches!(err, Error::FetchTimeout { .. }));

        let err = extract("TCS", StatusCode::OK, b"<html>", range).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn appends_the_exchange_suffix_once() {
        let yf = YahooFinance::new(HttpClient::new()).with_suffix(".NS");
        assert_eq!(yf.ticker("tcs"), "TCS.NS");
        assert_eq!(yf.ticker("TCS.NS"), "TCS.NS");

        let yf = YahooFinance::new(HttpClient::new());
        assert_eq!(yf.ticker("aapl"), "AAPL");
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_fetch_timeout() {
        let yf = YahooFinance::build("chartview-test", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = yf
            .fetch("TCS", DateRange::new(day(1), day(31)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchTimeout { .. }));
    }
}
