use anyhow::{Context, Result};
use chartview_dash::{ChartStyle, Dashboard, DashboardSettings, DEFAULT_PAGE_SIZE};
use chartview_warehouse::{schema::stock::prices::YAHOO_BASE_URL, SqliteStore, YahooFinance};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub type ChartDashboard = Dashboard<SqliteStore, YahooFinance>;

/// Runtime settings, read from the environment (and `.env`); CLI flags override them.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub page_size: usize,
    pub ticker_suffix: String,
    pub lookback_days: u32,
    pub refresh: bool,
    pub fetch_timeout: Duration,
    pub currency: String,
    pub yahoo_base_url: String,
    pub user_agent: String,
    pub bind: String,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Settings {
            db_path: PathBuf::from(text("CHARTVIEW_DB", "stocks1.db")),
            page_size: parse(&lookup, "CHARTVIEW_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            ticker_suffix: text("CHARTVIEW_TICKER_SUFFIX", ".NS"),
            lookback_days: parse(&lookup, "CHARTVIEW_LOOKBACK_DAYS", 365)?,
            refresh: parse(&lookup, "CHARTVIEW_REFRESH", true)?,
            fetch_timeout: Duration::from_secs(parse(&lookup, "CHARTVIEW_FETCH_TIMEOUT_SECS", 10)?),
            currency: text("CHARTVIEW_CURRENCY", "₹"),
            yahoo_base_url: text("YAHOO_BASE_URL", YAHOO_BASE_URL),
            user_agent: text("USER_AGENT", concat!("chartview/", env!("CARGO_PKG_VERSION"))),
            bind: text("CHARTVIEW_BIND", "127.0.0.1"),
            port: parse(&lookup, "CHARTVIEW_PORT", 8080)?,
        })
    }

    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(&self.db_path)
    }

    pub fn fetcher(&self) -> Result<YahooFinance> {
        let fetcher = YahooFinance::build(&self.user_agent, self.fetch_timeout)
            .context("failed to build the market data client")?
            .with_base_url(&self.yahoo_base_url)
            .with_suffix(&self.ticker_suffix);
        Ok(fetcher)
    }

    pub fn dashboard_settings(&self) -> DashboardSettings {
        DashboardSettings {
            page_size: self.page_size,
            refresh: self.refresh,
            lookback_days: self.lookback_days,
            as_of: None,
            style: ChartStyle {
                currency: self.currency.clone(),
                ..ChartStyle::default()
            },
        }
    }

    pub fn dashboard(&self) -> Result<ChartDashboard> {
        Ok(Dashboard::new(self.store(), self.fetcher()?, self.dashboard_settings()))
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {value:?}")),
        _ => Ok(default),
    }
}
