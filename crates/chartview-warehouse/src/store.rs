use crate::api::Store;
use crate::error::{Error, Result};
use crate::model::{normalize, Listing, PriceBar};
use crate::schema::common::{date_from_sql, quote_ident};
use rusqlite::{types::Value, Connection, ErrorCode, OpenFlags};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace, warn};

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Local SQLite file; one table per symbol grouping (index, watchlist, ...)
//
////////////////////////////////////////////////////////////////////////////////////////////////////

pub static TABLES_QUERY: &str = "
    SELECT name FROM sqlite_master
    WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
    ORDER BY name
";

const PRICE_COLUMNS: [&str; 5] = ["date", "open", "high", "low", "close"];

/// Read-only accessor of the database file.
///
/// Every call opens its own connection, so nothing is held (or locked) between
/// interactions.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(250),
        }
    }

    /// How long a call waits on a writer's lock before reporting the store as unavailable.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if !self.path.is_file() {
            return Err(Error::unavailable(&self.path, "database file not found"));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| self.classify(e))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| self.classify(e))?;
        trace!("opened {}", self.path.display());
        Ok(conn)
    }

    /// Lock and open failures make the store unavailable; anything else is a query error.
    fn classify(&self, e: rusqlite::Error) -> Error {
        match e.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::DatabaseCorrupt,
            ) => Error::unavailable(&self.path, e),
            _ => Error::Query(e),
        }
    }

    fn tables(&self, conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(TABLES_QUERY).map_err(|e| self.classify(e))?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| self.classify(e))?;
        Ok(tables)
    }

    /// Table names cannot be bound as parameters, so only names the database itself
    /// reports are ever interpolated.
    fn resolve(&self, conn: &Connection, table: &str) -> Result<String> {
        if self.tables(conn)?.iter().any(|t| t == table) {
            Ok(quote_ident(table))
        } else {
            Err(Error::UnknownTable(table.to_string()))
        }
    }

    fn columns(&self, conn: &Connection, ident: &str) -> Result<HashSet<String>> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({ident})"))
            .map_err(|e| self.classify(e))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .and_then(|rows| rows.collect::<rusqlite::Result<HashSet<_>>>())
            .map_err(|e| self.classify(e))?;
        Ok(columns.into_iter().map(|c| c.to_lowercase()).collect())
    }
}

impl Store for SqliteStore {
    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let tables = self.tables(&conn)?;
        debug!("{} tables listed from {}", tables.len(), self.path.display());
        Ok(tables)
    }

    fn read_symbols(&self, table: &str) -> Result<Vec<Listing>> {
        let conn = self.connect()?;
        let ident = self.resolve(&conn, table)?;
        let columns = self.columns(&conn, &ident)?;
        if !columns.contains("symbol") {
            warn!("table {table} has no `symbol` column; listing nothing");
            return Ok(vec![]);
        }

        let name = if columns.contains("stock_name") {
            "MAX(stock_name)"
        } else {
            "NULL"
        };
        let query = format!(
            "SELECT CAST(symbol AS TEXT), {name} FROM {ident}
            WHERE symbol IS NOT NULL
            GROUP BY symbol
            ORDER BY symbol"
        );

        let mut stmt = conn.prepare(&query).map_err(|e| self.classify(e))?;
        let listings = stmt
            .query_map([], |row| {
                let symbol: String = row.get(0)?;
                let name: Option<String> = row.get(1)?;
                Ok(Listing::new(symbol, name))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| self.classify(e))?;

        debug!("{} symbols read from {table}", listings.len());
        Ok(listings)
    }

    fn read_series(&self, table: &str, symbol: &str) -> Result<Vec<PriceBar>> {
        let conn = self.connect()?;
        let ident = self.resolve(&conn, table)?;
        let columns = self.columns(&conn, &ident)?;
        if !PRICE_COLUMNS.iter().all(|c| columns.contains(*c)) || !columns.contains("symbol") {
            debug!("table {table} carries no price columns; [{symbol}] has no persisted series");
            return Ok(vec![]);
        }

        let volume = if columns.contains("volume") { "volume" } else { "0" };
        let query = format!(
            "SELECT date, open, high, low, close, {volume} FROM {ident}
            WHERE CAST(symbol AS TEXT) = ?1
                AND date IS NOT NULL
                AND open IS NOT NULL
                AND high IS NOT NULL
                AND low IS NOT NULL
                AND close IS NOT NULL
            ORDER BY date ASC"
        );

        let mut stmt = conn.prepare(&query).map_err(|e| self.classify(e))?;
        let rows = stmt
            .query_map([symbol], |row| {
                Ok((
                    row.get::<_, Value>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                ))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| self.classify(e))?;

        let mut bars = Vec::with_capacity(rows.len());
        for (date, open, high, low, close, volume) in rows {
            match date_from_sql(&date) {
                Some(timestamp) => bars.push(PriceBar {
                    symbol: symbol.to_string(),
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: volume.unwrap_or(0.0) as i64,
                }),
                None => warn!("[{symbol}] skipping row of {table} with unreadable date {date:?}"),
            }
        }

        let bars = normalize(bars);
        trace!("[{symbol}] {} bars read from {table}", bars.len());
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_db_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("chartview_store_{tag}_{nanos}.db"))
    }

    fn init_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE NIFTY50 (
                symbol TEXT NOT NULL,
                stock_name TEXT,
                date TEXT,
                open REAL,
                high REAL,
                low REAL,
                close REAL,
                volume INTEGER
            );
            INSERT INTO NIFTY50 VALUES
                ('TCS', 'Tata Consultancy Services', '2024-03-05', 10.0, 12.0, 9.0, 11.0, 500),
                ('TCS', 'Tata Consultancy Services', '2024-03-04 00:00:00', 9.0, 10.5, 8.5, 10.0, 400),
                ('TCS', 'Tata Consultancy Services', '2024-03-06', NULL, NULL, NULL, NULL, NULL),
                ('INFY', NULL, '2024-03-04', 20.0, 21.0, 19.0, 20.5, 900);

            CREATE TABLE "WATCH LIST" (symbol TEXT, stock_name TEXT);
            INSERT INTO "WATCH LIST" VALUES ('ZOMATO', 'Zomato Ltd'), ('ZOMATO', 'Zomato Ltd');

            CREATE TABLE counters (id INTEGER PRIMARY KEY AUTOINCREMENT, n INTEGER);
            INSERT INTO counters (n) VALUES (1);
            "#,
        )
        .unwrap();
    }

    #[test]
    fn lists_user_tables_only() {
        let path = tmp_db_path("tables");
        init_db(&path);

        let tables = SqliteStore::new(&path).list_tables().unwrap();
        assert_eq!(tables, vec!["NIFTY50", "WATCH LIST", "counters"]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reads_distinct_symbols_with_names() {
        let path = tmp_db_path("symbols");
        init_db(&path);
        let store = SqliteStore::new(&path);

        let listings = store.read_symbols("NIFTY50").unwrap();
        assert_eq!(
            listings,
            vec![
                Listing::new("INFY", None),
                Listing::new("TCS", Some("Tata Consultancy Services".to_string())),
            ]
        );

        let watch = store.read_symbols("WATCH LIST").unwrap();
        assert_eq!(watch.len(), 1);
        assert_eq!(watch[0].name, "Zomato Ltd");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reads_series_in_date_order_skipping_null_rows() {
        let path = tmp_db_path("series");
        init_db(&path);
        let store = SqliteStore::new(&path);

        let bars = store.read_series("NIFTY50", "TCS").unwrap();
        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            ]
        );
        assert_eq!(bars[1].close, 11.0);
        assert_eq!(bars[1].volume, 500);

        // listing-only tables have no persisted series
        assert!(store.read_series("WATCH LIST", "ZOMATO").unwrap().is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_tables_the_database_does_not_report() {
        let path = tmp_db_path("unknown");
        init_db(&path);
        let store = SqliteStore::new(&path);

        let err = store
            .read_symbols("NIFTY50; DROP TABLE NIFTY50")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
        assert_eq!(store.read_symbols("NIFTY50").unwrap().len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_or_foreign_file_is_unavailable() {
        let path = tmp_db_path("missing");
        let err = SqliteStore::new(&path).list_tables().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));

        std::fs::write(&path, b"definitely not a sqlite database, just some bytes").unwrap();
        let err = SqliteStore::new(&path).list_tables().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn locked_file_is_unavailable() {
        let path = tmp_db_path("locked");
        init_db(&path);

        let writer = Connection::open(&path).unwrap();
        writer.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let store = SqliteStore::new(&path).with_busy_timeout(Duration::from_millis(20));
        let err = store.list_tables().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }), "{err:?}");
        let err = store.read_series("NIFTY50", "TCS").unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }), "{err:?}");

        writer.execute_batch("ROLLBACK;").unwrap();
        assert_eq!(store.list_tables().unwrap().len(), 3);

        drop(writer);
        let _ = std::fs::remove_file(&path);
    }
}
