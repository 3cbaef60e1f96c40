use chrono::{DateTime, NaiveDate};
use rusqlite::types::Value;

/// Quote a table name for interpolation into SQL, e.g.,
///             `WATCH LIST`        -> `"WATCH LIST"`
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Read a stored date cell; the data-load step may have written any of
///
/// ```text
/// "2024-01-19"
/// "2024-01-19 00:00:00"   (pandas `to_sql`)
/// 1705622400              (unix seconds)
/// 1705622400000           (unix milliseconds)
/// ```
pub fn date_from_sql(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Text(text) => {
            let day = text.trim().get(..10)?;
            NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
        }
        Value::Integer(ts) => convert_timestamp(*ts, 0),
        Value::Real(ts) => convert_timestamp(*ts as i64, 0),
        _ => None,
    }
}

/// Transform a `unix timestamp` (plus the exchange's UTC offset) -> `naive date`, e.g.,
///             `1705636500`, `19800`  -> `2024-01-19`
pub fn convert_timestamp(timestamp: i64, gmtoffset: i64) -> Option<NaiveDate> {
    // anything past the year 5138 in seconds is taken as milliseconds
    let seconds = if timestamp.unsigned_abs() >= 100_000_000_000 {
        timestamp / 1000
    } else {
        timestamp
    };
    DateTime::from_timestamp(seconds.checked_add(gmtoffset)?, 0).map(|dt| dt.date_naive())
}
