use crate::config::ChartDashboard;
use actix_web::{get, http::StatusCode, web, HttpResponse, Responder, ResponseError};
use chartview_warehouse::{Error, Listing, PriceBar, Store};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, error};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(tables, symbols, prices),
    components(schemas(Listing, PriceBar)),
    info(title = "chartview", description = "Read-only access to the price database")
)]
pub struct ApiDoc;

#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Store failures as HTTP statuses.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            Error::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::UnknownTable(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("api request failed: {}", self.0);
        }
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.0.to_string() }))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Tables of the database
///
/// ```json
/// ["NASDAQ100", "NIFTY50"]
/// ```
#[utoipa::path(
    get,
    path = "/api/tables",
    responses(
        (
            status = 200, description = "User tables of the database, in name order",
            body = [String], content_type = "application/json",
            example = json!(["NASDAQ100", "NIFTY50"])
        ),
        (status = 503, description = "The database file is missing, unreadable or locked")
    )
)]
#[get("/api/tables")]
pub async fn tables(app: web::Data<ChartDashboard>) -> Result<HttpResponse, ApiError> {
    let names = app.store().list_tables()?;
    Ok(HttpResponse::Ok().json(names))
}

#[derive(Debug, Default, Deserialize)]
pub struct SymbolQuery {
    search: Option<String>,
}

/// Distinct symbols of a table
///
/// ```json
/// [
///     {
///         "symbol": "TCS",
///         "name": "Tata Consultancy Services"
///     },
///     // ...
/// ]
/// ```
#[utoipa::path(
    get,
    path = "/api/tables/{table}/symbols",
    responses(
        (
            status = 200, description = "Distinct symbols and their display names, in symbol order",
            body = [Listing], content_type = "application/json",
            example = json!([{ "symbol": "TCS", "name": "Tata Consultancy Services" }])
        ),
        (status = 404, description = "The database has no such table"),
        (status = 503, description = "The database file is missing, unreadable or locked")
    ),
    params(
        ("table", description = "Table name, as listed by /api/tables"),
        ("search" = Option<String>, Query, description = "Case-insensitive filter over symbol and name")
    )
)]
#[get("/api/tables/{table}/symbols")]
pub async fn symbols(
    path: web::Path<String>,
    query: web::Query<SymbolQuery>,
    app: web::Data<ChartDashboard>,
) -> Result<HttpResponse, ApiError> {
    let table = path.into_inner();
    let search = query.into_inner().search.unwrap_or_default();
    let listings: Vec<Listing> = app
        .store()
        .read_symbols(&table)?
        .into_iter()
        .filter(|l| l.matches(search.trim()))
        .collect();
    debug!("{} symbols of {table} served", listings.len());
    Ok(HttpResponse::Ok().json(listings))
}

/// Persisted daily prices of one symbol
///
/// ```json
/// [
///     {
///         "symbol": "TCS",
///         "timestamp": "2024-03-04",
///         "open": 3800.0,
///         "high": 3850.5,
///         "low": 3790.0,
///         "close": 3838.0,
///         "volume": 1234567
///     },
///     // ...
/// ]
/// ```
#[utoipa::path(
    get,
    path = "/api/tables/{table}/prices/{symbol}",
    responses(
        (
            status = 200, description = "Daily bars in date order; empty when nothing is stored",
            body = [PriceBar], content_type = "application/json"
        ),
        (status = 404, description = "The database has no such table"),
        (status = 503, description = "The database file is missing, unreadable or locked")
    ),
    params(
        ("table", description = "Table name, as listed by /api/tables"),
        ("symbol", description = "Symbol, as listed by /api/tables/{table}/symbols")
    )
)]
#[get("/api/tables/{table}/prices/{symbol}")]
pub async fn prices(
    path: web::Path<(String, String)>,
    app: web::Data<ChartDashboard>,
) -> Result<HttpResponse, ApiError> {
    let (table, symbol) = path.into_inner();
    let bars = app.store().read_series(&table, &symbol)?;
    Ok(HttpResponse::Ok().json(bars))
}
