use crate::config::ChartDashboard;
use crate::view;
use actix_web::{get, http::StatusCode, middleware::Logger, web, App, HttpResponse, HttpServer};
use chartview_dash::{Interaction, PageState, Selection, Session};
use serde::Deserialize;
use tracing::{error, info};

pub mod api;

/// Query string of `GET /`; the page is rebuilt from it on every request.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    table: Option<String>,
    /// 1-based
    page: Option<usize>,
    symbol: Option<String>,
    search: Option<String>,
    nav: Option<Nav>,
    /// Table shown by the response this request came from.
    prev_table: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nav {
    Next,
    Prev,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl DashboardQuery {
    pub fn into_session(self) -> (Session, Interaction) {
        let selection = Selection {
            table: non_empty(self.table),
            page: self.page.unwrap_or(1).saturating_sub(1),
            symbol: non_empty(self.symbol),
            search: self.search.unwrap_or_default().trim().to_string(),
        };
        let interaction = match self.nav {
            Some(Nav::Next) => Interaction::NextPage,
            Some(Nav::Prev) => Interaction::PreviousPage,
            None => Interaction::Load,
        };
        (Session::resume(selection, non_empty(self.prev_table)), interaction)
    }
}

#[get("/")]
async fn dashboard(app: web::Data<ChartDashboard>, query: web::Query<DashboardQuery>) -> HttpResponse {
    let (mut session, interaction) = query.into_inner().into_session();
    let html = match view::render_html(app.get_ref(), &mut session, interaction).await {
        Ok(html) => html,
        Err(e) => {
            error!("template failed to render: {e}");
            return HttpResponse::InternalServerError().body("template failed to render");
        }
    };

    let status = match session.state() {
        PageState::Error(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(html)
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard)
        .service(health)
        .service(api::tables)
        .service(api::symbols)
        .service(api::prices)
        .service(api::openapi_json);
}

pub async fn serve(board: ChartDashboard, bind: &str, port: u16) -> std::io::Result<()> {
    let board = web::Data::new(board);
    info!("serving the dashboard on http://{bind}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(board.clone())
            .configure(routes)
    })
    .bind((bind, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use actix_web::test as atest;
    use rusqlite::Connection;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_db_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("chartview_web_{tag}_{nanos}.db"))
    }

    fn init_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE NIFTY50 (
                symbol TEXT, stock_name TEXT, date TEXT,
                open REAL, high REAL, low REAL, close REAL, volume INTEGER
            );
            INSERT INTO NIFTY50 VALUES
                ('TCS', 'Tata Consultancy Services', '2024-03-04', 3800.0, 3850.5, 3790.0, 3800.0, 1000),
                ('TCS', 'Tata Consultancy Services', '2024-03-05', 3800.0, 3850.5, 3790.0, 3838.0, 1200),
                ('INFY', 'Infosys', '2024-03-05', 1600.0, 1610.0, 1590.0, 1605.0, 900);
            "#,
        )
        .unwrap();
    }

    /// Offline dashboard over `path`; nothing leaves the machine.
    fn offline_dashboard(path: &Path) -> web::Data<ChartDashboard> {
        let db = path.display().to_string();
        let settings = Settings::from_lookup(|key| match key {
            "CHARTVIEW_DB" => Some(db.clone()),
            "CHARTVIEW_REFRESH" => Some("false".to_string()),
            _ => None,
        })
        .unwrap();
        web::Data::new(settings.dashboard().unwrap())
    }

    #[actix_web::test]
    async fn serves_the_json_api() {
        let path = tmp_db_path("api");
        init_db(&path);
        let app = atest::init_service(App::new().app_data(offline_dashboard(&path)).configure(routes)).await;

        let req = atest::TestRequest::get().uri("/api/tables").to_request();
        let tables: Vec<String> = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(tables, vec!["NIFTY50"]);

        let req = atest::TestRequest::get()
            .uri("/api/tables/NIFTY50/symbols?search=tata")
            .to_request();
        let listings: serde_json::Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(listings[0]["symbol"], "TCS");
        assert_eq!(listings.as_array().unwrap().len(), 1);

        let req = atest::TestRequest::get()
            .uri("/api/tables/NIFTY50/prices/TCS")
            .to_request();
        let bars: serde_json::Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(bars.as_array().unwrap().len(), 2);
        assert_eq!(bars[1]["timestamp"], "2024-03-05");

        let req = atest::TestRequest::get()
            .uri("/api/tables/FTSE100/symbols")
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = atest::TestRequest::get().uri("/openapi.json").to_request();
        let doc: serde_json::Value = atest::call_and_read_body_json(&app, req).await;
        assert!(doc["paths"]["/api/tables"].is_object());

        let req = atest::TestRequest::get().uri("/health").to_request();
        let resp = atest::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let _ = std::fs::remove_file(&path);
    }

    #[actix_web::test]
    async fn renders_the_dashboard_page() {
        let path = tmp_db_path("page");
        init_db(&path);
        let app = atest::init_service(App::new().app_data(offline_dashboard(&path)).configure(routes)).await;

        let req = atest::TestRequest::get().uri("/?page=1&nav=next").to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = atest::read_body(resp).await;
        let html = std::str::from_utf8(&body).unwrap();
        assert!(html.contains("Page 1 of 1"));
        assert!(html.contains("Tata Consultancy Services"));
        assert!(html.contains("₹3,838.00"));
        assert!(html.contains("stored"));

        let req = atest::TestRequest::get()
            .uri("/?table=NIFTY50&symbol=INFY&prev_table=NIFTY50")
            .to_request();
        let body = atest::call_and_read_body(&app, req).await;
        let html = std::str::from_utf8(&body).unwrap();
        assert!(html.contains("Infosys (INFY)"));
        assert!(!html.contains("Tata Consultancy Services (TCS)"));

        let _ = std::fs::remove_file(&path);
    }

    #[actix_web::test]
    async fn missing_database_is_unavailable() {
        let path = tmp_db_path("missing");
        let app = atest::init_service(App::new().app_data(offline_dashboard(&path)).configure(routes)).await;

        let req = atest::TestRequest::get().uri("/api/tables").to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = atest::TestRequest::get().uri("/").to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = atest::read_body(resp).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("store unavailable"));
    }

    #[test]
    fn query_maps_to_a_session() {
        let query = DashboardQuery {
            table: Some("NIFTY50".to_string()),
            page: Some(3),
            symbol: Some("  ".to_string()),
            search: Some(" tata ".to_string()),
            nav: Some(Nav::Prev),
            prev_table: Some("NASDAQ100".to_string()),
        };
        let (session, interaction) = query.into_session();
        assert_eq!(interaction, Interaction::PreviousPage);
        assert_eq!(session.selection.page, 2);
        assert_eq!(session.selection.symbol, None);
        assert_eq!(session.selection.search, "tata");

        let (session, interaction) = DashboardQuery::default().into_session();
        assert_eq!(interaction, Interaction::Load);
        assert_eq!(session.selection, Selection::default());
    }
}
