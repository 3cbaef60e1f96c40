use askama::Template;
use chartview_dash::chart::{format_price, group_thousands};
use chartview_dash::{
    Chart, ChartStyle, Dashboard, Interaction, NoticeLevel, Page, PageState, SeriesSource, Session,
};
use chartview_warehouse::{Http, Store};

/// Run one interaction and render the resulting page (or its failure) as HTML.
pub async fn render_html<S: Store, F: Http>(
    dashboard: &Dashboard<S, F>,
    session: &mut Session,
    interaction: Interaction,
) -> askama::Result<String> {
    let style = &dashboard.settings().style;
    let view = match dashboard.interact(session, interaction).await {
        PageState::Rendered(page) => DashboardView::rendered(page, style),
        PageState::Error(message) => DashboardView::failed(message, style),
        PageState::Idle | PageState::Loading => DashboardView::blank(style),
    };
    view.render()
}

pub struct TableOption {
    pub name: String,
    pub selected: bool,
}

pub struct SymbolLink {
    pub symbol: String,
    pub name: String,
    pub focused: bool,
}

pub struct NoticeView {
    pub level: &'static str,
    pub message: String,
}

pub struct PanelView {
    pub symbol: String,
    pub name: String,
    pub price: Option<String>,
    pub change: Option<String>,
    pub up: bool,
    pub volume: Option<String>,
    pub source: &'static str,
    pub svg: String,
}

/// The whole dashboard page; `error` replaces the charts when the last run failed.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardView {
    pub tables: Vec<TableOption>,
    pub table: String,
    pub search: String,
    pub focus: Option<String>,
    pub page_label: String,
    /// 1-based, as shown in links
    pub page_number: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub symbols: Vec<SymbolLink>,
    pub panels: Vec<PanelView>,
    pub notices: Vec<NoticeView>,
    pub error: Option<String>,
    pub background: String,
    pub text: String,
    pub font_family: String,
}

impl DashboardView {
    pub fn rendered(page: &Page, style: &ChartStyle) -> Self {
        let table = page.table.clone().unwrap_or_default();
        Self {
            tables: page
                .tables
                .iter()
                .map(|name| TableOption {
                    name: name.clone(),
                    selected: *name == table,
                })
                .collect(),
            search: page.search.clone(),
            focus: page.focus.clone(),
            page_label: page.window.label(),
            page_number: page.window.page_index() + 1,
            has_previous: !page.window.is_first(),
            has_next: !page.window.is_last(),
            symbols: page
                .listings
                .iter()
                .map(|l| SymbolLink {
                    symbol: l.symbol.clone(),
                    name: l.name.clone(),
                    focused: page.focus.as_deref() == Some(l.symbol.as_str()),
                })
                .collect(),
            panels: page
                .panels
                .iter()
                .map(|p| panel(&p.chart, p.source, style))
                .collect(),
            notices: page
                .notices
                .iter()
                .map(|n| NoticeView {
                    level: match n.level {
                        NoticeLevel::Info => "info",
                        NoticeLevel::Warning => "warning",
                        NoticeLevel::Error => "error",
                    },
                    message: n.message.clone(),
                })
                .collect(),
            error: None,
            table,
            ..Self::blank(style)
        }
    }

    pub fn failed(message: &str, style: &ChartStyle) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::blank(style)
        }
    }

    fn blank(style: &ChartStyle) -> Self {
        Self {
            tables: vec![],
            table: String::new(),
            search: String::new(),
            focus: None,
            page_label: String::new(),
            page_number: 1,
            has_previous: false,
            has_next: false,
            symbols: vec![],
            panels: vec![],
            notices: vec![],
            error: None,
            background: style.background.clone(),
            text: style.text.clone(),
            font_family: style.font_family.clone(),
        }
    }
}

fn panel(chart: &Chart, source: SeriesSource, style: &ChartStyle) -> PanelView {
    let source = match source {
        SeriesSource::Provider => "live",
        SeriesSource::Store => "stored",
        SeriesSource::Fallback => "stored (refresh failed)",
    };

    match chart {
        Chart::Candles(candles) => {
            let header = &candles.header;
            let change = header.change.as_ref();
            PanelView {
                symbol: header.symbol.clone(),
                name: header.name.clone(),
                price: Some(format_price(header.last_close, &style.currency)),
                change: change.map(|c| format!("{} {:.2}%", c.arrow(), c.percent.abs())),
                up: change.map(|c| c.is_up()).unwrap_or(true),
                volume: Some(group_thousands(header.volume)),
                source,
                svg: chart.to_svg(),
            }
        }
        Chart::Empty(empty) => PanelView {
            symbol: empty.symbol.clone(),
            name: empty.name.clone(),
            price: None,
            change: None,
            up: true,
            volume: None,
            source,
            svg: chart.to_svg(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartview_dash::pagination::PageWindow;
    use chartview_dash::{chart, Panel};
    use chartview_warehouse::{Listing, PriceBar};
    use chrono::NaiveDate;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            symbol: "TCS".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            open: close,
            high: close + 5.0,
            low: close - 5.0,
            close,
            volume: 1_234_567,
        }
    }

    fn page() -> Page {
        let style = ChartStyle::default();
        let tcs = Listing::new("TCS", Some("Tata Consultancy <Services>".to_string()));
        let newco = Listing::new("NEWCO", None);
        Page {
            tables: vec!["NASDAQ100".to_string(), "NIFTY50".to_string()],
            table: Some("NIFTY50".to_string()),
            search: String::new(),
            window: PageWindow::new(30, 12, 1),
            listings: vec![newco.clone(), tcs.clone()],
            focus: None,
            panels: vec![
                Panel {
                    chart: chart::render(&newco, &[], &style),
                    listing: newco,
                    source: SeriesSource::Store,
                },
                Panel {
                    chart: chart::render(&tcs, &[bar(4, 3800.0), bar(5, 3838.0)], &style),
                    listing: tcs,
                    source: SeriesSource::Fallback,
                },
            ],
            notices: vec![],
        }
    }

    #[test]
    fn renders_headers_and_navigation() {
        let html = DashboardView::rendered(&page(), &ChartStyle::default())
            .render()
            .unwrap();

        assert!(html.contains("Page 2 of 3"));
        assert!(html.contains("₹3,838.00"));
        assert!(html.contains("▲ 1.00%"));
        assert!(html.contains("1,234,567"));
        assert!(html.contains("Tata Consultancy &lt;Services&gt;"));
        assert!(html.contains("No price data available"));
        assert!(html.contains("nav=next"));
        assert!(html.contains("nav=prev"));
        assert!(html.contains(r#"<option value="NIFTY50" selected>"#));
        assert!(html.contains("Data provided by Yahoo Finance"));
    }

    #[test]
    fn falling_close_shows_a_down_arrow_and_unsigned_percent() {
        let style = ChartStyle::default();
        let tcs = Listing::new("TCS", Some("Tata Consultancy Services".to_string()));
        let mut page = page();
        page.panels = vec![Panel {
            chart: chart::render(&tcs, &[bar(4, 100.0), bar(5, 90.0)], &style),
            listing: tcs,
            source: SeriesSource::Store,
        }];

        let html = DashboardView::rendered(&page, &style).render().unwrap();
        assert!(html.contains("▼ 10.00%"));
        assert!(!html.contains("-10.00%"));
    }

    #[test]
    fn error_view_shows_the_message_only() {
        let html = DashboardView::failed("store unavailable at stocks1.db: locked", &ChartStyle::default())
            .render()
            .unwrap();
        assert!(html.contains("store unavailable at stocks1.db: locked"));
        assert!(!html.contains("nav=next"));
    }
}
