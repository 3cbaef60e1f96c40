use crate::chart::{self, Chart, ChartStyle};
use crate::pagination::{self, PageWindow, DEFAULT_PAGE_SIZE};
use chartview_warehouse::{DateRange, Error, Http, Listing, PriceBar, Store};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Page orchestration: every interaction re-runs the whole flow, top to bottom
//
//     Idle -> Loading -> Rendered
//             Loading -> Error -> Idle
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// What the user currently has selected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Selection {
    pub table: Option<String>,
    /// 0-based; clamped into range on every run.
    pub page: usize,
    pub symbol: Option<String>,
    pub search: String,
}

/// One user action on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Re-run with the selection as it stands (first visit, browser refresh).
    Load,
    SelectTable(String),
    SelectPage(usize),
    NextPage,
    PreviousPage,
    SelectSymbol(String),
    ClearSymbol,
    Search(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PageState {
    #[default]
    Idle,
    Loading,
    Rendered(Page),
    /// User-visible message of the failure that ended the last run.
    Error(String),
}

impl PageState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Rendered(_) => "rendered",
            Self::Error(_) => "error",
        }
    }

    pub fn can_transition_to(&self, next: &PageState) -> bool {
        use PageState::*;
        matches!(
            (self, next),
            (Idle, Loading) | (Rendered(_), Loading) | (Loading, Rendered(_)) | (Loading, Error(_)) | (Error(_), Idle)
        )
    }
}

/// Interaction context carried from one run to the next; the only state that crosses
/// interactions besides the database file.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub selection: Selection,
    rendered_table: Option<String>,
    state: PageState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from a stateless request; `rendered_table` is the table shown by
    /// the previous response, so that switching tables resets the page.
    pub fn resume(selection: Selection, rendered_table: Option<String>) -> Self {
        Self {
            selection,
            rendered_table,
            state: PageState::Idle,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn page(&self) -> Option<&Page> {
        match &self.state {
            PageState::Rendered(page) => Some(page),
            _ => None,
        }
    }

    fn transition(&mut self, next: PageState) {
        if !self.state.can_transition_to(&next) {
            warn!("unexpected page transition {} -> {}", self.state.name(), next.name());
        }
        trace!("page {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn apply(&mut self, interaction: Interaction) {
        let selection = &mut self.selection;
        match interaction {
            Interaction::Load => {}
            Interaction::SelectTable(table) => {
                if selection.table.as_deref() != Some(table.as_str()) {
                    selection.page = 0;
                    selection.symbol = None;
                }
                selection.table = Some(table);
            }
            Interaction::SelectPage(page) => selection.page = page,
            Interaction::NextPage => selection.page = selection.page.saturating_add(1),
            Interaction::PreviousPage => selection.page = selection.page.saturating_sub(1),
            Interaction::SelectSymbol(symbol) => selection.symbol = Some(symbol),
            Interaction::ClearSymbol => selection.symbol = None,
            Interaction::Search(term) => selection.search = term.trim().to_string(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Where a panel's series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    /// Fresh rows from the market data provider.
    Provider,
    /// Persisted rows; refresh is switched off.
    Store,
    /// Persisted rows, after the provider failed.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub listing: Listing,
    pub source: SeriesSource,
    pub chart: Chart,
}

/// Everything needed to draw the page for one interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub tables: Vec<String>,
    pub table: Option<String>,
    pub search: String,
    pub window: PageWindow,
    /// Symbols visible on the current page.
    pub listings: Vec<Listing>,
    pub focus: Option<String>,
    pub panels: Vec<Panel>,
    pub notices: Vec<Notice>,
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub page_size: usize,
    /// Fetch each charted symbol from the provider before falling back to the store.
    pub refresh: bool,
    pub lookback_days: u32,
    /// Pin "today" for the fetch range; the wall clock is used otherwise.
    pub as_of: Option<NaiveDate>,
    pub style: ChartStyle,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            refresh: true,
            lookback_days: 365,
            as_of: None,
            style: ChartStyle::default(),
        }
    }
}

/// Wires a [`Store`] and an [`Http`] market data fetcher into pages.
pub struct Dashboard<S, F> {
    store: S,
    fetcher: F,
    settings: DashboardSettings,
}

impl<S: Store, F: Http> Dashboard<S, F> {
    pub fn new(store: S, fetcher: F, settings: DashboardSettings) -> Self {
        Self { store, fetcher, settings }
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply `interaction` to `session` and re-run the whole page flow.
    pub async fn interact<'s>(
        &self,
        session: &'s mut Session,
        interaction: Interaction,
    ) -> &'s PageState {
        if matches!(session.state, PageState::Error(_)) {
            session.transition(PageState::Idle);
        }

        debug!("interaction {interaction:?}");
        session.apply(interaction);
        session.transition(PageState::Loading);

        let time = std::time::Instant::now();
        let rendered_table = session.rendered_table.clone();
        match self.build(&mut session.selection, rendered_table.as_deref()).await {
            Ok(page) => {
                info!(
                    "rendered {} ({}) with {} charts in {} ms",
                    page.table.as_deref().unwrap_or("<no table>"),
                    page.window.label(),
                    page.panels.len(),
                    time.elapsed().as_millis()
                );
                session.rendered_table = page.table.clone();
                session.transition(PageState::Rendered(page));
            }
            Err(e) => {
                error!("page failed: {e}");
                session.transition(PageState::Error(e.to_string()));
            }
        }
        &session.state
    }

    async fn build(&self, selection: &mut Selection, rendered_table: Option<&str>) -> Result<Page, Error> {
        let mut notices = Vec::new();

        // 1. resolve the table
        let tables = self.store.list_tables()?;
        let table = match selection.table.as_deref() {
            Some(t) if tables.iter().any(|x| x == t) => Some(t.to_string()),
            Some(t) => {
                let fallback = tables.first().cloned();
                if let Some(first) = &fallback {
                    notices.push(Notice::warning(format!("Table {t} not found; showing {first}")));
                }
                fallback
            }
            None => tables.first().cloned(),
        };
        if rendered_table.is_some() && table.as_deref() != rendered_table {
            selection.page = 0;
            selection.symbol = None;
        }
        selection.table = table.clone();

        let Some(table) = table else {
            notices.push(Notice::info("The database contains no tables"));
            return Ok(Page {
                tables,
                table: None,
                search: selection.search.clone(),
                window: PageWindow::new(0, self.settings.page_size, 0),
                listings: vec![],
                focus: None,
                panels: vec![],
                notices,
            });
        };

        // 2. list & filter the symbols
        let listings: Vec<Listing> = self
            .store
            .read_symbols(&table)?
            .into_iter()
            .filter(|listing| listing.matches(&selection.search))
            .collect();
        if listings.is_empty() && !selection.search.is_empty() {
            notices.push(Notice::info(format!("No symbols match \"{}\"", selection.search)));
        }

        // 3. paginate
        let (window, visible) = pagination::window(&listings, self.settings.page_size, selection.page);
        selection.page = window.page_index();

        let focus = match selection.symbol.as_deref() {
            Some(symbol) => match listings.iter().find(|l| l.symbol == symbol) {
                Some(listing) => Some(listing.clone()),
                None => {
                    notices.push(Notice::warning(format!("{symbol} is not listed in {table}")));
                    selection.symbol = None;
                    None
                }
            },
            None => None,
        };

        // 4. load & render every charted symbol, one after another
        let targets: Vec<Listing> = match &focus {
            Some(listing) => vec![listing.clone()],
            None => visible.to_vec(),
        };
        let range = DateRange::lookback(self.today(), self.settings.lookback_days);
        let mut panels = Vec::with_capacity(targets.len());
        for listing in targets {
            let (series, source) = self.series(&table, &listing, range, &mut notices).await?;
            let chart = chart::render(&listing, &series, &self.settings.style);
            panels.push(Panel { listing, source, chart });
        }

        Ok(Page {
            tables,
            table: Some(table),
            search: selection.search.clone(),
            window,
            listings: visible.to_vec(),
            focus: focus.map(|l| l.symbol),
            panels,
            notices,
        })
    }

    /// Provider first (when refreshing), persisted rows otherwise or when the provider
    /// times out or does not know the symbol.
    async fn series(
        &self,
        table: &str,
        listing: &Listing,
        range: DateRange,
        notices: &mut Vec<Notice>,
    ) -> Result<(Vec<PriceBar>, SeriesSource), Error> {
        let symbol = &listing.symbol;
        let mut source = SeriesSource::Store;

        if self.settings.refresh {
            match self.fetcher.fetch(symbol, range).await {
                Ok(bars) => return Ok((bars, SeriesSource::Provider)),
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    warn!("[{symbol}] refresh failed, falling back to stored rows: {e}");
                    notices.push(Notice::warning(format!("{symbol}: {e}; showing stored data")));
                    source = SeriesSource::Fallback;
                }
            }
        }

        match self.store.read_series(table, symbol) {
            Ok(bars) => Ok((bars, source)),
            Err(e @ Error::StoreUnavailable { .. }) => Err(e),
            Err(e) => {
                error!("[{symbol}] stored rows unreadable: {e}");
                notices.push(Notice::error(format!("{symbol}: {e}")));
                Ok((vec![], source))
            }
        }
    }

    fn today(&self) -> NaiveDate {
        self.settings
            .as_of
            .unwrap_or_else(|| Utc::now().date_naive())
    }
}
