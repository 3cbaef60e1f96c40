use anyhow::{anyhow, Context, Result};
use chartview_dash::{pagination, Interaction, PageState, Selection, Session};
use chartview_warehouse::Store;
use clap::Parser;
use cli::{Cli, Commands::*, TraceLevel};
use config::Settings;
use tracing::{debug, error, info, trace, Level};
use tracing_subscriber::{util::SubscriberInitExt, FmtSubscriber};

mod cli;
mod config;
mod view;
mod web;

fn preprocess(trace_level: Level) -> Result<()> {
    dotenv::dotenv().ok();
    FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish()
        .try_init()
        .context("failed to set the tracing subscriber")
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.trace {
        TraceLevel::TRACE => Level::TRACE,
        TraceLevel::DEBUG => Level::DEBUG,
        TraceLevel::INFO => Level::INFO,
        TraceLevel::WARN => Level::WARN,
        TraceLevel::ERROR => Level::ERROR,
    };

    preprocess(log_level)?;
    trace!("Command line input recorded: {cli:#?}");

    let mut settings = Settings::from_env()?;
    if let Some(db) = &cli.db {
        settings.db_path = db.clone();
    }
    debug!("{settings:#?}");

    ////////////////////////////////////////////////////////////////////////////////////////////////////

    // cli framework:
    // "> chartview <COMMAND>"
    match cli.command {
        // "> chartview serve [--bind 0.0.0.0] [--port 8080]"
        Serve { bind, port } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            let port = port.unwrap_or(settings.port);
            web::serve(settings.dashboard()?, &bind, port).await?;
        }

        // "> chartview tables"
        Tables => {
            for table in settings.store().list_tables()? {
                println!("{table}");
            }
        }

        // "> chartview symbols NIFTY50 [--page 2] [--search bank]"
        Symbols { table, page, search } => {
            let listings: Vec<_> = settings
                .store()
                .read_symbols(&table)?
                .into_iter()
                .filter(|l| l.matches(search.trim()))
                .collect();
            let (window, visible) =
                pagination::window(&listings, settings.page_size, page.saturating_sub(1));

            for listing in visible {
                println!("{:<16}{}", listing.symbol, listing.name);
            }
            println!("{} ({} symbols)", window.label(), window.total_items());
        }

        // ---------------------------------------------------------------------------
        // "> chartview render --out page.html [--table NIFTY50] [--offline]"
        // one top-to-bottom run of the dashboard, written to a file
        Render { table, page, symbol, search, offline, out } => {
            if offline {
                settings.refresh = false;
            }
            let dashboard = settings.dashboard()?;
            let mut session = Session::resume(
                Selection {
                    table,
                    page: page.saturating_sub(1),
                    symbol,
                    search: search.trim().to_string(),
                },
                None,
            );

            let html = view::render_html(&dashboard, &mut session, Interaction::Load).await?;
            tokio::fs::write(&out, html)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;

            match session.state() {
                PageState::Rendered(page) => info!(
                    "{} charts of {} written to {}",
                    page.panels.len(),
                    page.table.as_deref().unwrap_or("<no table>"),
                    out.display()
                ),
                PageState::Error(message) => {
                    error!("page failed, error page written to {}", out.display());
                    return Err(anyhow!(message.clone()));
                }
                PageState::Idle | PageState::Loading => {}
            }
        }
    }

    Ok(())
}
