use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets the level of tracing
    #[arg(long, default_value = "INFO", ignore_case = true)]
    pub trace: TraceLevel,

    /// Path of the SQLite database; overrides CHARTVIEW_DB
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the dashboard and its JSON API.
    Serve {
        /// Address to bind; overrides CHARTVIEW_BIND
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on; overrides CHARTVIEW_PORT
        #[arg(long)]
        port: Option<u16>,
    },

    /// List the tables of the database.
    Tables,

    /// List one page of the symbols of a table.
    Symbols {
        table: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Case-insensitive filter over symbol and name
        #[arg(long, default_value = "")]
        search: String,
    },

    /// Render one dashboard page to a standalone HTML file.
    Render {
        #[arg(long)]
        table: Option<String>,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Chart this symbol only
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value = "")]
        search: String,

        /// Skip the market data provider and chart persisted rows only
        #[arg(long)]
        offline: bool,

        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_render_arguments() {
        let cli = Cli::parse_from([
            "chartview", "--trace", "DEBUG", "render", "--table", "NIFTY50", "--page", "2",
            "--offline", "--out", "page.html",
        ]);
        assert_eq!(cli.trace, TraceLevel::DEBUG);
        match cli.command {
            Commands::Render { table, page, symbol, offline, out, .. } => {
                assert_eq!(table.as_deref(), Some("NIFTY50"));
                assert_eq!(page, 2);
                assert_eq!(symbol, None);
                assert!(offline);
                assert_eq!(out, PathBuf::from("page.html"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn symbols_default_to_the_first_page() {
        let cli = Cli::parse_from(["chartview", "symbols", "NASDAQ100", "--db", "other.db"]);
        assert_eq!(cli.trace, TraceLevel::INFO);
        assert_eq!(cli.db, Some(PathBuf::from("other.db")));
        assert!(matches!(
            cli.command,
            Commands::Symbols { page: 1, ref search, .. } if search.is_empty()
        ));
    }
}
