use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xqdb_core::Settings;

pub mod commands;
pub mod manifest;
mod util;

#[cfg(test)]
mod test_support;

use commands::documents::DocumentsArgs;
use commands::query::QueryArgs;

#[derive(Parser, Debug)]
#[command(name = "xqdb", version, about = "Query documents held in an xqdb store")]
pub struct Cli {
    /// Database settings (TOML). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `xqdb_core=trace`. Falls back to `RUST_LOG`.
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile and run a query against the store.
    Query(QueryArgs),
    /// Show the document set of one or more collections.
    Documents(DocumentsArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let output = execute(&cli)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Runs the parsed command and returns what it would print.
pub fn execute(cli: &Cli) -> anyhow::Result<String> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    match &cli.command {
        Command::Query(args) => commands::query::run(&settings, args),
        Command::Documents(args) => commands::documents::run(&settings, args),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{store_manifest, strip_ansi};
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    fn parses_query_arguments() {
        let cli = Cli::try_parse_from([
            "xqdb",
            "--log-level",
            "debug",
            "query",
            "count(collection())",
            "--store",
            "store.toml",
            "--var",
            "limit=3",
            "--max-results",
            "5",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Query(args) = cli.command else { panic!("expected the query command") };
        assert_eq!(args.expression, "count(collection())");
        assert_eq!(args.variables, vec![("limit".to_owned(), "3".to_owned())]);
        assert_eq!(args.max_results, 5);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[rstest]
    #[case(&["xqdb", "query", "1"])]
    #[case(&["xqdb", "documents", "--store", "s.toml"])]
    #[case(&["xqdb", "query", "1", "--store", "s.toml", "--var", "novalue"])]
    fn rejects_incomplete_invocations(#[case] argv: &[&str]) {
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[rstest]
    fn settings_file_controls_permission_checks() {
        let store = store_manifest();
        let mut config = tempfile::NamedTempFile::new().unwrap();
        writeln!(config, "[xquery]\ncheck-permissions = false").unwrap();

        let argv = |config: Option<&std::path::Path>| {
            let mut argv = vec!["xqdb".to_owned()];
            if let Some(config) = config {
                argv.extend(["--config".to_owned(), config.display().to_string()]);
            }
            argv.extend(
                ["query", "count(collection('/db/reports'))", "--store"].map(str::to_owned),
            );
            argv.push(store.path().display().to_string());
            argv
        };

        let restricted = execute(&Cli::try_parse_from(argv(None)).unwrap()).unwrap();
        assert!(strip_ansi(&restricted).starts_with("2\n"), "{restricted}");
        let unrestricted = execute(&Cli::try_parse_from(argv(Some(config.path()))).unwrap()).unwrap();
        assert!(strip_ansi(&unrestricted).starts_with("3\n"), "{unrestricted}");
    }

    #[rstest]
    fn missing_config_is_reported() {
        let cli = Cli::try_parse_from(["xqdb", "--config", "/nonexistent/xqdb.toml", "documents", "/db", "--store", "s"])
            .unwrap();
        let err = execute(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("loading settings"), "{err:#}");
    }
}
