use crate::OutputFormat;
use crate::manifest::Manifest;
use crate::util::{CliResult, parse_variable, resolve_user, variable_value};
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use xqdb_core::{CollectionUri, Settings};
use xqdb_xquery::{DynamicContextBuilder, Item, StaticContextBuilder, compile, execute};

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(value_name = "XQUERY")]
    pub expression: String,
    /// Store manifest (TOML).
    #[arg(long, value_name = "FILE")]
    pub store: PathBuf,
    #[arg(long)]
    pub user: Option<String>,
    /// Collection used by `collection()` without arguments.
    #[arg(long = "context", value_name = "URI")]
    pub context: Option<String>,
    #[arg(long = "max-results", default_value_t = 100)]
    pub max_results: usize,
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
    pub variables: Vec<(String, String)>,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum QueryItemSummary {
    Document { id: u32, path: String, collection: Option<String> },
    Value { value: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub hits: usize,
    pub elapsed_ms: u64,
    pub items: Vec<QueryItemSummary>,
}

pub fn run(settings: &Settings, args: &QueryArgs) -> CliResult<String> {
    let store = Manifest::load(&args.store)?.build_store(settings)?;
    let user = resolve_user(&store, args.user.as_deref(), settings)?;

    let mut static_ctx = StaticContextBuilder::new().with_settings(&settings.xquery);
    if let Some(context) = &args.context {
        static_ctx = static_ctx.with_default_collection(CollectionUri::parse(context)?);
    }
    let mut dyn_ctx = DynamicContextBuilder::new().with_settings(&settings.xquery);
    for (name, value) in &args.variables {
        static_ctx = static_ctx.with_variable(name.as_str());
        dyn_ctx = dyn_ctx.with_variable(name.as_str(), vec![variable_value(value)]);
    }

    let started = Instant::now();
    let query = compile(&args.expression, &static_ctx.build())?;
    let items = execute(&query, &store.broker(user), &dyn_ctx.build())?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(hits = items.len(), elapsed_ms, "query finished");

    let report = QueryReport {
        hits: items.len(),
        elapsed_ms,
        items: items.iter().take(args.max_results).map(summarize_item).collect(),
    };
    match args.format {
        OutputFormat::Text => Ok(render_query_text(&report)),
        OutputFormat::Json => render_query_json(&report),
    }
}

fn summarize_item(item: &Item) -> QueryItemSummary {
    match item {
        Item::Node(node) => {
            let doc = node.doc();
            QueryItemSummary::Document {
                id: doc.id().get(),
                path: doc.uri(),
                collection: doc.collection().map(|c| c.uri().to_string()),
            }
        }
        Item::Atomic(value) => QueryItemSummary::Value { value: value.to_string() },
    }
}

fn colorize_path(path: &str) -> String {
    path.if_supports_color(Stream::Stdout, |text| text.bold().fg_rgb::<79, 166, 255>().to_string()).to_string()
}

fn colorize_value(value: &str) -> String {
    value.if_supports_color(Stream::Stdout, |text| text.fg_rgb::<136, 192, 74>().to_string()).to_string()
}

fn colorize_footer(text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |text| text.dimmed().to_string()).to_string()
}

pub(crate) fn render_query_text(report: &QueryReport) -> String {
    let mut output = String::new();
    for item in &report.items {
        match item {
            QueryItemSummary::Document { id, path, .. } => {
                let _ = writeln!(&mut output, "{} [{id}]", colorize_path(path));
            }
            QueryItemSummary::Value { value } => {
                let _ = writeln!(&mut output, "{}", colorize_value(value));
            }
        }
    }
    let footer = if report.items.len() < report.hits {
        format!("{} hit(s), showing {}, in {} ms", report.hits, report.items.len(), report.elapsed_ms)
    } else {
        format!("{} hit(s) in {} ms", report.hits, report.elapsed_ms)
    };
    let _ = writeln!(&mut output, "{}", colorize_footer(&footer));
    output.trim_end().to_owned()
}

pub(crate) fn render_query_json(report: &QueryReport) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
