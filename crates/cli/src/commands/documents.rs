use crate::OutputFormat;
use crate::manifest::Manifest;
use crate::util::{CliResult, resolve_user};
use clap::Args;
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use xqdb_core::{CollectionUri, DocumentSet, Settings};

#[derive(Args, Debug, Clone)]
pub struct DocumentsArgs {
    #[arg(value_name = "URI", required = true)]
    pub collections: Vec<String>,
    /// Store manifest (TOML).
    #[arg(long, value_name = "FILE")]
    pub store: PathBuf,
    #[arg(long)]
    pub user: Option<String>,
    /// Intersect the collections' document sets instead of joining them.
    #[arg(long)]
    pub intersect: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, PartialEq)]
struct DocumentSetSummary {
    count: usize,
    min_id: Option<u32>,
    max_id: Option<u32>,
    documents: Vec<String>,
    collections: Vec<String>,
}

impl DocumentSetSummary {
    fn from_set(set: &DocumentSet) -> Self {
        let mut collections: Vec<String> = set.collections().map(|c| c.uri().to_string()).collect();
        collections.sort();
        Self {
            count: set.len(),
            min_id: set.min_doc_id().map(|id| id.get()),
            max_id: set.max_doc_id().map(|id| id.get()),
            documents: set.iter().map(|doc| doc.uri()).collect(),
            collections,
        }
    }
}

pub fn run(settings: &Settings, args: &DocumentsArgs) -> CliResult<String> {
    let store = Manifest::load(&args.store)?.build_store(settings)?;
    let broker = store.broker(resolve_user(&store, args.user.as_deref(), settings)?);

    let mut combined: Option<DocumentSet> = None;
    for uri in &args.collections {
        let docs = broker.collection_documents(&CollectionUri::parse(uri)?, settings.xquery.check_permissions)?;
        combined = Some(match combined {
            None => docs,
            Some(acc) if args.intersect => acc.intersection(&docs),
            Some(acc) => acc.union(&docs),
        });
    }
    let summary = DocumentSetSummary::from_set(&combined.unwrap_or_default());
    match args.format {
        OutputFormat::Text => Ok(render_documents_text(&summary)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&summary)?),
    }
}

fn render_documents_text(summary: &DocumentSetSummary) -> String {
    let mut output = String::new();
    for doc in &summary.documents {
        let _ = writeln!(&mut output, "{doc}");
    }
    let _ = writeln!(&mut output, "Documents: {}", summary.count);
    if let (Some(min), Some(max)) = (summary.min_id, summary.max_id) {
        let _ = writeln!(&mut output, "Ids: {min}..={max}");
    }
    let _ = writeln!(&mut output, "Collections: {}", summary.collections.join(", "));
    output.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::store_manifest;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn args(store: &NamedTempFile, collections: &[&str]) -> DocumentsArgs {
        DocumentsArgs {
            collections: collections.iter().map(|c| (*c).to_owned()).collect(),
            store: store.path().to_path_buf(),
            user: Some("editor".into()),
            intersect: false,
            format: OutputFormat::Json,
        }
    }

    fn summary(output: &str) -> serde_json::Value {
        serde_json::from_str(output).unwrap()
    }

    #[rstest]
    fn union_covers_every_collection() {
        let store = store_manifest();
        let json = summary(&run(&Settings::default(), &args(&store, &["/db/reports", "/db/archive"])).unwrap());
        assert_eq!(json["count"], 5);
        assert_eq!(json["min_id"], 1);
        assert_eq!(json["max_id"], 5);
        assert_eq!(json["collections"], serde_json::json!(["/db/archive", "/db/reports"]));
    }

    #[rstest]
    fn intersection_keeps_shared_documents() {
        let store = store_manifest();
        let mut args = args(&store, &["/db", "/db/archive"]);
        args.intersect = true;
        let json = summary(&run(&Settings::default(), &args).unwrap());
        assert_eq!(json["documents"], serde_json::json!(["/db/archive/2019.xml"]));
    }

    #[rstest]
    fn empty_result_has_no_id_range() {
        let store = store_manifest();
        let mut args = args(&store, &["/db/reports", "/db/archive"]);
        args.intersect = true;
        args.format = OutputFormat::Text;
        let output = run(&Settings::default(), &args).unwrap();
        assert_eq!(output, "Documents: 0\nCollections:");
    }

    #[rstest]
    fn unreadable_collection_is_an_error_for_guests() {
        let store = store_manifest();
        let mut args = args(&store, &["/db/archive"]);
        args.user = None;
        let err = run(&Settings::default(), &args).unwrap_err();
        assert!(err.to_string().contains("/db/archive"), "{err}");
    }
}
