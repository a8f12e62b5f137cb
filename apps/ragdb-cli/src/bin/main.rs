use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use ragdb_core::config::Config;
use ragdb_core::traits::ProgressObserver;
use ragdb_core::types::{DocumentStatus, IngestStage, ProgressEvent};
use ragdb_hybrid::IndexManager;

const USAGE: &str = "Usage: ragdb <command> [args...]

Commands:
  ingest <collection> <file|dir> [--id ID]   add documents (id defaults to the file stem)
  query <collection> <text...> [--top N] [--json]
  delete <document-id> [--collection C]
  list [collection]                          collections, or the documents in one
  drop <collection>
  check <collection>                         compare the manifest, lexical and vector indexes";

/// Shows ingestion milestones on a spinner.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressObserver for SpinnerObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        let doc = &event.document_id;
        let msg = match &event.stage {
            IngestStage::Normalized { chars } => format!("{doc}: normalized {chars} chars"),
            IngestStage::Chunked { chunks } => format!("{doc}: {chunks} chunks"),
            IngestStage::Embedded { vectors } => format!("{doc}: embedded {vectors} chunks"),
            IngestStage::Indexed => format!("{doc}: indexed"),
            IngestStage::Failed { reason } => format!("{doc}: failed ({reason})"),
        };
        self.bar.set_message(msg);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ragdb=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn take_flag(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    }
}

fn take_option(args: &mut Vec<String>, name: &str) -> anyhow::Result<Option<String>> {
    let Some(i) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if i + 1 >= args.len() {
        anyhow::bail!("{name} requires a value");
    }
    let value = args.remove(i + 1);
    args.remove(i);
    Ok(Some(value))
}

fn positional(args: &[String], i: usize, what: &str) -> anyhow::Result<String> {
    args.get(i).cloned().ok_or_else(|| anyhow::anyhow!("missing {what}\n\n{USAGE}"))
}

/// File stem reduced to the characters document ids allow.
fn document_id_for(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    stem.chars().map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' }).collect()
}

fn files_under(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

async fn ingest(manager: &IndexManager, mut args: Vec<String>) -> anyhow::Result<()> {
    let id = take_option(&mut args, "--id")?;
    let collection = positional(&args, 0, "collection")?;
    let path = PathBuf::from(positional(&args, 1, "file or directory")?);
    let files = files_under(&path);
    if id.is_some() && files.len() != 1 {
        anyhow::bail!("--id applies to a single file, {} found under {}", files.len(), path.display());
    }

    let (mut ready, mut failed) = (0, 0);
    for file in files {
        let bytes = std::fs::read(&file)?;
        let filename = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let document_id = id.clone().unwrap_or_else(|| document_id_for(&file));
        match manager.ingest(&collection, &document_id, &bytes, &filename).await {
            Ok(report) if report.status == DocumentStatus::Ready => {
                ready += 1;
                println!("✅ {document_id} ({filename}): {} chunks", report.chunks);
            }
            Ok(report) => {
                failed += 1;
                println!("❌ {document_id} ({filename}): {}", report.error.unwrap_or_default());
            }
            Err(e) => {
                failed += 1;
                println!("❌ {document_id} ({filename}): {e}");
            }
        }
    }
    println!("\n📊 {ready} ready, {failed} failed in '{collection}'");
    Ok(())
}

async fn query(manager: &IndexManager, mut args: Vec<String>) -> anyhow::Result<()> {
    let json = take_flag(&mut args, "--json");
    let top = take_option(&mut args, "--top")?.map(|t| t.parse::<usize>()).transpose()?;
    let collection = positional(&args, 0, "collection")?;
    let text = args[1..].join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("missing query text\n\n{USAGE}");
    }

    let result = manager.retrieve(&collection, &text, top).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("🔍 {} passages for \"{text}\"", result.passages.len());
    if result.degraded {
        println!("⚠️  degraded: {:?}", result.degradations);
    }
    for (i, p) in result.passages.iter().enumerate() {
        let score = |s: Option<f32>| s.map_or("-".to_string(), |v| format!("{v:.4}"));
        println!(
            "\n  {}. {} [{}] fused={:.4} bm25={} vec={} rerank={}",
            i + 1,
            p.document_filename,
            p.chunk_id,
            p.fused_score,
            score(p.lexical_score),
            score(p.vector_score),
            score(p.rerank_score)
        );
        println!("     {}", p.text);
    }
    println!("\n--- context ({} tokens) ---\n{}", result.context.token_count, result.context.text);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        println!("{USAGE}");
        return Ok(());
    }
    let cmd = args.remove(0);

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let engine = config.engine()?;
    let base = env::current_dir()?;
    let manager = IndexManager::open_default(engine, &base)?;
    tracing::debug!(root = %manager.root().display(), "storage root");

    match cmd.as_str() {
        "ingest" => {
            let spinner = SpinnerObserver::new();
            let bar = spinner.bar.clone();
            let manager = manager.with_observer(Arc::new(spinner));
            let outcome = ingest(&manager, args).await;
            bar.finish_and_clear();
            outcome?;
        }
        "query" => query(&manager, args).await?,
        "delete" => {
            let collection = take_option(&mut args, "--collection")?;
            let document_id = positional(&args, 0, "document id")?;
            let doc = match collection {
                Some(c) => manager.delete_from(&c, &document_id).await?,
                None => manager.delete(&document_id).await?,
            };
            println!("🗑️  deleted {} ({} chunks) from '{}'", doc.id, doc.chunk_ids.len(), doc.collection_id);
        }
        "list" => match args.first() {
            Some(collection) => {
                for doc in manager.documents(collection).await? {
                    let status = serde_json::to_string(&doc.status)?;
                    println!(
                        "{}\t{}\t{}\t{} chunks\t{}",
                        doc.id,
                        doc.filename,
                        status.trim_matches('"'),
                        doc.chunk_ids.len(),
                        doc.error.unwrap_or_default()
                    );
                }
            }
            None => {
                for id in manager.collection_ids() {
                    println!("{id}");
                }
            }
        },
        "drop" => {
            let collection = positional(&args, 0, "collection")?;
            manager.drop_collection(&collection).await?;
            println!("🗑️  dropped '{collection}'");
        }
        "check" => {
            let collection = positional(&args, 0, "collection")?;
            let report = manager.consistency(&collection).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_consistent() {
                anyhow::bail!("collection '{collection}' is inconsistent");
            }
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(1);
        }
    }
    Ok(())
}
