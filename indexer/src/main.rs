use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kbase_core::{Config, DocId, DocType, Document, KnowledgeBase, NewDocument, SearchHit, SearchResult};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kbase")]
#[command(about = "Ingest, search and back up a personal knowledge base", long_about = None)]
struct Cli {
    /// Data directory holding knowledge_base.json (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Config file path; defaults to ./kbase.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print JSON instead of human-readable output
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Cv,
    Job,
    Note,
    Other,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a text file, or every .txt/.md file under a directory
    Ingest {
        #[arg(value_enum)]
        kind: Kind,
        path: PathBuf,
        /// Title; defaults to the file stem (a single job posting: "Unknown Position")
        #[arg(long)]
        title: Option<String>,
        /// Company for job postings
        #[arg(long)]
        company: Option<String>,
        /// Comma-separated tags for notes and other documents
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Bulk-load JSON/JSONL document records ({title, content, doc_type, ...})
    Load {
        /// Input path (file or directory)
        path: PathBuf,
    },
    /// Ranked keyword search
    Search {
        query: String,
        /// Only return documents of this type (cv, job_posting, note, ...)
        #[arg(long = "type")]
        doc_type: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// List every document of a type
    List { doc_type: String },
    /// Print one document
    Show { id: DocId },
    /// Corpus statistics
    Stats,
    /// Documents of another type that resemble document <id> (CV -> job postings by default)
    Similar {
        id: DocId,
        #[arg(long = "type", default_value = "job_posting")]
        doc_type: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Write all documents plus stats to a JSON snapshot
    Export { path: Option<PathBuf> },
    /// Re-ingest a snapshot written by `export`
    Import { path: PathBuf },
    /// Remove a document
    Delete { id: DocId },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let kb = KnowledgeBase::open(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Ingest { kind, path, title, company, tags } => {
            for (id, doc_type, file) in ingest_path(&kb, kind, &path, title, company.as_deref(), &tags)? {
                println!("ingested {doc_type} {id} <- {}", file.display());
            }
        }
        Commands::Load { path } => {
            let mut count = 0usize;
            for file in collect_files(&path, &["json", "jsonl"]) {
                count += load_records(&kb, &file)?;
            }
            tracing::info!(count, "loaded records");
            println!("loaded {count} documents");
        }
        Commands::Search { query, doc_type, k } => {
            let mut opts = kb.search_options();
            opts.doc_type = doc_type.map(DocType::from);
            opts.top_k = kb.config().clamp_top_k(k);
            let results = kb.search(&query, &opts);
            if json {
                print_json(&results.into_iter().map(SearchHit::from).collect::<Vec<_>>())?;
            } else {
                print_results(&format!("Search results for '{query}'"), &results);
            }
        }
        Commands::List { doc_type } => {
            let docs = kb.get_by_type(&DocType::from(doc_type));
            if json {
                print_json(&docs)?;
            } else {
                for doc in &docs {
                    print_summary(doc);
                }
                println!("{} document(s)", docs.len());
            }
        }
        Commands::Show { id } => match kb.get(id) {
            Some(doc) if json => print_json(&doc)?,
            Some(doc) => {
                print_summary(&doc);
                println!("\n{}", doc.content);
            }
            None => anyhow::bail!("document {id} not found"),
        },
        Commands::Stats => {
            let stats = kb.stats();
            if json {
                print_json(&stats)?;
            } else {
                println!("Total documents: {}", stats.total_documents);
                println!("Unique terms:    {}", stats.unique_terms);
                let last = stats.last_updated.and_then(|t| t.format(&Rfc3339).ok()).unwrap_or_else(|| "never".into());
                println!("Last updated:    {last}");
                println!("By type:");
                for (doc_type, count) in &stats.by_type {
                    println!("  {doc_type}: {count}");
                }
            }
        }
        Commands::Similar { id, doc_type, k } => {
            let results = kb.find_similar(id, &DocType::from(doc_type), kb.config().clamp_top_k(k.or(Some(5))));
            if json {
                print_json(&results.into_iter().map(SearchHit::from).collect::<Vec<_>>())?;
            } else {
                print_results(&format!("Documents similar to {id}"), &results);
            }
        }
        Commands::Export { path } => {
            let path = path.unwrap_or_else(|| default_export_path(&kb.config().data_dir));
            kb.export_corpus(&path)?;
            println!("exported to {}", path.display());
        }
        Commands::Import { path } => {
            let report = kb.import_corpus(&path)?;
            if json {
                print_json(&report)?;
            } else {
                println!("imported={} replaced={} skipped={}", report.imported, report.replaced, report.skipped);
            }
        }
        Commands::Delete { id } => {
            let doc = kb.delete_document(id)?;
            println!("deleted {} ({})", doc.id, doc.title);
        }
    }
    Ok(())
}

/// Ingest one file, or every .txt/.md file below a directory.
fn ingest_path(
    kb: &KnowledgeBase,
    kind: Kind,
    path: &Path,
    title: Option<String>,
    company: Option<&str>,
    tags: &[String],
) -> Result<Vec<(DocId, DocType, PathBuf)>> {
    let walk_dir = path.is_dir();
    let mut ingested = Vec::new();
    for file in collect_files(path, &["txt", "md"]) {
        let text = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
        let doc = build_document(kind, &file, text, title.clone(), company, tags, walk_dir);
        let doc_type = doc.doc_type.clone();
        let id = kb.ingest(doc)?;
        ingested.push((id, doc_type, file));
    }
    Ok(ingested)
}

/// Job postings are keyed by company + title, so in directory mode an unset
/// title falls back to the file stem to keep each posting distinct.
fn build_document(
    kind: Kind,
    file: &Path,
    text: String,
    title: Option<String>,
    company: Option<&str>,
    tags: &[String],
    walk_dir: bool,
) -> NewDocument {
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("untitled").to_string();
    let doc = match kind {
        Kind::Cv => NewDocument::cv(text, title.unwrap_or(stem)),
        Kind::Job => {
            let title = title.unwrap_or_else(|| if walk_dir { stem } else { "Unknown Position".to_string() });
            NewDocument::job_posting(text, company.unwrap_or("Unknown"), &title)
        }
        Kind::Note => NewDocument::note(text, title.unwrap_or(stem), tags.iter().cloned()),
        Kind::Other => NewDocument::new(text, title.unwrap_or(stem), DocType::from("other")).with_tags(tags.iter().cloned()),
    };
    doc.with_source(file.display().to_string())
}

/// `path` itself if it is a file, else every file below it with one of `exts`.
fn collect_files(path: &Path, exts: &[&str]) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| exts.contains(&ext)))
        .collect();
    files.sort();
    files
}

fn load_records(kb: &KnowledgeBase, file: &Path) -> Result<usize> {
    let mut count = 0usize;
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let reader = BufReader::new(File::open(file)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            let doc: NewDocument = serde_json::from_str(&line).with_context(|| format!("parsing {}", file.display()))?;
            kb.ingest(doc)?;
            count += 1;
        }
        return Ok(count);
    }
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(file)?))?;
    let records = match json {
        serde_json::Value::Array(arr) => arr,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => vec![],
    };
    for v in records {
        let doc: NewDocument = serde_json::from_value(v).with_context(|| format!("parsing {}", file.display()))?;
        kb.ingest(doc)?;
        count += 1;
    }
    Ok(count)
}

fn default_export_path(data_dir: &Path) -> PathBuf {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default();
    data_dir.join("exports").join(format!("knowledge_base_export_{stamp}.json"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(doc: &Document) {
    let tags: Vec<&str> = doc.tags.iter().map(String::as_str).collect();
    println!("[{}] {} ({}) tags: {}", doc.id, doc.title, doc.doc_type, tags.join(", "));
}

fn print_results(header: &str, results: &[SearchResult]) {
    println!("\n{header}");
    println!("{}", "=".repeat(60));
    if results.is_empty() {
        println!("No results found.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!("\n{}. {} [{}]", i + 1, r.document.title, r.document.id);
        println!("   Type: {} | Score: {:.3}", r.document.doc_type, r.score);
        let shown: Vec<&str> = r.matched_terms.iter().take(5).map(String::as_str).collect();
        println!("   Matched: {}", shown.join(", "));
        println!("   {}", r.excerpt);
    }
}
