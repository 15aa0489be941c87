//! `generate-catalog`: merges a scraped dump with an optional override
//! file and an optional snippet config, then builds the in-memory
//! registry and reports warnings for anything it couldn't fully resolve
//! (§4.7, §6).

use std::collections::HashMap;
use std::process::ExitCode;

use clap::Parser;
use docdb_pipeline::catalog::generate::{build_operator_entries, SnippetConfig};
use docdb_pipeline::catalog::merge::{merge, parse_overrides};
use docdb_pipeline::catalog::meta_map::normalize_category_key;
use docdb_pipeline::catalog::scrape::parse_dump;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Builds the operator registry from a scraped dump and optional overrides")]
struct Args {
    /// Path to the dump produced by `scrape-operators`.
    #[arg(long)]
    dump: String,

    /// Optional path to an override Markdown file using the same grammar.
    #[arg(long)]
    overrides: Option<String>,

    /// Optional path to a JSON snippet config: `{"per_operator": {...},
    /// "per_category_default": {...}}`.
    #[arg(long)]
    snippets: Option<String>,

    /// Base URL used for computed doc links.
    #[arg(long, default_value = "https://docs.example.com")]
    base_url: String,
}

#[derive(Deserialize, Default)]
struct SnippetFile {
    #[serde(default)]
    per_operator: HashMap<String, String>,
    #[serde(default)]
    per_category_default: HashMap<String, String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let dump_text = match std::fs::read_to_string(&args.dump) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("failed to read dump {}: {e}", args.dump);
            return ExitCode::FAILURE;
        }
    };
    let scraped = parse_dump(&dump_text);

    let overrides = match &args.overrides {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => parse_overrides(&text),
            Err(e) => {
                tracing::error!("failed to read overrides {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    for ov in &overrides {
        if !scraped.iter().any(|s| s.category == ov.category && s.operator == ov.operator) {
            warn!(category = %ov.category, operator = %ov.operator, "override target has no matching scraped entry");
        }
    }

    let merged = merge(&scraped, &overrides);

    let snippet_config = match &args.snippets {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<SnippetFile>(&text) {
                Ok(file) => SnippetConfig {
                    per_operator: file.per_operator,
                    per_category_default: file.per_category_default,
                },
                Err(e) => {
                    tracing::error!("failed to parse snippets {path}: {e}");
                    return ExitCode::FAILURE;
                }
            },
            Err(e) => {
                tracing::error!("failed to read snippets {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => SnippetConfig::default(),
    };

    let categories_seen: std::collections::HashSet<String> =
        merged.iter().map(|s| normalize_category_key(&s.category)).collect();
    for category_key in &categories_seen {
        let has_default = snippet_config.per_category_default.contains_key(category_key);
        let has_per_operator = merged
            .iter()
            .filter(|s| normalize_category_key(&s.category) == *category_key)
            .any(|s| snippet_config.per_operator.contains_key(&s.operator));
        if !has_default && !has_per_operator {
            warn!(category = %category_key, "no snippet source for category");
        }
    }

    let entries = build_operator_entries(&merged, &args.base_url, &snippet_config);
    info!(entry_count = entries.len(), "registry built");
    ExitCode::SUCCESS
}
