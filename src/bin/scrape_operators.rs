//! `scrape-operators`: runs the verification phase then the three
//! scrape phases against a live docs site, writing the canonical
//! Markdown dump (§4.7, §6).

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use docdb_pipeline::catalog::scrape::{
    emit_dump, scrape, verify, DirectoryListingApi, HttpDirectoryListingApi, HttpFetcher, PageFetcher,
    VerificationTargets,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Scrapes the operator compatibility table and per-operator docs pages")]
struct Args {
    /// URL of the compatibility Markdown page.
    #[arg(long)]
    compat_page_url: String,

    /// Base URL the per-operator docs tree is rooted at.
    #[arg(long)]
    operator_docs_base: String,

    /// A known-good operator page URL, checked during verification.
    #[arg(long)]
    known_operator_page_url: String,

    /// The operator name at `known_operator_page_url`, for error messages.
    #[arg(long, default_value = "unknown")]
    known_operator_name: String,

    /// Concurrent fetch count per batch (§4.7 rate limiting).
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Delay between fetch batches, in milliseconds.
    #[arg(long, default_value_t = 300)]
    batch_delay_ms: u64,

    /// Where to write the canonical dump.
    #[arg(long, default_value = "operators.dump.md")]
    output: String,

    /// Base URL of the docs site's directory-listing API, used to build
    /// the directory-crawl fallback index.
    #[arg(long)]
    directory_listing_base: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let fetcher: Box<dyn PageFetcher> = Box::new(HttpFetcher::new());
    let listing: Box<dyn DirectoryListingApi> = Box::new(HttpDirectoryListingApi::new(args.directory_listing_base.clone()));

    let targets = VerificationTargets {
        compat_page_url: args.compat_page_url.clone(),
        known_operator_page_url: args.known_operator_page_url,
        known_operator_name: args.known_operator_name,
    };

    if let Err(e) = verify(fetcher.as_ref(), &targets).await {
        error!("verification failed: {e}");
        return ExitCode::FAILURE;
    }
    info!("verification passed, starting scrape");

    let (listed, not_listed) = match scrape(
        fetcher.as_ref(),
        listing.as_ref(),
        &args.compat_page_url,
        &args.operator_docs_base,
        args.concurrency,
        Duration::from_millis(args.batch_delay_ms),
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            error!("scrape failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(listed = listed.len(), not_listed = not_listed.len(), "scrape complete");

    let dump = emit_dump(&listed, &not_listed);
    if let Err(e) = std::fs::write(&args.output, dump) {
        error!("failed to write dump to {}: {e}", args.output);
        return ExitCode::FAILURE;
    }

    info!(output = %args.output, "dump written");
    ExitCode::SUCCESS
}
