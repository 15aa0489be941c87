//! Operator scraper (§4.7): three phases plus a verification phase,
//! against an injected [`PageFetcher`] so the parsing logic is testable
//! without a network.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::meta_map::{directory_for_category, normalize_category_key};

/// Network boundary for the scraper. The production implementation is
/// `HttpFetcher` (a thin `reqwest::Client` wrapper); tests substitute an
/// in-memory table.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Production fetcher, backed by `reqwest` over rustls (§2 ambient
/// stack).
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher { client: reqwest::Client::new() }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::OperationError(format!("fetch {url}: {e}")))?;
        resp.text()
            .await
            .map_err(|e| Error::OperationError(format!("read body {url}: {e}")))
    }
}

/// Directory-listing boundary for the Phase 2 crawl fallback (§4.7,
/// §9). The production implementation walks the docs site's listing
/// API; tests substitute an in-memory table.
#[async_trait]
pub trait DirectoryListingApi: Send + Sync {
    /// All top-level directories under the docs tree's operator root.
    async fn list_root_directories(&self) -> Result<Vec<String>>;
    /// Filenames (operator slugs) found directly under `directory`.
    async fn list_files(&self, directory: &str) -> Result<Vec<String>>;
}

/// Production listing API, backed by the same docs site's JSON listing
/// endpoints (§9 ambient stack: `reqwest` + `serde_json`, matching
/// `HttpFetcher`).
pub struct HttpDirectoryListingApi {
    client: reqwest::Client,
    listing_base: String,
}

impl HttpDirectoryListingApi {
    pub fn new(listing_base: impl Into<String>) -> Self {
        HttpDirectoryListingApi { client: reqwest::Client::new(), listing_base: listing_base.into() }
    }

    async fn get_json(&self, url: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::OperationError(format!("list {url}: {e}")))?;
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| Error::OperationError(format!("parse listing {url}: {e}")))
    }
}

#[async_trait]
impl DirectoryListingApi for HttpDirectoryListingApi {
    async fn list_root_directories(&self) -> Result<Vec<String>> {
        self.get_json(&format!("{}/directories", self.listing_base)).await
    }

    async fn list_files(&self, directory: &str) -> Result<Vec<String>> {
        self.get_json(&format!("{}/directories/{directory}/files", self.listing_base)).await
    }
}

/// One row parsed from the compatibility table (§4.7 Phase 1).
#[derive(Debug, Clone, PartialEq)]
pub struct CompatRow {
    pub category: String,
    pub operator: String,
    pub listed: bool,
}

/// A fully scraped operator, after Phase 2 enrichment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrapedOperator {
    pub category: String,
    pub operator: String,
    pub description: String,
    pub syntax: Option<String>,
    pub link: Option<String>,
}

/// The two known-good URLs checked by the verification phase before any
/// real scraping begins; failure here aborts the whole run (§4.7).
pub struct VerificationTargets {
    pub compat_page_url: String,
    pub known_operator_page_url: String,
    pub known_operator_name: String,
}

/// Fetches the two verification targets and asserts structural
/// invariants: the compatibility page contains at least one `|`-leading
/// table row, and the known operator page has a non-empty frontmatter
/// `description:` field.
pub async fn verify(fetcher: &dyn PageFetcher, targets: &VerificationTargets) -> Result<()> {
    let compat = fetcher.fetch(&targets.compat_page_url).await?;
    if !compat.lines().any(|l| l.trim_start().starts_with('|')) {
        return Err(Error::ScrapeVerification(
            "compatibility page has no table rows".into(),
        ));
    }

    let page = fetcher.fetch(&targets.known_operator_page_url).await?;
    match extract_frontmatter_description(&page) {
        Some(desc) if !desc.is_empty() => {}
        _ => {
            return Err(Error::ScrapeVerification(format!(
                "known operator page {} has no frontmatter description",
                targets.known_operator_name
            )))
        }
    }

    info!("scraper verification passed");
    Ok(())
}

/// Parses the compatibility page's table(s) into rows (§4.7 Phase 1).
pub fn parse_compat_page(markdown: &str) -> Vec<CompatRow> {
    let mut rows = Vec::new();
    let mut current_section = String::new();
    let mut in_table = false;
    let mut past_separator = false;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if let Some(heading) = trimmed.strip_prefix("## ") {
            current_section = heading.trim().to_string();
            in_table = false;
            past_separator = false;
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix("# ") {
            current_section = heading.trim().to_string();
            in_table = false;
            past_separator = false;
            continue;
        }

        if !trimmed.starts_with('|') {
            in_table = false;
            past_separator = false;
            continue;
        }

        in_table = true;
        let cells: Vec<&str> = trimmed
            .trim_matches('|')
            .split('|')
            .map(|c| c.trim())
            .collect();

        if !past_separator {
            if cells.iter().all(|c| c.chars().all(|ch| ch == '-' || ch == ':')) {
                past_separator = true;
            }
            continue;
        }

        if cells.len() < 2 {
            continue;
        }

        if let Some(row) = parse_data_row(&cells, &current_section) {
            rows.push(row);
        }
    }
    let _ = in_table;
    rows
}

fn parse_data_row(cells: &[&str], current_section: &str) -> Option<CompatRow> {
    let raw_category = cells[0].trim();
    let category = if raw_category.is_empty() { current_section } else { raw_category };

    if category.contains('%') {
        return None;
    }

    let raw_operator = cells[1].trim();
    if raw_operator.chars().all(|c| c.is_ascii_digit() || c == '.') && !raw_operator.is_empty() {
        // Summary row (a count), not an operator entry.
        return None;
    }

    let mut operator = extract_operator_name(raw_operator);

    // `$[identifier]` loses its brackets to link-text extraction; recover
    // it when the raw cell still shows the bracket form.
    if !operator.starts_with('$') && raw_operator.contains("$[") {
        operator = strip_backticks(raw_operator);
    }

    if category.to_ascii_lowercase().contains("variable") && !operator.starts_with("$$") {
        operator = format!("$${}", operator.trim_start_matches('$'));
    }

    let listed = row_is_listed(&cells[2..]);

    Some(CompatRow {
        category: category.to_string(),
        operator,
        listed,
    })
}

fn strip_backticks(s: &str) -> String {
    s.trim_matches('`').to_string()
}

fn extract_operator_name(cell: &str) -> String {
    let stripped = strip_backticks(cell.trim());
    // `[text](url)` link form.
    if let Some(close_bracket) = stripped.strip_prefix('[').and_then(|rest| rest.find(']').map(|i| (rest, i))) {
        let (rest, i) = close_bracket;
        return strip_backticks(rest[..i].trim());
    }
    stripped
}

fn row_is_listed(version_cells: &[&str]) -> bool {
    let has_support = version_cells
        .iter()
        .any(|c| c.contains("Yes") || c.contains('\u{2705}') || c.contains('\u{2713}'));
    let has_deprecation = version_cells
        .iter()
        .any(|c| c.to_ascii_lowercase().contains("deprecat") || c.contains('\u{274c}'));
    has_support && !has_deprecation
}

/// YAML-ish frontmatter `description:` extraction (§4.7 Phase 2). Quotes
/// are stripped; this is not a general YAML parser.
pub fn extract_frontmatter_description(page: &str) -> Option<String> {
    let mut lines = page.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" {
            break;
        }
        if let Some(rest) = trimmed.strip_prefix("description:") {
            return Some(rest.trim().trim_matches('"').trim_matches('\'').to_string());
        }
    }
    None
}

/// First fenced code block after a `## Syntax` heading, CRLF-normalized
/// (§4.7 Phase 2).
pub fn extract_syntax_block(page: &str) -> Option<String> {
    use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};

    let normalized = page.replace("\r\n", "\n");

    let mut in_target_heading = false;
    let mut past_syntax_heading = false;
    let mut in_code_block = false;
    let mut block = String::new();

    for event in Parser::new(&normalized) {
        match event {
            Event::Start(Tag::Heading { level: HeadingLevel::H2, .. }) if !past_syntax_heading => {
                in_target_heading = true;
            }
            Event::Text(text) if in_target_heading => {
                if text.as_ref().trim() != "Syntax" {
                    in_target_heading = false;
                }
            }
            Event::End(TagEnd::Heading(HeadingLevel::H2)) if in_target_heading => {
                in_target_heading = false;
                past_syntax_heading = true;
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) if past_syntax_heading => {
                in_code_block = true;
            }
            Event::Text(text) if in_code_block => {
                block.push_str(&text);
            }
            Event::End(TagEnd::CodeBlock) if in_code_block => {
                return Some(block.trim_end_matches('\n').to_string());
            }
            _ => {}
        }
    }
    None
}

/// Batches `urls` into groups of `concurrency`, sleeping `delay` between
/// batches, firing `fetch_one` for each URL (§4.7 rate limiting, §5).
pub async fn fetch_batched<F, Fut>(
    urls: &[String],
    concurrency: usize,
    delay: Duration,
    fetch_one: F,
) -> Vec<Result<String>>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let semaphore = std::sync::Arc::new(Semaphore::new(concurrency.max(1)));
    let mut results = Vec::with_capacity(urls.len());

    for chunk in urls.chunks(concurrency.max(1)) {
        let mut handles = Vec::new();
        for url in chunk {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore open");
            let fut = fetch_one(url.clone());
            handles.push(async move {
                let result = fut.await;
                drop(permit);
                result
            });
        }
        for fut in handles {
            results.push(fut.await);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    results
}

/// Crawls the docs tree's directory listing API into a global filename
/// -> directory index (§4.7 Phase 2 fallback (b), §9), pacing calls by
/// `delay` the same way `fetch_batched` paces page fetches. First
/// directory to claim a filename wins; later duplicates are ignored.
pub async fn crawl_filename_index(
    listing: &dyn DirectoryListingApi,
    delay: Duration,
) -> Result<HashMap<String, String>> {
    let mut index = HashMap::new();
    for root in listing.list_root_directories().await? {
        let files = listing.list_files(&root).await?;
        for file in files {
            index.entry(file).or_insert_with(|| root.clone());
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(index)
}

/// Alternate casings of `slug` to probe against the filename index
/// (§4.7 Phase 2 fallback (c)), excluding `slug` itself.
fn case_variants(slug: &str) -> Vec<String> {
    let mut chars = slug.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    [slug.to_ascii_lowercase(), slug.to_ascii_uppercase(), capitalized]
        .into_iter()
        .filter(|v| v != slug)
        .collect()
}

/// Resolves the docs directory for a scraped category and operator
/// slug, trying in order: (a) the static category map, (b) an exact
/// filename-index lookup, (c) case-variant filename-index lookups.
/// Warns (does not fail) when all three miss (§6 exit conditions).
pub fn resolve_directory(category: &str, slug: &str, index: &HashMap<String, String>) -> Option<String> {
    let key = normalize_category_key(category);
    if let Some(dir) = directory_for_category(&key) {
        return Some(dir.to_string());
    }
    if let Some(dir) = index.get(slug) {
        return Some(dir.clone());
    }
    for variant in case_variants(slug) {
        if let Some(dir) = index.get(&variant) {
            return Some(dir.clone());
        }
    }
    warn!(category, slug, "no directory mapping for scraped category");
    None
}

/// Runs Phase 1 + Phase 2 against `fetcher`, returning listed operators
/// (enriched) and the not-listed rows. `operator_docs_base` is used to
/// build each per-operator page URL; `listing` backs the directory
/// crawl fallback; `concurrency`/`delay` drive Phase 2's rate limiting
/// (the same `delay` paces the directory crawl).
pub async fn scrape(
    fetcher: &dyn PageFetcher,
    listing: &dyn DirectoryListingApi,
    compat_page_url: &str,
    operator_docs_base: &str,
    concurrency: usize,
    delay: Duration,
) -> Result<(Vec<ScrapedOperator>, Vec<CompatRow>)> {
    let compat_markdown = fetcher.fetch(compat_page_url).await?;
    let rows = parse_compat_page(&compat_markdown);

    let (listed_rows, not_listed): (Vec<_>, Vec<_>) = rows.into_iter().partition(|r| r.listed);

    let index = crawl_filename_index(listing, delay).await?;

    let mut url_by_operator: HashMap<String, String> = HashMap::new();
    let urls: Vec<String> = listed_rows
        .iter()
        .map(|row| {
            let slug = row.operator.trim_start_matches('$').to_ascii_lowercase();
            let dir = resolve_directory(&row.category, &slug, &index).unwrap_or_else(|| "misc".to_string());
            let url = format!("{operator_docs_base}/{dir}/{slug}");
            url_by_operator.insert(row.operator.clone(), url.clone());
            url
        })
        .collect();

    let fetched = fetch_batched(&urls, concurrency, delay, |url| async move { fetcher.fetch(&url).await }).await;

    let mut scraped = Vec::with_capacity(listed_rows.len());
    for (row, page_result) in listed_rows.into_iter().zip(fetched.into_iter()) {
        let page = match page_result {
            Ok(p) => p,
            Err(e) => {
                warn!(operator = %row.operator, "failed to fetch operator page: {e}");
                continue;
            }
        };
        let description = extract_frontmatter_description(&page).unwrap_or_default();
        let syntax = extract_syntax_block(&page);
        let link = url_by_operator.get(&row.operator).cloned();
        scraped.push(ScrapedOperator {
            category: row.category,
            operator: row.operator,
            description,
            syntax,
            link,
        });
    }

    Ok((scraped, not_listed))
}

/// Parses a dump produced by `emit_dump` back into its operator list,
/// ignoring the trailing `## Not Listed` section (§8 round-trip law:
/// `parse(emit(ops)) == ops`, modulo ordering within a category).
pub fn parse_dump(markdown: &str) -> Vec<ScrapedOperator> {
    let mut entries = Vec::new();
    let mut current_category = String::new();
    let mut current: Option<ScrapedOperator> = None;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed == "## Not Listed" {
            break;
        }
        if let Some(category) = trimmed.strip_prefix("## ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current_category = category.trim().to_string();
            continue;
        }
        if let Some(operator) = trimmed.strip_prefix("### ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(ScrapedOperator {
                category: current_category.clone(),
                operator: operator.trim().to_string(),
                ..Default::default()
            });
            continue;
        }
        let Some(entry) = current.as_mut() else { continue };
        if let Some(rest) = trimmed.strip_prefix("- **Description:**") {
            entry.description = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("- **Syntax:**") {
            entry.syntax = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("- **Doc Link:**") {
            entry.link = Some(rest.trim().to_string());
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries
}

/// Emits the canonical Markdown dump (§4.7 Phase 3, §6 output grammar).
pub fn emit_dump(listed: &[ScrapedOperator], not_listed: &[CompatRow]) -> String {
    let mut by_category: Vec<(&str, Vec<&ScrapedOperator>)> = Vec::new();
    for op in listed {
        match by_category.iter_mut().find(|(c, _)| *c == op.category) {
            Some((_, ops)) => ops.push(op),
            None => by_category.push((&op.category, vec![op])),
        }
    }

    let mut out = String::new();
    for (category, ops) in &by_category {
        out.push_str(&format!("## {category}\n\n"));
        for op in ops {
            out.push_str(&format!("### {}\n\n", op.operator));
            out.push_str(&format!("- **Description:** {}\n", op.description));
            if let Some(syntax) = &op.syntax {
                out.push_str(&format!("- **Syntax:** {syntax}\n"));
            }
            if let Some(link) = &op.link {
                out.push_str(&format!("- **Doc Link:** {link}\n"));
            }
            out.push('\n');
        }
    }

    out.push_str("## Not Listed\n\n");
    for row in not_listed {
        out.push_str(&format!("- **{}** ({}) — not supported\n", row.operator, row.category));
    }
    out
}
