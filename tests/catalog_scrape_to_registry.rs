//! End-to-end scrape -> generate -> registry round trip (§8 scenario 7):
//! a minimal compatibility page with one category and one operator,
//! scraped and turned into a registry entry whose meta tag matches the
//! category mapping and whose link equals `base/dir/<op>`.

use std::collections::HashMap as StdHashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docdb_pipeline::catalog::generate::{build_operator_entries, SnippetConfig};
use docdb_pipeline::catalog::scrape::{scrape, DirectoryListingApi, PageFetcher};
use docdb_pipeline::Result;

struct FixtureFetcher {
    pages: Mutex<StdHashMap<String, String>>,
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| docdb_pipeline::Error::ScrapeVerification(format!("no fixture for {url}")))
    }
}

struct EmptyListing;

#[async_trait]
impl DirectoryListingApi for EmptyListing {
    async fn list_root_directories(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn list_files(&self, _directory: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

#[tokio::test]
async fn scrape_then_generate_registers_one_entry_with_matching_meta_and_link() {
    let mut pages = StdHashMap::new();
    pages.insert(
        "https://compat.example/page".to_string(),
        "\
## Comparison

| Category | Operator | v7 |
|---|---|---|
| Comparison | `$eq` | Yes |
"
        .to_string(),
    );
    pages.insert(
        "https://docs.example/query/eq".to_string(),
        "---\ndescription: \"Matches equal values.\"\n---\n\n## Syntax\n\n```json\n{ $eq: [a, b] }\n```\n"
            .to_string(),
    );

    let fetcher = FixtureFetcher { pages: Mutex::new(pages) };
    let listing = EmptyListing;
    let (scraped, not_listed) = scrape(
        &fetcher,
        &listing,
        "https://compat.example/page",
        "https://docs.example",
        4,
        Duration::from_millis(0),
    )
    .await
    .unwrap();

    assert!(not_listed.is_empty());
    assert_eq!(scraped.len(), 1);

    let entries = build_operator_entries(&scraped, "https://docs.example", &SnippetConfig::default());
    assert_eq!(entries.len(), 1);

    let entry = &entries[0];
    assert_eq!(entry.value, "$eq");
    assert_eq!(entry.meta.as_str(), "query:comparison");
    assert_eq!(entry.link.as_deref(), Some("https://docs.example/query/eq"));
}
