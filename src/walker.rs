//! Bounded recursive listing of a repository subtree.
//!
//! Directories are fetched one at a time. A directory whose listing cannot be
//! fetched contributes nothing and is recorded as a failed outcome; the walk
//! itself only fails up front, when the platform has no listing API.

use crate::glob::GlobFilter;
use crate::http::{HttpClient, HttpError};
use crate::platform::{ListingStyle, Registry};
use crate::reference::{ParsedReference, UrlError, TREE_PAGE_SIZE};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Anything that can GET a JSON document. Implemented by [`HttpClient`].
pub trait ListingSource {
    fn fetch_json(&self, url: &str) -> Result<Value, HttpError>;
}

impl ListingSource for HttpClient {
    fn fetch_json(&self, url: &str) -> Result<Value, HttpError> {
        HttpClient::fetch_json(self, url)
    }
}

/// A file found by the walk, ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path from the repository root.
    pub relative_path: String,
    pub download_url: String,
}

/// Checked before every directory fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub max_depth: usize,
    /// Applied to the complete listing after traversal.
    pub filter: Option<GlobFilter>,
    pub cancel: CancelToken,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            filter: None,
            cancel: CancelToken::default(),
        }
    }
}

/// Result of fetching one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirOutcome {
    Listed {
        path: String,
        files: usize,
        directories: usize,
    },
    Failed {
        path: String,
        reason: String,
    },
}

#[derive(Debug, Default)]
pub struct WalkReport {
    pub files: Vec<FileEntry>,
    /// One entry per directory visited, root first.
    pub outcomes: Vec<DirOutcome>,
    pub cancelled: bool,
}

impl WalkReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            DirOutcome::Failed { path, reason } => Some((path.as_str(), reason.as_str())),
            DirOutcome::Listed { .. } => None,
        })
    }

    pub fn root_failed(&self) -> bool {
        matches!(self.outcomes.first(), Some(DirOutcome::Failed { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
    Other,
}

#[derive(Debug)]
struct ListingEntry {
    kind: EntryKind,
    path: String,
    download_url: Option<String>,
}

struct ListingPage {
    entries: Vec<ListingEntry>,
    next: Option<String>,
    /// Items in the response before empty paths were dropped.
    item_count: usize,
}

#[derive(Deserialize)]
struct ContentsItem {
    #[serde(rename = "type")]
    item_type: String,
    path: String,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct TreeItem {
    #[serde(rename = "type")]
    item_type: String,
    path: String,
}

#[derive(Deserialize)]
struct SrcPage {
    #[serde(default)]
    values: Vec<TreeItem>,
    #[serde(default)]
    next: Option<String>,
}

fn decode_listing(style: ListingStyle, value: Value) -> Result<ListingPage, String> {
    let not_a_directory = |e: serde_json::Error| format!("expected a directory listing: {}", e);

    let (entries, next): (Vec<ListingEntry>, Option<String>) = match style {
        ListingStyle::Contents => {
            let items: Vec<ContentsItem> = serde_json::from_value(value).map_err(not_a_directory)?;
            let entries = items
                .into_iter()
                .map(|item| ListingEntry {
                    kind: match item.item_type.as_str() {
                        "file" => EntryKind::File,
                        "dir" => EntryKind::Directory,
                        _ => EntryKind::Other,
                    },
                    path: item.path,
                    download_url: item.download_url,
                })
                .collect();
            (entries, None)
        }
        ListingStyle::Tree => {
            let items: Vec<TreeItem> = serde_json::from_value(value).map_err(not_a_directory)?;
            let entries = items
                .into_iter()
                .map(|item| ListingEntry {
                    kind: match item.item_type.as_str() {
                        "blob" => EntryKind::File,
                        "tree" => EntryKind::Directory,
                        _ => EntryKind::Other,
                    },
                    path: item.path,
                    download_url: None,
                })
                .collect();
            (entries, None)
        }
        ListingStyle::Src => {
            let page: SrcPage = serde_json::from_value(value).map_err(not_a_directory)?;
            let entries = page
                .values
                .into_iter()
                .map(|item| ListingEntry {
                    kind: match item.item_type.as_str() {
                        "commit_file" => EntryKind::File,
                        "commit_directory" => EntryKind::Directory,
                        _ => EntryKind::Other,
                    },
                    path: item.path,
                    download_url: None,
                })
                .collect();
            (entries, page.next)
        }
    };

    let item_count = entries.len();
    let entries = entries
        .into_iter()
        .filter(|e| !e.path.trim_matches('/').is_empty())
        .collect();
    Ok(ListingPage {
        entries,
        next,
        item_count,
    })
}

enum ListError {
    Cancelled,
    Failed(String),
}

pub struct Walker<'a, S: ListingSource + ?Sized> {
    source: &'a S,
    registry: &'a Registry,
}

impl<'a, S: ListingSource + ?Sized> Walker<'a, S> {
    pub fn new(source: &'a S, registry: &'a Registry) -> Self {
        Self { source, registry }
    }

    /// List every file under `reference.path` (or the repository root) down
    /// to `options.max_depth` directory levels.
    pub fn list_files(
        &self,
        reference: &ParsedReference,
        options: &WalkOptions,
    ) -> Result<WalkReport, UrlError> {
        let listing = self
            .registry
            .listing_api(reference.platform, &reference.domain)
            .ok_or(UrlError::UnsupportedPlatform(reference.platform.display_name()))?;

        info!(
            repo = %reference.repo_path(),
            git_ref = %reference.git_ref,
            root = reference.path.as_deref().unwrap_or(""),
            max_depth = options.max_depth,
            "Walking directory"
        );

        let mut report = WalkReport::default();
        let root = reference.path.clone().unwrap_or_default();
        self.walk(reference, listing.style, &root, 0, options, &mut report);

        if let Some(filter) = &options.filter {
            report.files = filter.apply(std::mem::take(&mut report.files));
        }

        debug!(
            files = report.files.len(),
            directories = report.outcomes.len(),
            failed = report.failures().count(),
            "Walk finished"
        );
        Ok(report)
    }

    fn walk(
        &self,
        reference: &ParsedReference,
        style: ListingStyle,
        dir: &str,
        depth: usize,
        options: &WalkOptions,
        report: &mut WalkReport,
    ) {
        let entries = match self.list_directory(reference, style, dir, &options.cancel) {
            Ok(entries) => entries,
            Err(ListError::Cancelled) => {
                report.cancelled = true;
                return;
            }
            Err(ListError::Failed(reason)) => {
                warn!(path = dir, %reason, "Skipping directory");
                report.outcomes.push(DirOutcome::Failed {
                    path: dir.to_string(),
                    reason,
                });
                return;
            }
        };

        let mut files = 0;
        let mut subdirectories = Vec::new();
        for entry in entries {
            match entry.kind {
                EntryKind::File => {
                    let download_url = match entry.download_url {
                        Some(url) => url,
                        None => match reference.with_path(&entry.path, false).raw_url() {
                            Ok(url) => url,
                            Err(_) => continue,
                        },
                    };
                    report.files.push(FileEntry {
                        relative_path: entry.path.trim_matches('/').to_string(),
                        download_url,
                    });
                    files += 1;
                }
                EntryKind::Directory if depth < options.max_depth => {
                    subdirectories.push(entry.path);
                }
                EntryKind::Directory | EntryKind::Other => {}
            }
        }

        report.outcomes.push(DirOutcome::Listed {
            path: dir.to_string(),
            files,
            directories: subdirectories.len(),
        });

        for subdirectory in subdirectories {
            self.walk(reference, style, &subdirectory, depth + 1, options, report);
        }
    }

    /// Fetch every page of one directory's listing. Bitbucket pages link to
    /// the next one; GitLab pages are numbered and end with a short page.
    fn list_directory(
        &self,
        reference: &ParsedReference,
        style: ListingStyle,
        dir: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<ListingEntry>, ListError> {
        let first = reference
            .api_url_for(self.registry, Some(dir))
            .map_err(|e| ListError::Failed(e.to_string()))?;
        let mut url = first.clone();
        let mut visited = HashSet::new();
        let mut page_number = 1;
        let mut entries = Vec::new();

        loop {
            visited.insert(url.clone());

            if cancel.is_cancelled() {
                return Err(ListError::Cancelled);
            }

            let value = self
                .source
                .fetch_json(&url)
                .map_err(|e| ListError::Failed(e.to_string()))?;
            let page = decode_listing(style, value).map_err(ListError::Failed)?;
            entries.extend(page.entries);

            let next = match style {
                ListingStyle::Tree if page.item_count >= TREE_PAGE_SIZE => {
                    page_number += 1;
                    Some(format!("{}&page={}", first, page_number))
                }
                _ => page.next,
            };
            match next {
                Some(next) if !visited.contains(&next) => url = next,
                Some(next) => {
                    debug!(url = %next, "Listing page already fetched, stopping");
                    break;
                }
                None => break,
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformKind;
    use crate::reference::parse;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory listing API keyed by URL; unknown URLs return 404.
    #[derive(Default)]
    struct FakeSource {
        responses: HashMap<String, Value>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn insert(&mut self, url: String, value: Value) {
            self.responses.insert(url, value);
        }
    }

    impl ListingSource for FakeSource {
        fn fetch_json(&self, url: &str) -> Result<Value, HttpError> {
            self.requests.borrow_mut().push(url.to_string());
            self.responses.get(url).cloned().ok_or_else(|| HttpError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn github_root(registry: &Registry) -> ParsedReference {
        parse("https://github.com/acme/widgets", registry).unwrap()
    }

    fn file(path: &str) -> Value {
        json!({
            "type": "file",
            "path": path,
            "download_url": format!("https://raw.githubusercontent.com/acme/widgets/main/{}", path),
        })
    }

    fn dir(path: &str) -> Value {
        json!({ "type": "dir", "path": path, "download_url": null })
    }

    fn listing_url(reference: &ParsedReference, registry: &Registry, path: &str) -> String {
        reference.api_url_for(registry, Some(path)).unwrap()
    }

    fn sorted_paths(report: &WalkReport) -> Vec<String> {
        let mut paths: Vec<String> = report.files.iter().map(|f| f.relative_path.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_depth_bound() {
        let registry = Registry::new();
        let reference = github_root(&registry);
        let mut source = FakeSource::default();

        // Level 0 is the root; level n lives at d1/d2/.../dn.
        let mut dir_path = String::new();
        for level in 0..=12 {
            let prefix = if dir_path.is_empty() {
                String::new()
            } else {
                format!("{}/", dir_path)
            };
            let mut entries = vec![file(&format!("{}file{}.txt", prefix, level))];
            let child = format!("{}d{}", prefix, level + 1);
            if level < 12 {
                entries.push(dir(&child));
            }
            source.insert(listing_url(&reference, &registry, &dir_path), Value::Array(entries));
            dir_path = child;
        }

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();

        assert_eq!(report.files.len(), 11);
        for level in 0..=10 {
            let name = format!("file{}.txt", level);
            assert!(report.files.iter().any(|f| f.relative_path.ends_with(&name)));
        }
        assert!(!report.files.iter().any(|f| f.relative_path.ends_with("file11.txt")));
        assert!(!report.files.iter().any(|f| f.relative_path.ends_with("file12.txt")));
        assert_eq!(source.requests.borrow().len(), 11);
    }

    #[test]
    fn test_subdirectory_failure_is_tolerated() {
        let registry = Registry::new();
        let reference = github_root(&registry);
        let mut source = FakeSource::default();

        let names = ["a", "b", "c", "d", "e"];
        source.insert(
            listing_url(&reference, &registry, ""),
            Value::Array(names.iter().map(|n| dir(n)).collect()),
        );
        for name in names.iter().filter(|n| **n != "c") {
            source.insert(
                listing_url(&reference, &registry, name),
                json!([file(&format!("{}/one.txt", name)), file(&format!("{}/two.txt", name))]),
            );
        }

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();

        assert_eq!(report.files.len(), 8);
        assert!(!report.files.iter().any(|f| f.relative_path.starts_with("c/")));
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "c");
        assert!(!report.root_failed());
    }

    #[test]
    fn test_root_failure_yields_empty_report() {
        let registry = Registry::new();
        let reference = github_root(&registry);
        let source = FakeSource::default();

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();

        assert!(report.files.is_empty());
        assert!(report.root_failed());
    }

    #[test]
    fn test_file_response_is_not_a_listing() {
        let registry = Registry::new();
        let reference = parse("https://github.com/acme/widgets/blob/main/README.md", &registry).unwrap();
        let mut source = FakeSource::default();
        source.insert(listing_url(&reference, &registry, "README.md"), file("README.md"));

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();
        assert!(report.files.is_empty());
        assert!(report.root_failed());
    }

    #[test]
    fn test_unsupported_platform_is_refused_before_fetching() {
        let registry = Registry::new();
        let reference = parse("https://git.example.com/acme/widgets", &registry).unwrap();
        let source = FakeSource::default();

        let result = Walker::new(&source, &registry).list_files(&reference, &WalkOptions::default());
        assert!(matches!(result, Err(UrlError::UnsupportedPlatform(_))));
        assert!(source.requests.borrow().is_empty());
    }

    #[test]
    fn test_filter_applies_after_traversal() {
        let registry = Registry::new();
        let reference = github_root(&registry);
        let mut source = FakeSource::default();
        source.insert(
            listing_url(&reference, &registry, ""),
            json!([file("README.md"), dir("src"), dir("docs")]),
        );
        source.insert(listing_url(&reference, &registry, "src"), json!([file("src/a.ts"), file("src/b.md")]));
        source.insert(listing_url(&reference, &registry, "docs"), json!([file("docs/c.md")]));

        let options = WalkOptions {
            filter: Some(GlobFilter::new("**/*.md", Some("docs/**"))),
            ..WalkOptions::default()
        };
        let report = Walker::new(&source, &registry).list_files(&reference, &options).unwrap();

        assert_eq!(sorted_paths(&report), vec!["README.md", "src/b.md"]);
    }

    #[test]
    fn test_gitlab_tree_synthesizes_raw_urls() {
        let registry = Registry::new();
        let reference = parse("https://gitlab.com/acme/widgets/-/tree/main/docs", &registry).unwrap();
        let mut source = FakeSource::default();
        source.insert(
            listing_url(&reference, &registry, "docs"),
            json!([
                { "id": "1", "name": "a.md", "type": "blob", "path": "docs/a.md", "mode": "100644" },
                { "id": "2", "name": "img", "type": "tree", "path": "docs/img", "mode": "040000" }
            ]),
        );
        source.insert(
            listing_url(&reference, &registry, "docs/img"),
            json!([{ "id": "3", "name": "x.png", "type": "blob", "path": "docs/img/x.png", "mode": "100644" }]),
        );

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();

        assert_eq!(sorted_paths(&report), vec!["docs/a.md", "docs/img/x.png"]);
        let a = report.files.iter().find(|f| f.relative_path == "docs/a.md").unwrap();
        assert_eq!(a.download_url, "https://gitlab.com/acme/widgets/-/raw/main/docs/a.md");
    }

    #[test]
    fn test_bitbucket_pages_are_followed() {
        let registry = Registry::new();
        let reference = parse("https://bitbucket.org/acme/widgets", &registry).unwrap();
        assert_eq!(reference.platform, PlatformKind::Bitbucket);

        let first = listing_url(&reference, &registry, "");
        let second = format!("{}?page=2", first);
        let mut source = FakeSource::default();
        source.insert(
            first,
            json!({ "values": [{ "type": "commit_file", "path": "a.txt" }], "next": second }),
        );
        source.insert(
            second,
            json!({ "values": [{ "type": "commit_file", "path": "b.txt" }] }),
        );

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();
        assert_eq!(sorted_paths(&report), vec!["a.txt", "b.txt"]);
        assert_eq!(
            report.files[0].download_url,
            "https://bitbucket.org/acme/widgets/raw/main/a.txt"
        );
    }

    #[test]
    fn test_bitbucket_page_cycle_terminates() {
        let registry = Registry::new();
        let reference = parse("https://bitbucket.org/acme/widgets", &registry).unwrap();

        let first = listing_url(&reference, &registry, "");
        let second = format!("{}?page=2", first);
        let mut source = FakeSource::default();
        source.insert(
            first.clone(),
            json!({ "values": [{ "type": "commit_file", "path": "a.txt" }], "next": second }),
        );
        source.insert(
            second.clone(),
            json!({ "values": [{ "type": "commit_file", "path": "b.txt" }], "next": first }),
        );

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();
        assert_eq!(sorted_paths(&report), vec!["a.txt", "b.txt"]);
        assert_eq!(*source.requests.borrow(), vec![first, second]);
    }

    #[test]
    fn test_gitlab_tree_pages_until_short_page() {
        let registry = Registry::new();
        let reference = parse("https://gitlab.com/acme/widgets", &registry).unwrap();

        let first = listing_url(&reference, &registry, "");
        assert_eq!(
            first,
            "https://gitlab.com/api/v4/projects/acme%2Fwidgets/repository/tree?path=&ref=main&per_page=100"
        );
        let full_page: Vec<Value> = (0..100)
            .map(|i| json!({ "type": "blob", "path": format!("f{:03}.txt", i) }))
            .collect();
        let mut source = FakeSource::default();
        source.insert(first.clone(), Value::Array(full_page));
        source.insert(
            format!("{}&page=2", first),
            json!([{ "type": "blob", "path": "f100.txt" }]),
        );

        let report = Walker::new(&source, &registry)
            .list_files(&reference, &WalkOptions::default())
            .unwrap();
        assert_eq!(report.files.len(), 101);
        assert!(report.files.iter().any(|f| f.relative_path == "f100.txt"));
        assert_eq!(source.requests.borrow().len(), 2);
    }

    #[test]
    fn test_cancelled_walk_issues_no_requests() {
        let registry = Registry::new();
        let reference = github_root(&registry);
        let source = FakeSource::default();
        let options = WalkOptions::default();
        options.cancel.cancel();

        let report = Walker::new(&source, &registry).list_files(&reference, &options).unwrap();
        assert!(report.cancelled);
        assert!(report.files.is_empty());
        assert!(source.requests.borrow().is_empty());
    }
}
