//! `dl`, `dl-dir` and `dl-release` flows.

use super::release::{self, Asset};
use super::{
    filename_from_url, format_size, parse_file_list, resolve_output_path, DownloadError,
    DownloadJob, DownloadPolicy, Downloader,
};
use crate::cli::{DownloadArgs, ReleaseArgs};
use crate::config::DownloadSettings;
use crate::glob::GlobFilter;
use crate::http::{parse_header, HttpClient, HttpSettings};
use crate::platform::{PlatformKind, Registry};
use crate::reference::{self, ParsedReference, RefKind, UrlError};
use crate::walker::{CancelToken, FileEntry, WalkOptions, WalkReport, Walker};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::ProgressBar;
use inquire::{Confirm, MultiSelect};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Depth used for pattern downloads when `--depth` is not given.
const PATTERN_DEPTH: usize = 999;

/// How a `dl` input resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Git(ParsedReference),
    Generic(String),
}

fn http_settings(
    settings: &DownloadSettings,
    user_agent: Option<&str>,
    headers: &[String],
    follow_redirects: bool,
) -> Result<HttpSettings> {
    let headers = headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HttpSettings {
        user_agent: user_agent.unwrap_or(&settings.user_agent).to_string(),
        timeout: Duration::from_secs(settings.timeout_secs),
        follow_redirects,
        headers,
    })
}

fn client_for(args: &DownloadArgs, settings: &DownloadSettings) -> Result<HttpClient> {
    let http = http_settings(
        settings,
        args.user_agent.as_deref(),
        &args.headers,
        !args.no_redirect,
    )?;
    Ok(HttpClient::new(&http)?)
}

fn policy_for(settings: &DownloadSettings, overwrite: bool) -> DownloadPolicy {
    DownloadPolicy {
        retries: settings.retries,
        overwrite,
        concurrency: settings.concurrency,
        ..DownloadPolicy::default()
    }
}

fn confirm(message: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new(message).with_default(true).prompt()?)
}

fn section(title: &str) {
    println!();
    println!("{}", title.bold());
}

/// Parse a Git reference and apply any ref override, or fall back to a plain URL.
fn resolve_target(input: &str, git_ref: Option<(&str, RefKind)>, registry: &Registry) -> Target {
    let parsed = match reference::parse(input, registry) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(input, error = %e, "Not a Git reference, using generic download");
            return Target::Generic(input.to_string());
        }
    };

    // Unknown hosts and repository-level URLs that carry more than owner/repo
    // (release assets, archives) are fetched as-is.
    let generic = parsed.platform == PlatformKind::Other
        || (parsed.path.is_none() && !is_repository_page(input, &parsed));
    if generic {
        return Target::Generic(input.to_string());
    }

    Target::Git(match git_ref {
        Some((git_ref, kind)) => parsed.with_ref(git_ref, kind),
        None => parsed,
    })
}

/// Whether a URL that parsed without a file path points at the repository
/// itself rather than something below it like a release asset.
fn is_repository_page(input: &str, parsed: &ParsedReference) -> bool {
    let Some(segments) = Url::parse(input).ok().and_then(|u| {
        u.path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).map(str::to_string).collect::<Vec<_>>())
    }) else {
        // SSH remotes and scheme-less forms
        return true;
    };

    let repo_depth = parsed.repo_path().split('/').count();
    match segments.get(repo_depth..) {
        Some([]) | None => true,
        Some([first, ..]) => matches!(first.as_str(), "tree" | "src" | "-"),
    }
}

/// Parse a repository reference, also accepting bare `owner/repo`.
fn parse_repository(input: &str, registry: &Registry) -> Result<ParsedReference, UrlError> {
    reference::parse(input, registry).or_else(|e| {
        let is_owner_repo = input.split('/').filter(|s| !s.is_empty()).count() == 2
            && !input.contains(':')
            && !input.contains('.');
        if is_owner_repo {
            reference::parse(&format!("github.com/{}", input.trim_matches('/')), registry)
        } else {
            Err(e)
        }
    })
}

fn output_dir(args: &DownloadArgs) -> PathBuf {
    args.dir.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// Destination of a single file download.
fn single_destination(args: &DownloadArgs, filename: &str, repo_path: Option<&str>) -> Result<PathBuf> {
    let base = output_dir(args);

    if let Some(output) = &args.output {
        return Ok(base.join(output));
    }
    match repo_path {
        Some(path) if args.preserve_path => Ok(resolve_output_path(&base, path)?),
        _ => Ok(resolve_output_path(&base, filename)?),
    }
}

/// Jobs for walked files under `base`; unsafe paths are reported and skipped.
fn jobs_for(files: &[FileEntry], base: &Path) -> Vec<DownloadJob> {
    files
        .iter()
        .filter_map(|file| match resolve_output_path(base, &file.relative_path) {
            Ok(destination) => Some(DownloadJob::new(file.download_url.clone(), destination)),
            Err(e) => {
                eprintln!("{} {}", "Warning:".yellow().bold(), e);
                None
            }
        })
        .collect()
}

fn show_info(client: &HttpClient, url: &str) -> Result<()> {
    let info = client
        .fetch_head(url)
        .with_context(|| format!("Could not read file info for {}", url))?;

    section("File Information");
    println!("  URL:           {}", info.url.dimmed());
    println!("  Size:          {}", info.size.map(format_size).unwrap_or_else(|| "unknown".to_string()));
    if let Some(modified) = &info.last_modified {
        println!("  Last modified: {}", modified);
    }
    if let Some(content_type) = &info.content_type {
        println!("  Content type:  {}", content_type);
    }
    println!();
    Ok(())
}

/// Print the outcome of a bulk download; fails if nothing succeeded.
fn summarize(jobs: &[DownloadJob], results: &[Result<u64, DownloadError>]) -> Result<()> {
    let mut bytes = 0;
    let mut failed = Vec::new();
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(written) => bytes += written,
            Err(e) => failed.push((job, e)),
        }
    }
    let succeeded = results.len() - failed.len();

    println!();
    for (job, error) in &failed {
        println!("  {} {}: {}", "✗".red(), job.destination.display(), error);
    }

    if failed.is_empty() {
        println!(
            "{} Downloaded all {} files ({})",
            "Success:".green().bold(),
            succeeded,
            format_size(bytes)
        );
        Ok(())
    } else if succeeded > 0 {
        println!(
            "{} Downloaded {}/{} files ({})",
            "Warning:".yellow().bold(),
            succeeded,
            results.len(),
            format_size(bytes)
        );
        Ok(())
    } else {
        bail!("All {} downloads failed", results.len())
    }
}

fn report_walk(report: &WalkReport) {
    for (path, reason) in report.failures() {
        let path = if path.is_empty() { "/" } else { path };
        eprintln!("{} Could not list {}: {}", "Warning:".yellow().bold(), path, reason);
    }
    if report.cancelled {
        eprintln!("{} Listing cancelled", "Warning:".yellow().bold());
    }
}

fn walk(
    client: &HttpClient,
    registry: &Registry,
    parsed: &ParsedReference,
    options: &WalkOptions,
) -> Result<WalkReport> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Listing {}", parsed.web_url()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = Walker::new(client, registry).list_files(parsed, options);
    spinner.finish_and_clear();

    let report = result?;
    report_walk(&report);
    Ok(report)
}

/// Entry point for `dl`.
pub fn run(args: &DownloadArgs, settings: &DownloadSettings, registry: &Registry) -> Result<()> {
    let client = client_for(args, settings)?;

    if let Some(list) = &args.file_list {
        return download_file_list(list, args, settings, registry, &client);
    }

    let input = args
        .url
        .as_deref()
        .context("A URL is required unless --file-list is given")?;

    if let Some(pattern) = &args.pattern {
        let parsed = parse_repository(input, registry)?;
        let parsed = match args.git_ref() {
            Some((git_ref, kind)) => parsed.with_ref(git_ref, kind),
            None => parsed,
        };
        return download_pattern(&parsed, pattern, args, settings, registry, &client);
    }

    match resolve_target(input, args.git_ref(), registry) {
        Target::Git(parsed) if parsed.is_directory => {
            println!(
                "{} This is a directory. Use {} to download it directly.",
                "Note:".yellow().bold(),
                "forgehop dl-dir".yellow()
            );
            if confirm("Download entire directory?", args.yes)? {
                download_directory(&parsed, args, settings, registry, &client)
            } else {
                println!("Cancelled");
                Ok(())
            }
        }
        Target::Git(parsed) => download_reference(&parsed, args, settings, &client),
        Target::Generic(url) => download_generic(&url, args, settings, &client),
    }
}

/// Entry point for `dl-dir`.
pub fn run_directory(args: &DownloadArgs, settings: &DownloadSettings, registry: &Registry) -> Result<()> {
    let client = client_for(args, settings)?;
    let input = args.url.as_deref().context("A directory URL is required")?;

    let parsed = parse_repository(input, registry)
        .with_context(|| format!("Invalid URL format: {}", input))?;
    let parsed = match args.git_ref() {
        Some((git_ref, kind)) => parsed.with_ref(git_ref, kind),
        None => parsed,
    };

    if let Some(pattern) = &args.pattern {
        return download_pattern(&parsed, pattern, args, settings, registry, &client);
    }
    download_directory(&parsed, args, settings, registry, &client)
}

fn download_reference(
    parsed: &ParsedReference,
    args: &DownloadArgs,
    settings: &DownloadSettings,
    client: &HttpClient,
) -> Result<()> {
    let raw_url = parsed.raw_url().map_err(|e| match e {
        UrlError::NoFilePath { .. } => {
            anyhow::anyhow!("{}. Nothing to download; use dl-dir or --pattern for repositories", e)
        }
        other => other.into(),
    })?;
    let filename = args.output.as_deref().unwrap_or(parsed.filename());
    let destination = single_destination(args, filename, parsed.path.as_deref())?;

    if args.info {
        show_info(client, &raw_url)?;
        if !confirm("Proceed with download?", args.yes)? {
            return Ok(());
        }
    }

    section("Downloading File");
    println!("  URL:  {}", parsed.web_url().dimmed());
    println!("  File: {}", destination.display().to_string().cyan());
    println!("  Ref:  {}", parsed.git_ref);

    let written = Downloader::new(client, policy_for(settings, args.overwrite))
        .download(&DownloadJob::new(raw_url, &destination))?;

    println!(
        "{} File saved to {} ({})",
        "Success:".green().bold(),
        destination.display(),
        format_size(written)
    );
    Ok(())
}

fn download_generic(
    url: &str,
    args: &DownloadArgs,
    settings: &DownloadSettings,
    client: &HttpClient,
) -> Result<()> {
    let parsed = Url::parse(url).with_context(|| format!("Not a downloadable URL: {}", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme '{}': {}", parsed.scheme(), url);
    }

    let filename = args.output.clone().unwrap_or_else(|| filename_from_url(url));
    let destination = output_dir(args).join(&filename);

    if args.info {
        show_info(client, url)?;
        if !confirm("Proceed with download?", args.yes)? {
            return Ok(());
        }
    }

    section("Downloading");
    println!("  URL:  {}", url.dimmed());
    println!("  File: {}", destination.display().to_string().cyan());

    let written = Downloader::new(client, policy_for(settings, args.overwrite))
        .download(&DownloadJob::new(url, &destination))?;

    println!(
        "{} File saved to {} ({})",
        "Success:".green().bold(),
        destination.display(),
        format_size(written)
    );
    Ok(())
}

fn download_directory(
    parsed: &ParsedReference,
    args: &DownloadArgs,
    settings: &DownloadSettings,
    registry: &Registry,
    client: &HttpClient,
) -> Result<()> {
    section("Downloading Directory");
    println!("  Repository: {}", parsed.repo_path().cyan());
    println!("  Ref:        {}", parsed.git_ref.cyan());
    println!("  Path:       {}", parsed.path.as_deref().unwrap_or("/").cyan());

    let options = WalkOptions {
        max_depth: args.depth.unwrap_or(settings.max_depth),
        filter: None,
        cancel: CancelToken::default(),
    };
    let report = walk(client, registry, parsed, &options)?;

    if report.root_failed() {
        bail!("Could not list {}", parsed.web_url());
    }
    if report.files.is_empty() {
        println!("{} No files found in directory", "Warning:".yellow().bold());
        return Ok(());
    }
    fetch_listed(&report.files, parsed, args, settings, client)
}

fn download_pattern(
    parsed: &ParsedReference,
    pattern: &str,
    args: &DownloadArgs,
    settings: &DownloadSettings,
    registry: &Registry,
    client: &HttpClient,
) -> Result<()> {
    section("Downloading Files with Pattern");
    println!("  Repository: {}", parsed.repo_path().cyan());
    println!("  Pattern:    {}", pattern.cyan());
    if let Some(exclude) = &args.exclude {
        println!("  Exclude:    {}", exclude.cyan());
    }

    let options = WalkOptions {
        max_depth: args.depth.unwrap_or(PATTERN_DEPTH),
        filter: Some(GlobFilter::new(pattern, args.exclude.as_deref())),
        cancel: CancelToken::default(),
    };
    let report = walk(client, registry, parsed, &options)?;

    if report.files.is_empty() {
        println!(
            "{} No files found matching pattern: {}",
            "Warning:".yellow().bold(),
            pattern
        );
        return Ok(());
    }
    fetch_listed(&report.files, parsed, args, settings, client)
}

fn fetch_listed(
    files: &[FileEntry],
    parsed: &ParsedReference,
    args: &DownloadArgs,
    settings: &DownloadSettings,
    client: &HttpClient,
) -> Result<()> {
    println!();
    println!("Found {} files", files.len().to_string().cyan());

    if !confirm(&format!("Download {} files?", files.len()), args.yes)? {
        println!("Cancelled");
        return Ok(());
    }

    let base = args.dir.clone().unwrap_or_else(|| PathBuf::from(&parsed.repo));
    let jobs = jobs_for(files, &base);
    let results = Downloader::new(client, policy_for(settings, args.overwrite)).download_all(&jobs);
    summarize(&jobs, &results)
}

/// Turn each listed URL into a download job, Git references through their raw URL.
fn file_list_jobs(urls: &[String], args: &DownloadArgs, registry: &Registry) -> Vec<DownloadJob> {
    let base = output_dir(args);

    urls.iter()
        .filter_map(|input| {
            let (url, filename) = match resolve_target(input, args.git_ref(), registry) {
                Target::Git(parsed) => match parsed.raw_url() {
                    Ok(raw) => (raw, parsed.filename().to_string()),
                    Err(e) => {
                        warn!(input = %input, error = %e, "Skipping list entry");
                        eprintln!("{} Skipping {}: {}", "Warning:".yellow().bold(), input, e);
                        return None;
                    }
                },
                Target::Generic(url) => {
                    let filename = filename_from_url(&url);
                    (url, filename)
                }
            };
            Some(DownloadJob::new(url, base.join(filename)))
        })
        .collect()
}

fn download_file_list(
    list: &Path,
    args: &DownloadArgs,
    settings: &DownloadSettings,
    registry: &Registry,
    client: &HttpClient,
) -> Result<()> {
    let content = fs::read_to_string(list)
        .with_context(|| format!("File list not found: {}", list.display()))?;
    let urls = parse_file_list(&content);
    if urls.is_empty() {
        bail!("No URLs found in file list: {}", list.display());
    }

    section(&format!("Downloading {} Files", urls.len()));
    let jobs = file_list_jobs(&urls, args, registry);
    if jobs.is_empty() {
        bail!("No valid URLs to download");
    }

    let results = Downloader::new(client, policy_for(settings, args.overwrite)).download_all(&jobs);
    summarize(&jobs, &results)
}

fn asset_label(asset: &Asset) -> String {
    format!("{} ({})", asset.name, format_size(asset.size))
}

/// Entry point for `dl-release`.
pub fn run_release(args: &ReleaseArgs, settings: &DownloadSettings, registry: &Registry) -> Result<()> {
    let client = HttpClient::new(&http_settings(settings, None, &[], true)?)?;
    let parsed = parse_repository(&args.repo, registry)
        .with_context(|| format!("Invalid repository: {}", args.repo))?;

    let url = release::release_url(&parsed, registry, args.version.as_deref())?;
    let found = release::fetch_release(&client, &url).with_context(|| match &args.version {
        Some(version) => format!("Release {} not found for {}", version, parsed.repo_path()),
        None => format!("No releases found for {}", parsed.repo_path()),
    })?;

    section(&format!(
        "Release {}{}",
        found.tag_name.cyan(),
        found
            .name
            .as_deref()
            .filter(|n| !n.is_empty() && *n != found.tag_name)
            .map(|n| format!(" - {}", n))
            .unwrap_or_default()
    ));

    if found.assets.is_empty() {
        println!("{} No assets found in this release", "Warning:".yellow().bold());
        return Ok(());
    }

    let assets = release::filter_assets(found.assets, args.asset.as_deref());
    if assets.is_empty() {
        println!(
            "{} No assets found matching: {}",
            "Warning:".yellow().bold(),
            args.asset.as_deref().unwrap_or_default()
        );
        return Ok(());
    }

    println!("Available assets ({}):", assets.len());
    for asset in &assets {
        println!("  • {}", asset_label(asset));
    }
    println!();

    let selected: Vec<Asset> = if args.yes {
        assets
    } else {
        let labels: Vec<String> = assets.iter().map(asset_label).collect();
        let chosen = MultiSelect::new("Select assets to download:", labels.clone())
            .with_help_message("Space to select, Enter to confirm")
            .prompt()?;
        assets
            .into_iter()
            .zip(labels)
            .filter(|(_, label)| chosen.contains(label))
            .map(|(asset, _)| asset)
            .collect()
    };

    if selected.is_empty() {
        println!("No assets selected");
        return Ok(());
    }

    let base = args.dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let jobs: Vec<DownloadJob> = selected
        .iter()
        .map(|asset| {
            resolve_output_path(&base, &asset.name)
                .map(|dest| DownloadJob::new(asset.browser_download_url.clone(), dest))
        })
        .collect::<Result<_, _>>()?;

    let results = Downloader::new(&client, policy_for(settings, args.overwrite)).download_all(&jobs);
    summarize(&jobs, &results)
}
