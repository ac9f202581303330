//! GitHub release lookup and asset selection.

use crate::http::HttpError;
use crate::platform::{PlatformKind, Registry};
use crate::reference::{ParsedReference, UrlError};
use crate::walker::ListingSource;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub browser_download_url: String,
}

/// Releases endpoint for the latest release, or for `version` when given.
pub fn release_url(
    reference: &ParsedReference,
    registry: &Registry,
    version: Option<&str>,
) -> Result<String, UrlError> {
    let unsupported = UrlError::UnsupportedPlatform(reference.platform.display_name());
    if reference.platform != PlatformKind::Github {
        return Err(unsupported);
    }
    let base = registry
        .api_base(PlatformKind::Github, &reference.domain)
        .ok_or(unsupported)?;

    Ok(match version {
        Some(tag) => format!(
            "{}/repos/{}/{}/releases/tags/{}",
            base, reference.owner, reference.repo, tag
        ),
        None => format!("{}/repos/{}/{}/releases/latest", base, reference.owner, reference.repo),
    })
}

pub fn fetch_release<S: ListingSource + ?Sized>(source: &S, url: &str) -> Result<Release, HttpError> {
    let value = source.fetch_json(url)?;
    serde_json::from_value(value).map_err(|e| HttpError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Case-insensitive substring match on the asset name.
pub fn filter_assets(assets: Vec<Asset>, filter: Option<&str>) -> Vec<Asset> {
    match filter {
        Some(filter) => {
            let needle = filter.to_lowercase();
            assets
                .into_iter()
                .filter(|a| a.name.to_lowercase().contains(&needle))
                .collect()
        }
        None => assets,
    }
}
