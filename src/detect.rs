use crate::config::Config;
use crate::git::{self, RemoteUrl};
use crate::platform::{normalize_host, PlatformKind, Registry};
use crate::profile::Profile;
use anyhow::Result;

/// Detection result with scoring
#[derive(Debug)]
pub struct DetectionResult {
    pub profile_name: String,
    pub score: u32,
    pub reason: String,
}

/// Best profile for a set of remote URLs; the highest score wins, first on ties.
pub fn best_match(
    remotes: &[RemoteUrl],
    config: &Config,
    registry: &Registry,
) -> Option<DetectionResult> {
    let mut best: Option<DetectionResult> = None;

    for remote_url in remotes {
        for name in config.profile_names() {
            let Some(profile) = config.get_profile(name) else {
                continue;
            };
            let score = score_profile(remote_url, name, profile, registry);
            if score > 0 && best.as_ref().map_or(true, |m| score > m.score) {
                best = Some(DetectionResult {
                    profile_name: name.clone(),
                    score,
                    reason: format_match_reason(remote_url, name, profile, registry),
                });
            }
        }
    }

    best
}

/// Detect the best matching profile for the current repository
pub fn detect_profile(config: &Config, registry: &Registry) -> Result<Option<DetectionResult>> {
    let mut remotes = Vec::new();
    for remote in git::list_remotes()? {
        if let Some(url) = git::get_remote_url(&remote)?.as_deref().and_then(RemoteUrl::parse) {
            remotes.push(url);
        }
    }

    Ok(best_match(&remotes, config, registry))
}

/// Score how well a profile matches a remote URL
fn score_profile(remote_url: &RemoteUrl, profile_name: &str, profile: &Profile, registry: &Registry) -> u32 {
    let mut score = 0u32;
    let remote_host = normalize_host(&remote_url.host);

    if remote_host == profile.ssh_host_alias(profile_name) {
        score += 100;
    }

    if remote_host == normalize_host(profile.default_host()) {
        score += 50;
    }

    let remote_kind = registry.classify(&remote_host);
    if remote_kind != PlatformKind::Other && remote_kind == profile.platform.kind {
        score += 20;
    }

    if let Some(domain) = profile.platform.domain.as_deref() {
        let domain = normalize_host(domain);
        if remote_host == domain || remote_host.ends_with(&format!(".{}", domain)) {
            score += 80;
        }
    }

    score
}

/// Format a human-readable reason for the match
fn format_match_reason(remote_url: &RemoteUrl, profile_name: &str, profile: &Profile, registry: &Registry) -> String {
    let host = &remote_url.host;

    if *host == profile.ssh_host_alias(profile_name) {
        format!("Remote uses SSH alias '{}'", host)
    } else if normalize_host(host) == normalize_host(profile.default_host()) {
        format!("Remote host '{}' matches profile host", host)
    } else if registry.classify(host) == profile.platform.kind {
        format!("{} repository detected ({})", profile.platform.kind.display_name(), host)
    } else {
        format!("Host '{}' matched", host)
    }
}

/// Detect profile and return matching information
pub fn detect_and_suggest(config: &Config, registry: &Registry) -> Result<Option<(String, String)>> {
    Ok(detect_profile(config, registry)?.map(|result| (result.profile_name, result.reason)))
}
