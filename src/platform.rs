use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Git hosting platforms known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    Github,
    Gitlab,
    Bitbucket,
    Gitea,
    Other,
}

/// Classification order; first match wins and anything unmatched is `Other`.
const DETECTION_ORDER: [PlatformKind; 4] = [
    PlatformKind::Github,
    PlatformKind::Gitlab,
    PlatformKind::Bitbucket,
    PlatformKind::Gitea,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Invalid platform: {0}. Must be one of github, gitlab, bitbucket, gitea, other")]
    InvalidPlatform(String),
    #[error("A domain is required for custom ('other') platforms")]
    MissingDomain,
}

/// Host pattern matched against a lowercased, port-less hostname.
#[derive(Debug, Clone, Copy)]
enum HostPattern {
    Exact(&'static str),
    Subdomain(&'static str),
    Contains(&'static str),
}

impl HostPattern {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(name) => host == *name,
            HostPattern::Subdomain(name) => host
                .strip_suffix(name)
                .is_some_and(|prefix| prefix.ends_with('.')),
            HostPattern::Contains(fragment) => host.contains(fragment),
        }
    }
}

/// Shape of the directory-listing API a platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStyle {
    /// GitHub-style `repos/{owner}/{repo}/contents/{path}` (also Gitea).
    Contents,
    /// GitLab `projects/{id}/repository/tree`.
    Tree,
    /// Bitbucket Cloud `repositories/{owner}/{repo}/src/{ref}/{path}`.
    Src,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingApi {
    pub style: ListingStyle,
    pub base: String,
}

impl PlatformKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::Github => "GitHub",
            PlatformKind::Gitlab => "GitLab",
            PlatformKind::Bitbucket => "Bitbucket",
            PlatformKind::Gitea => "Gitea",
            PlatformKind::Other => "Other",
        }
    }

    /// `None` for `Other`, which has no default instance.
    pub fn default_domain(&self) -> Option<&'static str> {
        match self {
            PlatformKind::Github => Some("github.com"),
            PlatformKind::Gitlab => Some("gitlab.com"),
            PlatformKind::Bitbucket => Some("bitbucket.org"),
            PlatformKind::Gitea => Some("gitea.com"),
            PlatformKind::Other => None,
        }
    }

    fn host_patterns(&self) -> &'static [HostPattern] {
        match self {
            PlatformKind::Github => &[
                HostPattern::Exact("github.com"),
                HostPattern::Subdomain("github.com"),
            ],
            PlatformKind::Gitlab => &[
                HostPattern::Exact("gitlab.com"),
                HostPattern::Subdomain("gitlab.com"),
                HostPattern::Contains("gitlab"),
            ],
            PlatformKind::Bitbucket => &[
                HostPattern::Exact("bitbucket.org"),
                HostPattern::Subdomain("bitbucket.org"),
                HostPattern::Contains("bitbucket"),
            ],
            PlatformKind::Gitea => &[
                HostPattern::Exact("gitea.com"),
                HostPattern::Subdomain("gitea.com"),
                HostPattern::Exact("codeberg.org"),
                HostPattern::Contains("gitea"),
            ],
            PlatformKind::Other => &[],
        }
    }

    fn ssh_success_source(&self) -> &'static str {
        match self {
            PlatformKind::Github => r"(?i)successfully authenticated",
            PlatformKind::Gitlab => r"(?i)welcome to gitlab",
            PlatformKind::Bitbucket => r"(?i)authenticated via|logged in as",
            PlatformKind::Gitea => r"(?i)hi there|successfully authenticated",
            PlatformKind::Other => r"(?i)authenticated|welcome|hi",
        }
    }

    /// Path segment between `{owner}/{repo}` and `{ref}` in a browsable URL.
    pub fn web_path_segment(&self, is_directory: bool) -> &'static str {
        match (self, is_directory) {
            (PlatformKind::Github, false) => "blob",
            (PlatformKind::Github, true) => "tree",
            (PlatformKind::Gitlab, false) => "-/blob",
            (PlatformKind::Gitlab, true) => "-/tree",
            (PlatformKind::Bitbucket, _) => "src",
            // Followed by the ref kind, e.g. `src/tag`.
            (PlatformKind::Gitea, _) => "src",
            (PlatformKind::Other, _) => "",
        }
    }

    /// Prefix used for SSH host aliases, e.g. `github-work`.
    pub fn alias_prefix(&self) -> &'static str {
        match self {
            PlatformKind::Github => "github",
            PlatformKind::Gitlab => "gitlab",
            PlatformKind::Bitbucket => "bitbucket",
            PlatformKind::Gitea => "gitea",
            PlatformKind::Other => "git",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformKind::Github => write!(f, "github"),
            PlatformKind::Gitlab => write!(f, "gitlab"),
            PlatformKind::Bitbucket => write!(f, "bitbucket"),
            PlatformKind::Gitea => write!(f, "gitea"),
            PlatformKind::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(PlatformKind::Github),
            "gitlab" => Ok(PlatformKind::Gitlab),
            "bitbucket" => Ok(PlatformKind::Bitbucket),
            "gitea" => Ok(PlatformKind::Gitea),
            "other" => Ok(PlatformKind::Other),
            _ => Err(PlatformError::InvalidPlatform(s.to_string())),
        }
    }
}

/// Per-account platform selection, with overrides for self-hosted instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl PlatformConfig {
    pub fn new(kind: PlatformKind, domain: Option<String>, api_url: Option<String>) -> Self {
        Self {
            kind,
            domain,
            api_url,
        }
    }

    pub fn validate(&self) -> Result<(), PlatformError> {
        let has_domain = self.domain.as_deref().is_some_and(|d| !d.trim().is_empty());
        if self.kind == PlatformKind::Other && !has_domain {
            return Err(PlatformError::MissingDomain);
        }
        Ok(())
    }

    /// Hostname used for SSH and HTTPS remotes.
    pub fn host(&self) -> &str {
        self.domain
            .as_deref()
            .or(self.kind.default_domain())
            .unwrap_or_default()
    }

    /// True when this config points somewhere other than the platform's public instance.
    pub fn is_self_hosted(&self) -> bool {
        match (&self.domain, self.kind.default_domain()) {
            (Some(domain), Some(default)) => normalize_host(domain) != default,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// A domain registered at startup, typically from an account's platform config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomHost {
    pub domain: String,
    pub kind: PlatformKind,
    pub api_url: Option<String>,
}

/// Immutable platform lookup table, built once and passed to the parser,
/// synthesizer and walker.
#[derive(Debug)]
pub struct Registry {
    custom_hosts: Vec<CustomHost>,
    ssh_patterns: Vec<(PlatformKind, Regex)>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let ssh_patterns = [
            PlatformKind::Github,
            PlatformKind::Gitlab,
            PlatformKind::Bitbucket,
            PlatformKind::Gitea,
            PlatformKind::Other,
        ]
        .into_iter()
        .map(|kind| {
            let regex = Regex::new(kind.ssh_success_source())
                .expect("built-in SSH success pattern must compile");
            (kind, regex)
        })
        .collect();

        Self {
            custom_hosts: Vec::new(),
            ssh_patterns,
        }
    }

    /// Register a self-hosted domain. Later registrations of the same domain win.
    pub fn with_host(mut self, domain: &str, kind: PlatformKind, api_url: Option<String>) -> Self {
        let domain = normalize_host(domain);
        self.custom_hosts.retain(|h| h.domain != domain);
        self.custom_hosts.push(CustomHost {
            domain,
            kind,
            api_url: api_url.map(|u| u.trim_end_matches('/').to_string()),
        });
        self
    }

    fn custom_host(&self, domain: &str) -> Option<&CustomHost> {
        let domain = normalize_host(domain);
        self.custom_hosts.iter().find(|h| h.domain == domain)
    }

    /// Classify a hostname. Registered hosts take precedence over built-in patterns.
    pub fn classify(&self, domain: &str) -> PlatformKind {
        if let Some(custom) = self.custom_host(domain) {
            return custom.kind;
        }

        let host = normalize_host(domain);
        DETECTION_ORDER
            .into_iter()
            .find(|kind| kind.host_patterns().iter().any(|p| p.matches(&host)))
            .unwrap_or(PlatformKind::Other)
    }

    /// Base URL of the platform's REST API for the given domain.
    pub fn api_base(&self, kind: PlatformKind, domain: &str) -> Option<String> {
        if let Some(api_url) = self.custom_host(domain).and_then(|h| h.api_url.clone()) {
            return Some(api_url);
        }

        let is_default = kind.default_domain() == Some(normalize_host(domain).as_str());
        match kind {
            PlatformKind::Github if is_default => Some("https://api.github.com".to_string()),
            PlatformKind::Github => Some(format!("https://{}/api/v3", domain)),
            PlatformKind::Gitlab => Some(format!("https://{}/api/v4", domain)),
            PlatformKind::Bitbucket if is_default => {
                Some("https://api.bitbucket.org/2.0".to_string())
            }
            PlatformKind::Bitbucket => None,
            PlatformKind::Gitea => Some(format!("https://{}/api/v1", domain)),
            PlatformKind::Other => None,
        }
    }

    /// Directory-listing API, if one is known for this platform and domain.
    /// Gitea listings are only enabled for domains registered with an API override.
    pub fn listing_api(&self, kind: PlatformKind, domain: &str) -> Option<ListingApi> {
        let style = match kind {
            PlatformKind::Github => ListingStyle::Contents,
            PlatformKind::Gitlab => ListingStyle::Tree,
            PlatformKind::Bitbucket => ListingStyle::Src,
            PlatformKind::Gitea => {
                self.custom_host(domain)?.api_url.as_ref()?;
                ListingStyle::Contents
            }
            PlatformKind::Other => return None,
        };

        let base = self.api_base(kind, domain)?;
        Some(ListingApi { style, base })
    }

    pub fn ssh_success_pattern(&self, kind: PlatformKind) -> &Regex {
        self.ssh_patterns
            .iter()
            .find(|(k, _)| *k == kind)
            .or_else(|| self.ssh_patterns.last())
            .map(|(_, regex)| regex)
            .expect("registry always holds a pattern for every platform")
    }

    /// Build a platform config for a remote's host, keeping the domain only
    /// when it differs from the platform default.
    pub fn detect_remote(&self, host: &str) -> PlatformConfig {
        let kind = self.classify(host);
        let host = normalize_host(host);
        let domain = match kind.default_domain() {
            Some(default) if default == host => None,
            _ => Some(host),
        };
        let api_url = domain
            .as_deref()
            .and_then(|d| self.custom_host(d))
            .and_then(|h| h.api_url.clone());
        PlatformConfig::new(kind, domain, api_url)
    }
}

/// Lowercase, drop any `:port` and a leading `www.`.
pub fn normalize_host(domain: &str) -> String {
    let host = domain.trim().to_lowercase();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host,
    };
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Build a clone/push URL for `owner/repo` on `host` (which may be an SSH alias).
pub fn build_remote_url(host: &str, repo_path: &str, use_ssh: bool) -> String {
    let repo_path = repo_path.trim_matches('/');
    let repo_path = if repo_path.ends_with(".git") {
        repo_path.to_string()
    } else {
        format!("{}.git", repo_path)
    };

    if use_ssh {
        format!("git@{}:{}", host, repo_path)
    } else {
        format!("https://{}/{}", host, repo_path)
    }
}

/// Where users register keys and tokens for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub ssh_key_url: String,
    pub token_url: String,
    pub ssh_test_command: String,
}

pub fn instructions(config: &PlatformConfig) -> Instructions {
    let host = config.host();
    let (ssh_key_url, token_url) = match config.kind {
        PlatformKind::Github => (
            format!("https://{}/settings/keys", host),
            format!("https://{}/settings/tokens", host),
        ),
        PlatformKind::Gitlab => (
            format!("https://{}/-/profile/keys", host),
            format!("https://{}/-/profile/personal_access_tokens", host),
        ),
        PlatformKind::Bitbucket => (
            format!("https://{}/account/settings/ssh-keys/", host),
            format!("https://{}/account/settings/app-passwords/", host),
        ),
        PlatformKind::Gitea => (
            format!("https://{}/user/settings/keys", host),
            format!("https://{}/user/settings/applications", host),
        ),
        PlatformKind::Other => (
            format!("https://{}/settings/ssh", host),
            format!("https://{}/settings/tokens", host),
        ),
    };

    Instructions {
        ssh_key_url,
        token_url,
        ssh_test_command: format!("ssh -T git@{}", host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!("github".parse::<PlatformKind>().unwrap(), PlatformKind::Github);
        assert_eq!("GitLab".parse::<PlatformKind>().unwrap(), PlatformKind::Gitlab);
        assert_eq!("other".parse::<PlatformKind>().unwrap(), PlatformKind::Other);
        assert!(matches!(
            "sourcehut".parse::<PlatformKind>(),
            Err(PlatformError::InvalidPlatform(_))
        ));
    }

    #[test]
    fn test_display_matches_serde_name() {
        assert_eq!(PlatformKind::Other.to_string(), "other");
        assert_eq!(PlatformKind::Bitbucket.to_string(), "bitbucket");
    }

    #[test]
    fn test_classify_builtin_hosts() {
        let registry = Registry::new();
        assert_eq!(registry.classify("github.com"), PlatformKind::Github);
        assert_eq!(registry.classify("GitHub.com"), PlatformKind::Github);
        assert_eq!(registry.classify("gist.github.com"), PlatformKind::Github);
        assert_eq!(registry.classify("gitlab.company.io"), PlatformKind::Gitlab);
        assert_eq!(registry.classify("bitbucket.org"), PlatformKind::Bitbucket);
        assert_eq!(registry.classify("codeberg.org"), PlatformKind::Gitea);
        assert_eq!(registry.classify("gitea.local:3000"), PlatformKind::Gitea);
        assert_eq!(registry.classify("example.com"), PlatformKind::Other);
        assert_eq!(registry.classify("notgithub.com"), PlatformKind::Other);
    }

    #[test]
    fn test_custom_host_overrides_patterns() {
        let registry = Registry::new().with_host("code.acme.dev", PlatformKind::Gitlab, None);
        assert_eq!(registry.classify("code.acme.dev"), PlatformKind::Gitlab);
        assert_eq!(
            registry.api_base(PlatformKind::Gitlab, "code.acme.dev").as_deref(),
            Some("https://code.acme.dev/api/v4")
        );
    }

    #[test]
    fn test_api_base_defaults() {
        let registry = Registry::new();
        assert_eq!(
            registry.api_base(PlatformKind::Github, "github.com").as_deref(),
            Some("https://api.github.com")
        );
        assert_eq!(
            registry.api_base(PlatformKind::Github, "ghe.corp.net").as_deref(),
            Some("https://ghe.corp.net/api/v3")
        );
        assert_eq!(registry.api_base(PlatformKind::Other, "example.com"), None);
    }

    #[test]
    fn test_gitea_listing_requires_override() {
        let registry = Registry::new();
        assert!(registry.listing_api(PlatformKind::Gitea, "gitea.com").is_none());

        let registry = registry.with_host(
            "gitea.com",
            PlatformKind::Gitea,
            Some("https://gitea.com/api/v1/".to_string()),
        );
        let api = registry.listing_api(PlatformKind::Gitea, "gitea.com").unwrap();
        assert_eq!(api.style, ListingStyle::Contents);
        assert_eq!(api.base, "https://gitea.com/api/v1");
    }

    #[test]
    fn test_ssh_success_patterns() {
        let registry = Registry::new();
        assert!(registry
            .ssh_success_pattern(PlatformKind::Github)
            .is_match("Hi octocat! You've successfully authenticated, but GitHub does not provide shell access."));
        assert!(registry
            .ssh_success_pattern(PlatformKind::Gitlab)
            .is_match("Welcome to GitLab, @octocat!"));
        assert!(!registry
            .ssh_success_pattern(PlatformKind::Gitlab)
            .is_match("Permission denied (publickey)."));
    }

    #[test]
    fn test_platform_config_validation() {
        assert!(PlatformConfig::default().validate().is_ok());
        let custom = PlatformConfig::new(PlatformKind::Other, None, None);
        assert_eq!(custom.validate(), Err(PlatformError::MissingDomain));
        let custom = PlatformConfig::new(PlatformKind::Other, Some("git.example.com".into()), None);
        assert!(custom.validate().is_ok());
        assert_eq!(custom.host(), "git.example.com");
        assert!(custom.is_self_hosted());
    }

    #[test]
    fn test_detect_remote_keeps_custom_domain() {
        let registry = Registry::new();
        assert_eq!(registry.detect_remote("github.com"), PlatformConfig::default());

        let detected = registry.detect_remote("gitlab.example.org");
        assert_eq!(detected.kind, PlatformKind::Gitlab);
        assert_eq!(detected.domain.as_deref(), Some("gitlab.example.org"));
    }

    #[test]
    fn test_build_remote_url() {
        assert_eq!(
            build_remote_url("github-work", "acme/widgets", true),
            "git@github-work:acme/widgets.git"
        );
        assert_eq!(
            build_remote_url("gitlab.com", "acme/widgets.git", false),
            "https://gitlab.com/acme/widgets.git"
        );
    }

    #[test]
    fn test_instructions_use_custom_host() {
        let config = PlatformConfig::new(PlatformKind::Gitlab, Some("git.corp".into()), None);
        let info = instructions(&config);
        assert_eq!(info.ssh_key_url, "https://git.corp/-/profile/keys");
        assert_eq!(info.ssh_test_command, "ssh -T git@git.corp");
    }
}
