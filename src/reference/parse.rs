use super::{decode_segment, strip_git_suffix, ParsedReference, RefKind, UrlError, DEFAULT_REF};
use crate::platform::{PlatformKind, Registry};
use tracing::debug;
use url::Url;

const RAW_GITHUB_HOST: &str = "raw.githubusercontent.com";

/// Parse a web URL, raw-content URL, SSH remote or `owner/repo[:ref]/path`
/// short form.
///
/// A `UrlError::Parse` means the input is not a recognizable Git reference;
/// callers should fall back to treating it as a plain downloadable URL.
pub fn parse(input: &str, registry: &Registry) -> Result<ParsedReference, UrlError> {
    let input = input.trim();

    let parsed = if let Some(rest) = input.strip_prefix("git@") {
        parse_scp(rest, registry)
    } else if !input.contains("://") {
        if looks_like_host(input) {
            parse_url(&format!("https://{}", input), registry)
        } else {
            parse_short(input)
        }
    } else {
        parse_url(input, registry)
    };

    match parsed {
        Some(reference) => {
            debug!(
                platform = %reference.platform,
                owner = %reference.owner,
                repo = %reference.repo,
                git_ref = %reference.git_ref,
                path = reference.path.as_deref().unwrap_or(""),
                "Parsed reference"
            );
            Ok(reference)
        }
        None => Err(UrlError::Parse(input.to_string())),
    }
}

/// Scheme-less input whose first segment is a hostname, e.g. `github.com/acme/widgets`.
fn looks_like_host(input: &str) -> bool {
    let first = input.split('/').next().unwrap_or_default();
    first.contains('.') && !first.contains(':')
}

/// `owner/repo/path...` or `owner/repo:ref/path...`, always GitHub.
///
/// Only the first `:` is significant and the ref runs to the next `/`, so
/// refs containing `/` cannot be written in this form.
fn parse_short(input: &str) -> Option<ParsedReference> {
    let mut git_ref = DEFAULT_REF.to_string();
    let mut path_part = input.to_string();

    if let Some((repo_part, rest)) = input.split_once(':') {
        if !repo_part.is_empty() && !rest.is_empty() {
            path_part = format!("{}/{}", repo_part, rest);
            if let Some((explicit_ref, remainder)) = rest.split_once('/') {
                if !explicit_ref.is_empty() && !remainder.is_empty() {
                    git_ref = explicit_ref.to_string();
                    path_part = format!("{}/{}", repo_part, remainder);
                }
            }
        }
    }

    let parts: Vec<&str> = path_part.split('/').collect();
    if parts.len() < 3 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }

    let path = join_path(&parts[2..])?;
    let repo = strip_git_suffix(parts[1]);
    if repo.is_empty() {
        return None;
    }

    Some(ParsedReference {
        platform: PlatformKind::Github,
        domain: "github.com".to_string(),
        owner: parts[0].to_string(),
        repo: repo.to_string(),
        git_ref,
        ref_kind: RefKind::Branch,
        path: Some(path),
        is_directory: false,
        precomputed_raw_url: None,
    })
}

/// `host:owner/repo(.git)` with the `git@` already removed.
fn parse_scp(rest: &str, registry: &Registry) -> Option<ParsedReference> {
    let (host, path) = rest.split_once(':')?;
    let segments = segments_of(path);
    let kind = registry.classify(host);
    let (owner, repo, _) = split_repo(kind, &segments)?;
    Some(repository_root(kind, host, owner, repo))
}

fn parse_url(input: &str, registry: &Registry) -> Option<ParsedReference> {
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?;
    // path_segments() excludes the query string and fragment.
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    match url.scheme() {
        "http" | "https" => {}
        "ssh" | "git" => {
            let kind = registry.classify(host);
            let (owner, repo, _) = split_repo(kind, &segments)?;
            return Some(repository_root(kind, host, owner, repo));
        }
        _ => return None,
    }

    if host.eq_ignore_ascii_case(RAW_GITHUB_HOST) {
        return parse_github_raw(&segments, input);
    }

    let domain = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let kind = registry.classify(&domain);

    parse_platform_raw(kind, &domain, &segments, input)
        .or_else(|| parse_web(kind, &domain, &segments))
}

/// `raw.githubusercontent.com/{owner}/{repo}/{ref}/{path...}`
fn parse_github_raw(segments: &[&str], raw_url: &str) -> Option<ParsedReference> {
    let [owner, repo, git_ref, path @ ..] = segments else {
        return None;
    };
    let path = join_path(path)?;
    let repo = strip_git_suffix(repo);
    if owner.is_empty() || repo.is_empty() {
        return None;
    }

    Some(ParsedReference {
        platform: PlatformKind::Github,
        domain: "github.com".to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        git_ref: git_ref.to_string(),
        ref_kind: RefKind::Branch,
        path: Some(path),
        is_directory: false,
        precomputed_raw_url: Some(raw_url.to_string()),
    })
}

/// Raw-content URLs served from the platform host itself.
fn parse_platform_raw(
    kind: PlatformKind,
    domain: &str,
    segments: &[&str],
    raw_url: &str,
) -> Option<ParsedReference> {
    let (owner, repo, rest) = split_repo(kind, segments)?;

    let (git_ref, ref_kind, path) = match (kind, rest) {
        (PlatformKind::Gitea, ["raw", ref_kind, git_ref, path @ ..]) => {
            (*git_ref, RefKind::from_segment(ref_kind)?, path)
        }
        (
            PlatformKind::Github | PlatformKind::Gitlab | PlatformKind::Bitbucket,
            ["raw", git_ref, path @ ..],
        ) => (*git_ref, RefKind::Branch, path),
        _ => return None,
    };

    Some(ParsedReference {
        platform: kind,
        domain: domain.to_string(),
        owner,
        repo,
        git_ref: git_ref.to_string(),
        ref_kind,
        path: Some(join_path(path)?),
        is_directory: false,
        precomputed_raw_url: Some(raw_url.to_string()),
    })
}

/// Browsable URLs, decomposed per platform convention.
fn parse_web(kind: PlatformKind, domain: &str, segments: &[&str]) -> Option<ParsedReference> {
    let (owner, repo, rest) = split_repo(kind, segments)?;

    let location = match (kind, rest) {
        (PlatformKind::Github | PlatformKind::Gitlab, [marker @ ("blob" | "tree"), git_ref, path @ ..]) => {
            join_path(path).map(|path| (*git_ref, RefKind::Branch, path, *marker == "tree"))
        }
        (PlatformKind::Bitbucket, ["src", git_ref, path @ ..]) => {
            join_path(path).map(|path| (*git_ref, RefKind::Branch, path, false))
        }
        (PlatformKind::Gitea, ["src", ref_kind, git_ref, path @ ..]) => RefKind::from_segment(ref_kind)
            .and_then(|ref_kind| join_path(path).map(|path| (*git_ref, ref_kind, path, false))),
        _ => None,
    };

    let Some((git_ref, ref_kind, path, is_directory)) = location else {
        return Some(repository_root(kind, domain, owner, repo));
    };

    Some(ParsedReference {
        platform: kind,
        domain: domain.to_string(),
        owner,
        repo,
        git_ref: git_ref.to_string(),
        ref_kind,
        path: Some(path),
        is_directory,
        precomputed_raw_url: None,
    })
}

/// Split `owner/repo` off the front of the path. GitLab namespaces may be
/// nested, so there the repository is the segment before the `-` marker, or
/// the last segment when there is no marker.
fn split_repo<'a>(kind: PlatformKind, segments: &'a [&'a str]) -> Option<(String, String, &'a [&'a str])> {
    let (owner, repo, rest) = match kind {
        PlatformKind::Gitlab => match segments.iter().position(|s| *s == "-") {
            Some(marker) if marker >= 2 => (
                segments[..marker - 1].join("/"),
                segments[marker - 1],
                &segments[marker + 1..],
            ),
            Some(_) => return None,
            None if segments.len() >= 2 => (
                segments[..segments.len() - 1].join("/"),
                segments[segments.len() - 1],
                &segments[segments.len()..],
            ),
            None => return None,
        },
        _ => match segments {
            [owner, repo, rest @ ..] => (owner.to_string(), *repo, rest),
            _ => return None,
        },
    };

    let repo = strip_git_suffix(repo);
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo.to_string(), rest))
}

fn repository_root(kind: PlatformKind, domain: &str, owner: String, repo: String) -> ParsedReference {
    ParsedReference {
        platform: kind,
        domain: domain.to_string(),
        owner,
        repo,
        git_ref: DEFAULT_REF.to_string(),
        ref_kind: RefKind::Branch,
        path: None,
        is_directory: false,
        precomputed_raw_url: None,
    }
}

fn segments_of(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Decode and join path segments, dropping empties. `None` if nothing is left.
fn join_path(segments: &[&str]) -> Option<String> {
    let path = segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| decode_segment(s))
        .collect::<Vec<_>>()
        .join("/");
    (!path.is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> ParsedReference {
        parse(input, &Registry::new()).unwrap()
    }

    #[test]
    fn test_parse_short_form() {
        let parsed = parse_ok("acme/widgets/docs/guide.md");
        assert_eq!(parsed.platform, PlatformKind::Github);
        assert_eq!(parsed.domain, "github.com");
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.repo, "widgets");
        assert_eq!(parsed.git_ref, "main");
        assert_eq!(parsed.path.as_deref(), Some("docs/guide.md"));
        assert!(!parsed.is_directory);
    }

    #[test]
    fn test_parse_short_form_with_ref() {
        let parsed = parse_ok("acme/widgets:develop/src/lib.rs");
        assert_eq!(parsed.git_ref, "develop");
        assert_eq!(parsed.path.as_deref(), Some("src/lib.rs"));
    }

    #[test]
    fn test_short_form_ref_stops_at_first_slash() {
        let parsed = parse_ok("acme/widgets:feature/login/app.ts");
        assert_eq!(parsed.git_ref, "feature");
        assert_eq!(parsed.path.as_deref(), Some("login/app.ts"));
    }

    #[test]
    fn test_short_form_colon_without_ref_is_path() {
        let parsed = parse_ok("acme/widgets:README.md");
        assert_eq!(parsed.git_ref, "main");
        assert_eq!(parsed.path.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_short_form_requires_path() {
        let registry = Registry::new();
        assert!(matches!(parse("acme/widgets", &registry), Err(UrlError::Parse(_))));
        assert!(matches!(parse("acme/widgets/", &registry), Err(UrlError::Parse(_))));
        assert!(matches!(parse("acme", &registry), Err(UrlError::Parse(_))));
        assert!(matches!(parse("", &registry), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_git_suffix_is_stripped() {
        let with_suffix = parse_ok("https://github.com/acme/widgets.git/blob/main/a.txt");
        let without = parse_ok("https://github.com/acme/widgets/blob/main/a.txt");
        assert_eq!(with_suffix.repo, "widgets");
        assert_eq!(with_suffix, without);
    }

    #[test]
    fn test_parse_github_blob_and_tree() {
        let file = parse_ok("https://github.com/acme/widgets/blob/dev/src/x.ts");
        assert_eq!(file.git_ref, "dev");
        assert_eq!(file.path.as_deref(), Some("src/x.ts"));
        assert!(!file.is_directory);

        let dir = parse_ok("https://github.com/acme/widgets/tree/main/src/");
        assert_eq!(dir.path.as_deref(), Some("src"));
        assert!(dir.is_directory);
    }

    #[test]
    fn test_parse_repository_root() {
        let root = parse_ok("https://github.com/acme/widgets");
        assert_eq!(root.path, None);
        assert!(!root.is_directory);
        assert_eq!(root.git_ref, "main");
    }

    #[test]
    fn test_query_and_fragment_are_discarded() {
        let parsed = parse_ok("https://github.com/acme/widgets/blob/main/README.md?plain=1#L10");
        assert_eq!(parsed.path.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_parse_scheme_less_host() {
        let parsed = parse_ok("github.com/acme/widgets/blob/main/README.md");
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.path.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_parse_github_raw_url() {
        let input = "https://raw.githubusercontent.com/acme/widgets/v1.0/docs/a.md";
        let parsed = parse_ok(input);
        assert_eq!(parsed.platform, PlatformKind::Github);
        assert_eq!(parsed.git_ref, "v1.0");
        assert_eq!(parsed.path.as_deref(), Some("docs/a.md"));
        assert_eq!(parsed.precomputed_raw_url.as_deref(), Some(input));
    }

    #[test]
    fn test_raw_url_needs_four_segments() {
        let registry = Registry::new();
        assert!(parse("https://raw.githubusercontent.com/acme/widgets/main", &registry).is_err());
    }

    #[test]
    fn test_parse_gitlab_urls() {
        let file = parse_ok("https://gitlab.com/acme/widgets/-/blob/main/README.md");
        assert_eq!(file.platform, PlatformKind::Gitlab);
        assert_eq!(file.path.as_deref(), Some("README.md"));

        let nested = parse_ok("https://gitlab.example.org/group/sub/tool/-/tree/stable/cmd");
        assert_eq!(nested.domain, "gitlab.example.org");
        assert_eq!(nested.owner, "group/sub");
        assert_eq!(nested.repo, "tool");
        assert_eq!(nested.git_ref, "stable");
        assert!(nested.is_directory);

        let raw = parse_ok("https://gitlab.com/acme/widgets/-/raw/main/a.txt");
        assert!(raw.precomputed_raw_url.is_some());
        assert_eq!(raw.path.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_parse_bitbucket_src_defaults_to_file() {
        let parsed = parse_ok("https://bitbucket.org/acme/widgets/src/main/docs");
        assert_eq!(parsed.platform, PlatformKind::Bitbucket);
        assert_eq!(parsed.path.as_deref(), Some("docs"));
        assert!(!parsed.is_directory);
    }

    #[test]
    fn test_parse_gitea_src_url() {
        let parsed = parse_ok("https://codeberg.org/acme/widgets/src/tag/v2/README.md");
        assert_eq!(parsed.platform, PlatformKind::Gitea);
        assert_eq!(parsed.git_ref, "v2");
        assert_eq!(parsed.ref_kind, RefKind::Tag);
        assert_eq!(parsed.path.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_parse_decodes_escaped_path_segments() {
        let parsed = parse_ok("https://github.com/acme/widgets/blob/main/docs/my%20file.md");
        assert_eq!(parsed.path.as_deref(), Some("docs/my file.md"));
    }

    #[test]
    fn test_parse_other_host_is_best_effort() {
        let parsed = parse_ok("https://git.example.com/acme/widgets.git/anything/else");
        assert_eq!(parsed.platform, PlatformKind::Other);
        assert_eq!(parsed.repo, "widgets");
        assert_eq!(parsed.path, None);
    }

    #[test]
    fn test_parse_failure_does_not_panic() {
        let registry = Registry::new();
        assert!(matches!(
            parse("https://example.com/not-a-repo-shape", &registry),
            Err(UrlError::Parse(_))
        ));
        assert!(parse("ftp://github.com/acme/widgets", &registry).is_err());
        assert!(parse("https://", &registry).is_err());
    }

    #[test]
    fn test_parse_ssh_remotes() {
        let scp = parse_ok("git@github.com:acme/widgets.git");
        assert_eq!(scp.owner, "acme");
        assert_eq!(scp.repo, "widgets");
        assert_eq!(scp.path, None);

        let ssh = parse_ok("ssh://git@gitlab.com/acme/widgets.git");
        assert_eq!(ssh.platform, PlatformKind::Gitlab);
        assert_eq!(ssh.repo, "widgets");
    }

    #[test]
    fn test_custom_host_classification_applies() {
        let registry = Registry::new().with_host("code.acme.dev", PlatformKind::Gitlab, None);
        let parsed = parse("https://code.acme.dev/team/app/-/blob/main/x.rs", &registry).unwrap();
        assert_eq!(parsed.platform, PlatformKind::Gitlab);
        assert_eq!(parsed.path.as_deref(), Some("x.rs"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_short_form_property(
                owner in "[A-Za-z0-9_-]{1,12}",
                repo in "[A-Za-z0-9_-]{1,12}",
                path in "[A-Za-z0-9_-]{1,8}(/[A-Za-z0-9_.-]{1,8}){0,3}",
            ) {
                let parsed = parse(&format!("{}/{}/{}", owner, repo, path), &Registry::new()).unwrap();
                prop_assert_eq!(parsed.platform, PlatformKind::Github);
                prop_assert_eq!(parsed.owner, owner);
                prop_assert_eq!(parsed.repo, repo);
                prop_assert_eq!(parsed.git_ref, "main");
                prop_assert_eq!(parsed.path, Some(path));
                prop_assert!(!parsed.is_directory);
            }
        }
    }
}
