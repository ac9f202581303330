use super::{encode_path, ParsedReference, UrlError, TREE_PAGE_SIZE};
use crate::platform::{ListingStyle, PlatformKind, Registry};
use url::form_urlencoded::byte_serialize;

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

impl ParsedReference {
    /// URL serving the file's bytes directly.
    pub fn raw_url(&self) -> Result<String, UrlError> {
        if let Some(raw) = &self.precomputed_raw_url {
            return Ok(raw.clone());
        }

        let path = self.path.as_deref().ok_or_else(|| UrlError::NoFilePath {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
        })?;
        let (domain, owner, repo, git_ref) = (&self.domain, &self.owner, &self.repo, &self.git_ref);
        let path = encode_path(path);

        let url = match self.platform {
            PlatformKind::Github if domain == "github.com" => format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                owner, repo, git_ref, path
            ),
            PlatformKind::Gitlab => format!(
                "https://{}/{}/{}/-/raw/{}/{}",
                domain, owner, repo, git_ref, path
            ),
            PlatformKind::Gitea => format!(
                "https://{}/{}/{}/raw/{}/{}/{}",
                domain,
                owner,
                repo,
                self.ref_kind.as_str(),
                git_ref,
                path
            ),
            // Bitbucket, GitHub Enterprise and unknown hosts share the plain `raw` layout.
            PlatformKind::Github | PlatformKind::Bitbucket | PlatformKind::Other => format!(
                "https://{}/{}/{}/raw/{}/{}",
                domain, owner, repo, git_ref, path
            ),
        };
        Ok(url)
    }

    /// Listing/metadata endpoint for this reference's own path.
    pub fn api_url(&self, registry: &Registry) -> Result<String, UrlError> {
        self.api_url_for(registry, self.path.as_deref())
    }

    /// Listing/metadata endpoint for an arbitrary path in the same repository.
    pub fn api_url_for(&self, registry: &Registry, path: Option<&str>) -> Result<String, UrlError> {
        let api = registry
            .listing_api(self.platform, &self.domain)
            .ok_or(UrlError::UnsupportedPlatform(self.platform.display_name()))?;
        let path = path.unwrap_or_default().trim_matches('/');

        let url = match api.style {
            ListingStyle::Contents if path.is_empty() => format!(
                "{}/repos/{}/{}/contents?ref={}",
                api.base,
                self.owner,
                self.repo,
                encode(&self.git_ref)
            ),
            ListingStyle::Contents => format!(
                "{}/repos/{}/{}/contents/{}?ref={}",
                api.base,
                self.owner,
                self.repo,
                encode_path(path),
                encode(&self.git_ref)
            ),
            // First page only; the walker appends `&page=N` while pages come back full.
            ListingStyle::Tree => format!(
                "{}/projects/{}/repository/tree?path={}&ref={}&per_page={}",
                api.base,
                encode(&self.repo_path()),
                encode(path),
                encode(&self.git_ref),
                TREE_PAGE_SIZE
            ),
            ListingStyle::Src => format!(
                "{}/repositories/{}/{}/src/{}/{}",
                api.base,
                self.owner,
                self.repo,
                self.git_ref,
                encode_path(path)
            ),
        };
        Ok(url)
    }

    /// Human-browsable page for the reference.
    pub fn web_url(&self) -> String {
        let base = format!("https://{}/{}/{}", self.domain, self.owner, self.repo);
        let segment = match self.platform {
            PlatformKind::Gitea => format!("src/{}", self.ref_kind.as_str()),
            platform => platform.web_path_segment(self.is_directory).to_string(),
        };

        match &self.path {
            Some(path) if !segment.is_empty() => {
                format!("{}/{}/{}/{}", base, segment, self.git_ref, encode_path(path))
            }
            _ => base,
        }
    }

    /// Last path segment, or the repository name for a root reference.
    pub fn filename(&self) -> &str {
        self.path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.repo)
    }
}
