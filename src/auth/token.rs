//! Personal access token verification against each platform's `/user` endpoint.

use crate::http::{Credentials, HttpClient};
use crate::platform::{PlatformConfig, PlatformKind, Registry};
use crate::profile::TokenConfig;
use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub ok: bool,
    pub message: String,
}

/// `{api}/user` for the platform, honouring an `api_url` override.
pub fn user_endpoint(platform: &PlatformConfig, registry: &Registry) -> Option<String> {
    let base = platform
        .api_url
        .clone()
        .or_else(|| registry.api_base(platform.kind, platform.host()))?;
    Some(format!("{}/user", base.trim_end_matches('/')))
}

fn credentials(kind: PlatformKind, token: &TokenConfig) -> Credentials<'_> {
    match kind {
        PlatformKind::Gitlab => Credentials::PrivateToken(&token.token),
        _ => Credentials::Basic {
            username: &token.username,
            token: &token.token,
        },
    }
}

fn describe_status(status: u16, platform: &str) -> TokenStatus {
    let message = match status {
        200 => format!("HTTP {} - Authentication successful", status),
        401 => format!("HTTP {} - Invalid credentials. Check your username and token.", status),
        403 => format!("HTTP {} - Access forbidden. Token may lack required permissions.", status),
        404 => format!("HTTP {} - Not found. Check your username and API URL.", status),
        _ => format!("HTTP {} - Unexpected response from the {} API.", status, platform),
    };
    TokenStatus {
        ok: status == 200,
        message,
    }
}

pub fn check_token(
    client: &HttpClient,
    platform: &PlatformConfig,
    token: &TokenConfig,
    registry: &Registry,
) -> Result<TokenStatus> {
    let url = user_endpoint(platform, registry).with_context(|| {
        format!(
            "No API endpoint known for {}. Set api_url on the profile.",
            platform.host()
        )
    })?;

    let status = client.check_auth(&url, credentials(platform.kind, token))?;
    Ok(describe_status(status, platform.kind.display_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_endpoints() {
        let registry = Registry::new();
        assert_eq!(
            user_endpoint(&PlatformConfig::default(), &registry).as_deref(),
            Some("https://api.github.com/user")
        );
        assert_eq!(
            user_endpoint(&PlatformConfig::new(PlatformKind::Gitlab, None, None), &registry).as_deref(),
            Some("https://gitlab.com/api/v4/user")
        );
        assert_eq!(
            user_endpoint(&PlatformConfig::new(PlatformKind::Bitbucket, None, None), &registry).as_deref(),
            Some("https://api.bitbucket.org/2.0/user")
        );
        let custom = PlatformConfig::new(
            PlatformKind::Other,
            Some("git.example.com".into()),
            Some("https://git.example.com/api/".into()),
        );
        assert_eq!(
            user_endpoint(&custom, &registry).as_deref(),
            Some("https://git.example.com/api/user")
        );
        let bare = PlatformConfig::new(PlatformKind::Other, Some("git.example.com".into()), None);
        assert_eq!(user_endpoint(&bare, &registry), None);
    }

    #[test]
    fn test_gitlab_uses_private_token() {
        let token = TokenConfig {
            username: "jo".to_string(),
            token: "glpat-x".to_string(),
        };
        assert!(matches!(
            credentials(PlatformKind::Gitlab, &token),
            Credentials::PrivateToken("glpat-x")
        ));
        assert!(matches!(
            credentials(PlatformKind::Github, &token),
            Credentials::Basic { username: "jo", .. }
        ));
    }

    #[test]
    fn test_describe_status() {
        assert!(describe_status(200, "GitHub").ok);
        let denied = describe_status(401, "GitHub");
        assert!(!denied.ok);
        assert!(denied.message.contains("Invalid credentials"));
        assert!(describe_status(500, "Gitea").message.contains("Gitea API"));
    }
}
