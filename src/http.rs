//! Blocking HTTP client for listing APIs, HEAD metadata and file transfer.

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = concat!("forgehop/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Failed to create HTTP client: {0}")]
    Build(String),
    #[error("Invalid header '{0}'. Expected 'Name: value'")]
    InvalidHeader(String),
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Invalid JSON from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Client construction options.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub headers: Vec<(String, String)>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            follow_redirects: true,
            headers: Vec::new(),
        }
    }
}

/// Response headers of interest before a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub url: String,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

/// Credentials for an API authentication check.
#[derive(Debug, Clone, Copy)]
pub enum Credentials<'a> {
    Basic { username: &'a str, token: &'a str },
    /// GitLab personal access tokens.
    PrivateToken(&'a str),
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let invalid = || HttpError::InvalidHeader(format!("{}: {}", name, value));
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        let redirect = if settings.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .redirect(redirect)
            .default_headers(headers)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self { client })
    }

    /// GET a JSON document.
    pub fn fetch_json(&self, url: &str) -> Result<Value, HttpError> {
        debug!(url, "Fetching JSON");
        let response = self.send(self.client.get(url).header(ACCEPT, "application/json"), url)?;
        response.json::<Value>().map_err(|e| HttpError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// HEAD request for size, modification time and content type.
    pub fn fetch_head(&self, url: &str) -> Result<FileInfo, HttpError> {
        debug!(url, "Fetching headers");
        let response = self.send(self.client.head(url), url)?;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(FileInfo {
            url: response.url().to_string(),
            size: header("content-length").and_then(|s| s.parse().ok()),
            last_modified: header("last-modified"),
            content_type: header("content-type"),
        })
    }

    /// Streaming GET; the caller reads the body.
    pub fn get(&self, url: &str) -> Result<Response, HttpError> {
        debug!(url, "Downloading");
        self.send(self.client.get(url), url)
    }

    /// Status code of an authenticated GET, used to verify tokens.
    pub fn check_auth(&self, url: &str, credentials: Credentials<'_>) -> Result<u16, HttpError> {
        let request = match credentials {
            Credentials::Basic { username, token } => {
                self.client.get(url).basic_auth(username, Some(token))
            }
            Credentials::PrivateToken(token) => self.client.get(url).header("PRIVATE-TOKEN", token),
        };

        let response = request.send().map_err(|e| HttpError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(response.status().as_u16())
    }

    fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
        url: &str,
    ) -> Result<Response, HttpError> {
        let response = request.send().map_err(|e| HttpError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

/// Parse a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), HttpError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| HttpError::InvalidHeader(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(HttpError::InvalidHeader(raw.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc").unwrap(),
            ("Authorization".to_string(), "Bearer abc".to_string())
        );
        assert_eq!(
            parse_header("X-Empty:").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(matches!(parse_header("no-colon"), Err(HttpError::InvalidHeader(_))));
        assert!(matches!(parse_header(": value"), Err(HttpError::InvalidHeader(_))));
    }

    #[test]
    fn test_client_rejects_invalid_header_name() {
        let settings = HttpSettings {
            headers: vec![("Bad Header".to_string(), "x".to_string())],
            ..HttpSettings::default()
        };
        assert!(matches!(HttpClient::new(&settings), Err(HttpError::InvalidHeader(_))));
    }

    #[test]
    fn test_client_builds_with_defaults() {
        assert!(HttpClient::new(&HttpSettings::default()).is_ok());
    }
}
