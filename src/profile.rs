use crate::platform::{PlatformConfig, PlatformError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username and personal access token for HTTPS remotes and API checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_key: Option<String>,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenConfig>,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile name cannot be empty")]
    EmptyName,
    #[error("Email cannot be empty")]
    EmptyEmail,
    #[error("A profile needs an SSH key or a token")]
    NoCredentials,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl Profile {
    pub fn new(
        name: String,
        email: String,
        platform: PlatformConfig,
        ssh_key: Option<String>,
        token: Option<TokenConfig>,
        gpg_key: Option<String>,
    ) -> Self {
        Self {
            name,
            email,
            ssh_key,
            gpg_key,
            platform,
            token,
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if self.email.trim().is_empty() {
            return Err(ProfileError::EmptyEmail);
        }
        let has_key = self.ssh_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        let has_token = self.token.as_ref().is_some_and(|t| !t.token.trim().is_empty());
        if !has_key && !has_token {
            return Err(ProfileError::NoCredentials);
        }
        self.platform.validate()?;
        Ok(())
    }

    pub fn default_host(&self) -> &str {
        self.platform.host()
    }

    pub fn uses_ssh(&self) -> bool {
        self.ssh_key.is_some()
    }

    /// Generate SSH Host alias for this profile (e.g., "github-work")
    pub fn ssh_host_alias(&self, profile_name: &str) -> String {
        format!("{}-{}", self.platform.kind.alias_prefix(), profile_name)
    }
}
