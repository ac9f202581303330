use crate::http::DEFAULT_USER_AGENT;
use crate::platform::Registry;
use crate::profile::Profile;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// The `[download]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_depth: usize,
    pub retries: u32,
    pub concurrency: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_depth: crate::walker::DEFAULT_MAX_DEPTH,
            retries: 3,
            concurrency: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Config {
    /// Load config from the default location (~/.config/forgehop/config.toml)
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("forgehop").join("config.toml"))
    }

    pub fn add_profile(&mut self, name: String, profile: Profile) -> Result<()> {
        profile.validate()?;
        self.profiles.insert(name, profile);
        Ok(())
    }

    /// Remove a profile, clearing the default if it pointed there
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Get all profile names sorted alphabetically
    pub fn profile_names(&self) -> Vec<&String> {
        let mut names: Vec<_> = self.profiles.keys().collect();
        names.sort();
        names
    }

    /// Platform registry with every profile's self-hosted domain registered.
    pub fn registry(&self) -> Registry {
        self.profile_names()
            .into_iter()
            .filter_map(|name| self.profiles.get(name))
            .filter_map(|profile| {
                let platform = &profile.platform;
                platform
                    .domain
                    .as_deref()
                    .map(|domain| (domain, platform.kind, platform.api_url.clone()))
            })
            .fold(Registry::new(), |registry, (domain, kind, api_url)| {
                registry.with_host(domain, kind, api_url)
            })
    }

    /// Initialize config directory and create empty config if not exists
    pub fn init() -> Result<bool> {
        let path = Self::config_path()?;

        if path.exists() {
            return Ok(false);
        }

        let config = Config::default();
        config.save()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformConfig, PlatformKind};

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.default_profile = Some("personal".to_string());

        let profile = Profile::new(
            "John Doe".to_string(),
            "john@example.com".to_string(),
            PlatformConfig::default(),
            Some("~/.ssh/id_ed25519".to_string()),
            None,
            None,
        );
        config.profiles.insert("personal".to_string(), profile);

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("default_profile"));
        assert!(toml_str.contains("[profiles.personal]"));
        assert!(toml_str.contains("[download]"));

        let reloaded: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reloaded.profiles, config.profiles);
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
default_profile = "work"

[download]
retries = 5

[profiles.work]
name = "John Doe"
email = "john@company.com"
ssh_key = "~/.ssh/id_work"
gpg_key = "ABCD1234"

[profiles.work.platform]
kind = "gitlab"
domain = "code.company.com"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_profile, Some("work".to_string()));
        assert_eq!(config.download.retries, 5);
        assert_eq!(config.download.max_depth, 10);

        let profile = config.profiles.get("work").unwrap();
        assert_eq!(profile.name, "John Doe");
        assert_eq!(profile.gpg_key, Some("ABCD1234".to_string()));
        assert_eq!(profile.platform.kind, PlatformKind::Gitlab);
    }

    #[test]
    fn test_platform_defaults_to_github() {
        let toml_str = r#"
[profiles.home]
name = "Jo"
email = "jo@example.com"
ssh_key = "~/.ssh/id_home"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.profiles["home"].platform, PlatformConfig::default());
        assert_eq!(config.download, DownloadSettings::default());
    }

    #[test]
    fn test_registry_includes_custom_domains() {
        let mut config = Config::default();
        config.profiles.insert(
            "work".to_string(),
            Profile::new(
                "Jo".to_string(),
                "jo@corp.dev".to_string(),
                PlatformConfig::new(PlatformKind::Gitlab, Some("code.corp.dev".into()), None),
                Some("~/.ssh/id_work".to_string()),
                None,
                None,
            ),
        );

        let registry = config.registry();
        assert_eq!(registry.classify("code.corp.dev"), PlatformKind::Gitlab);
        assert_eq!(registry.classify("github.com"), PlatformKind::Github);
    }
}
