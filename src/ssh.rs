use crate::config::Config;
use crate::platform::{PlatformKind, Registry};
use crate::profile::Profile;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use tracing::debug;

const MANAGED_START: &str = "# === FORGEHOP MANAGED START ===";
const MANAGED_END: &str = "# === FORGEHOP MANAGED END ===";

/// Get the SSH config file path
pub fn ssh_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".ssh").join("config"))
}

/// Host entry for a profile, or `None` for token-only profiles
fn generate_host_entry(profile_name: &str, profile: &Profile) -> Option<String> {
    let ssh_key = profile.ssh_key.as_deref()?;
    let alias = profile.ssh_host_alias(profile_name);

    Some(format!(
        "Host {}\n  HostName {}\n  User git\n  IdentityFile {}\n  IdentitiesOnly yes\n",
        alias,
        profile.default_host(),
        ssh_key
    ))
}

/// Generate the managed block content for all profiles
pub fn generate_managed_block(config: &Config) -> (String, usize) {
    let mut block = String::new();
    block.push_str(MANAGED_START);
    block.push('\n');

    let mut count = 0;
    for name in config.profile_names() {
        if let Some(entry) = config
            .get_profile(name)
            .and_then(|profile| generate_host_entry(name, profile))
        {
            block.push_str(&entry);
            count += 1;
        }
    }

    block.push_str(MANAGED_END);
    (block, count)
}

/// Replace the managed block in `current`, or append one.
/// Returns the new content and whether a block was replaced.
fn merge_managed_block(current: &str, block: &str) -> (String, bool) {
    if let (Some(start_idx), Some(end_idx)) = (current.find(MANAGED_START), current.find(MANAGED_END)) {
        if start_idx < end_idx {
            let end_idx = end_idx + MANAGED_END.len();
            let mut merged = String::new();
            merged.push_str(&current[..start_idx]);
            merged.push_str(block);
            merged.push_str(&current[end_idx..]);
            return (merged, true);
        }
    }

    let mut merged = current.to_string();
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged.push_str(block);
    merged.push('\n');
    (merged, false)
}

fn read_ssh_config() -> Result<String> {
    let path = ssh_config_path()?;
    if path.exists() {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SSH config: {}", path.display()))
    } else {
        Ok(String::new())
    }
}

fn write_ssh_config(content: &str) -> Result<()> {
    let path = ssh_config_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create .ssh directory: {}", parent.display()))?;
    }

    fs::write(&path, content)
        .with_context(|| format!("Failed to write SSH config: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Sync SSH config with all profiles that have a key.
/// Returns (entry_count, updated)
pub fn sync_ssh_config(config: &Config) -> Result<(usize, bool)> {
    let current = read_ssh_config()?;
    let (block, count) = generate_managed_block(config);
    let (content, was_update) = merge_managed_block(&current, &block);
    write_ssh_config(&content)?;
    Ok((count, was_update))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTestResult {
    pub ok: bool,
    pub message: String,
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)hi there,?\s+([^!]+)!|hi\s+([^!,]+)[!,]|logged in as\s+(\S+)|@(\S+?)!?$")
            .expect("username pattern must compile")
    })
}

/// Judge `ssh -T` output against the platform's success pattern.
pub fn evaluate_ssh_output(output: &str, exit_code: Option<i32>, success: &Regex) -> SshTestResult {
    let output = output.trim();

    if success.is_match(output) {
        let username = output
            .lines()
            .find_map(|line| username_pattern().captures(line.trim()))
            .and_then(|caps| (1..=4).find_map(|i| caps.get(i)))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| "user".to_string());
        return SshTestResult {
            ok: true,
            message: format!("Successfully authenticated as {}", username),
        };
    }

    let message = match exit_code {
        Some(255) => "Connection failed. Check that the SSH key is added to the Git service.".to_string(),
        _ if !output.is_empty() => output.to_string(),
        Some(code) => format!("SSH exit code: {}", code),
        None => "SSH terminated by signal".to_string(),
    };
    SshTestResult { ok: false, message }
}

/// Run `ssh -T git@<host>` non-interactively.
pub fn test_connection(host: &str, kind: PlatformKind, registry: &Registry) -> Result<SshTestResult> {
    debug!(host, %kind, "Testing SSH connection");
    let output = Command::new("ssh")
        .args([
            "-T",
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "BatchMode=yes",
        ])
        .arg(format!("git@{}", host))
        .output()
        .context("Failed to execute ssh")?;

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(evaluate_ssh_output(
        &combined,
        output.status.code(),
        registry.ssh_success_pattern(kind),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformConfig;

    fn profile(platform: PlatformConfig, ssh_key: Option<&str>) -> Profile {
        Profile::new(
            "John Doe".to_string(),
            "john@example.com".to_string(),
            platform,
            ssh_key.map(str::to_string),
            None,
            None,
        )
    }

    #[test]
    fn test_generate_host_entry() {
        let profile = profile(PlatformConfig::default(), Some("~/.ssh/id_ed25519_work"));

        let entry = generate_host_entry("work", &profile).unwrap();
        assert!(entry.contains("Host github-work"));
        assert!(entry.contains("HostName github.com"));
        assert!(entry.contains("IdentityFile ~/.ssh/id_ed25519_work"));
    }

    #[test]
    fn test_host_entry_uses_custom_domain() {
        let profile = profile(
            PlatformConfig::new(PlatformKind::Gitea, Some("codeberg.org".into()), None),
            Some("~/.ssh/id_cb"),
        );
        let entry = generate_host_entry("oss", &profile).unwrap();
        assert!(entry.contains("Host gitea-oss"));
        assert!(entry.contains("HostName codeberg.org"));
    }

    #[test]
    fn test_generate_managed_block_skips_token_only() {
        let mut config = Config::default();
        config.profiles.insert(
            "work".to_string(),
            profile(PlatformConfig::default(), Some("~/.ssh/id_work")),
        );
        config.profiles.insert("ci".to_string(), profile(PlatformConfig::default(), None));

        let (block, count) = generate_managed_block(&config);
        assert!(block.starts_with(MANAGED_START));
        assert!(block.ends_with(MANAGED_END));
        assert!(block.contains("Host github-work"));
        assert!(!block.contains("github-ci"));
        assert_eq!(count, 1);
    }

    #[test]
    fn test_merge_replaces_existing_block() {
        let current = format!(
            "Host personal\n  HostName example.com\n\n{}\nHost old\n{}\nHost after\n",
            MANAGED_START, MANAGED_END
        );
        let block = format!("{}\nHost new\n{}", MANAGED_START, MANAGED_END);

        let (merged, replaced) = merge_managed_block(&current, &block);
        assert!(replaced);
        assert!(merged.contains("Host personal"));
        assert!(merged.contains("Host new"));
        assert!(!merged.contains("Host old"));
        assert!(merged.ends_with("Host after\n"));
    }

    #[test]
    fn test_merge_appends_block() {
        let block = format!("{}\n{}", MANAGED_START, MANAGED_END);
        let (merged, replaced) = merge_managed_block("Host a", &block);
        assert!(!replaced);
        assert_eq!(merged, format!("Host a\n\n{}\n", block));

        let (merged, _) = merge_managed_block("", &block);
        assert_eq!(merged, format!("{}\n", block));
    }

    #[test]
    fn test_evaluate_ssh_output() {
        let registry = Registry::new();

        let github = evaluate_ssh_output(
            "Hi octocat! You've successfully authenticated, but GitHub does not provide shell access.",
            Some(1),
            registry.ssh_success_pattern(PlatformKind::Github),
        );
        assert!(github.ok);
        assert_eq!(github.message, "Successfully authenticated as octocat");

        let gitlab = evaluate_ssh_output(
            "Welcome to GitLab, @octocat!",
            Some(0),
            registry.ssh_success_pattern(PlatformKind::Gitlab),
        );
        assert!(gitlab.ok);
        assert_eq!(gitlab.message, "Successfully authenticated as octocat");

        let denied = evaluate_ssh_output(
            "git@github.com: Permission denied (publickey).",
            Some(255),
            registry.ssh_success_pattern(PlatformKind::Github),
        );
        assert!(!denied.ok);
        assert!(denied.message.starts_with("Connection failed"));
    }
}
