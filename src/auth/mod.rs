pub mod token;

use crate::platform::PlatformKind;
use crate::profile::Profile;
use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::debug;

/// A platform's own CLI with an interactive `auth login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoginTool {
    program: &'static str,
    display: &'static str,
    install_url: &'static str,
    public_host: &'static str,
    extra_args: &'static [&'static str],
}

fn login_tool(kind: PlatformKind) -> Option<LoginTool> {
    match kind {
        PlatformKind::Github => Some(LoginTool {
            program: "gh",
            display: "GitHub CLI (gh)",
            install_url: "https://cli.github.com/",
            public_host: "github.com",
            extra_args: &["--git-protocol", "ssh"],
        }),
        PlatformKind::Gitlab => Some(LoginTool {
            program: "glab",
            display: "GitLab CLI (glab)",
            install_url: "https://gitlab.com/gitlab-org/cli",
            public_host: "gitlab.com",
            extra_args: &[],
        }),
        PlatformKind::Bitbucket | PlatformKind::Gitea | PlatformKind::Other => None,
    }
}

/// Arguments after the program name; `--hostname` only for self-hosted instances.
fn login_args(tool: &LoginTool, host: &str) -> Vec<String> {
    let mut args = vec!["auth".to_string(), "login".to_string()];
    if host != tool.public_host {
        args.push("--hostname".to_string());
        args.push(host.to_string());
    }
    args.extend(tool.extra_args.iter().map(|a| a.to_string()));
    args
}

fn is_installed(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Authenticate CLI tools for a profile based on its platform
pub fn authenticate(profile_name: &str, profile: &Profile) -> Result<()> {
    let kind = profile.platform.kind;
    let Some(tool) = login_tool(kind) else {
        bail!(
            "{} has no CLI login. Store a token instead: forgehop add {} --token <token>",
            kind.display_name(),
            profile_name
        );
    };

    if !is_installed(tool.program) {
        bail!("{} is not installed. Install it from {}", tool.display, tool.install_url);
    }

    let args = login_args(&tool, profile.default_host());
    debug!(program = tool.program, ?args, "Running CLI login");

    let status = Command::new(tool.program)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to run {} auth login", tool.program))?;

    if !status.success() {
        bail!("{} authentication failed", kind.display_name());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_args_public_host() {
        let gh = login_tool(PlatformKind::Github).unwrap();
        assert_eq!(
            login_args(&gh, "github.com"),
            vec!["auth", "login", "--git-protocol", "ssh"]
        );
    }

    #[test]
    fn test_login_args_self_hosted() {
        let glab = login_tool(PlatformKind::Gitlab).unwrap();
        assert_eq!(
            login_args(&glab, "gitlab.corp.io"),
            vec!["auth", "login", "--hostname", "gitlab.corp.io"]
        );
    }

    #[test]
    fn test_no_cli_for_other_platforms() {
        assert!(login_tool(PlatformKind::Bitbucket).is_none());
        assert!(login_tool(PlatformKind::Gitea).is_none());
    }
}
