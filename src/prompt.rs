use crate::config::Config;
use crate::git::{self, ConfigScope};
use anyhow::Result;
use colored::Colorize;

/// Profile whose name and email both equal the given identity
fn match_profile(config: &Config, name: &str, email: &str) -> Option<String> {
    config
        .profile_names()
        .into_iter()
        .find(|profile_name| {
            config
                .get_profile(profile_name)
                .is_some_and(|p| p.name == name && p.email == email)
        })
        .cloned()
}

/// Get the current profile name based on git config, local first
pub fn get_current_profile(config: &Config) -> Result<Option<String>> {
    let (name, email) = git::get_current_user(ConfigScope::Local)?;

    let (name, email) = if name.is_none() && email.is_none() {
        git::get_current_user(ConfigScope::Global)?
    } else {
        (name, email)
    };

    Ok(match (name, email) {
        (Some(name), Some(email)) => match_profile(config, &name, &email),
        _ => None,
    })
}

/// Output current profile for shell prompt (porcelain mode)
pub fn output_porcelain(config: &Config) -> Result<()> {
    if let Some(profile_name) = get_current_profile(config)? {
        println!("{}", profile_name);
    }
    Ok(())
}

/// Output current profile with formatting (human-readable mode)
pub fn output_human(config: &Config) -> Result<()> {
    if !git::is_git_repo() {
        println!("Not in a git repository");
        return Ok(());
    }

    if let Some(profile_name) = get_current_profile(config)? {
        if let Some(profile) = config.get_profile(&profile_name) {
            println!("Current profile: {}", profile_name.cyan().bold());
            println!("  Name:     {}", profile.name);
            println!("  Email:    {}", profile.email);
            println!(
                "  Platform: {} ({})",
                profile.platform.kind.display_name(),
                profile.default_host()
            );
        }
    } else {
        let (name, email) = git::get_current_user(ConfigScope::Local)?;
        let (global_name, global_email) = git::get_current_user(ConfigScope::Global)?;

        let name = name.or(global_name);
        let email = email.or(global_email);

        if name.is_some() || email.is_some() {
            println!("Current git identity (no matching profile):");
            if let Some(n) = name {
                println!("  Name:  {}", n);
            }
            if let Some(e) = email {
                println!("  Email: {}", e);
            }
        } else {
            println!("No git identity configured");
        }
    }

    if let Some(url) = git::get_remote_url("origin")? {
        println!("  Remote:   {}", url.dimmed());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformConfig;
    use crate::profile::Profile;

    #[test]
    fn test_match_profile_needs_name_and_email() {
        let mut config = Config::default();
        config.profiles.insert(
            "work".to_string(),
            Profile::new(
                "Jo Doe".to_string(),
                "jo@corp.dev".to_string(),
                PlatformConfig::default(),
                Some("~/.ssh/id_work".to_string()),
                None,
                None,
            ),
        );

        assert_eq!(match_profile(&config, "Jo Doe", "jo@corp.dev").as_deref(), Some("work"));
        assert_eq!(match_profile(&config, "Jo Doe", "jo@home.dev"), None);
    }
}
