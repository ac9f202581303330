mod auth;
mod cli;
mod config;
mod detect;
mod download;
mod git;
mod glob;
mod http;
mod platform;
mod profile;
mod prompt;
mod reference;
mod ssh;
mod ssh_keys;
mod walker;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{AddArgs, Cli, Commands};
use colored::Colorize;
use config::Config;
use git::{ConfigScope, RemoteUrl};
use http::{HttpClient, HttpSettings};
use inquire::{Confirm, Select, Text};
use platform::{build_remote_url, PlatformConfig, PlatformKind};
use profile::{Profile, TokenConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "forgehop=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => cmd_init(),
        Commands::Add(args) => cmd_add(args),
        Commands::Remove {
            name,
            force,
            clean_ssh,
        } => cmd_remove(name, force, clean_ssh),
        Commands::List => cmd_list(),
        Commands::Use {
            name,
            global,
            keep_remote,
        } => cmd_use(name, global, keep_remote),
        Commands::Auth { name } => cmd_auth(name),
        Commands::Test { name } => cmd_test(name),
        Commands::Current { porcelain } => cmd_current(porcelain),
        Commands::Detect { auto } => cmd_detect(auto),
        Commands::SshSync => cmd_ssh_sync(),
        Commands::Keygen { name, email } => cmd_keygen(&name, email),
        Commands::ImportKey { name, path } => cmd_import_key(&name, &path),
        Commands::Clone {
            url,
            directory,
            profile,
        } => cmd_clone(&url, directory, profile),
        Commands::Dl(args) => {
            let config = Config::load()?;
            download::command::run(&args, &config.download, &config.registry())
        }
        Commands::DlDir(args) => {
            let config = Config::load()?;
            download::command::run_directory(&args, &config.download, &config.registry())
        }
        Commands::DlRelease(args) => {
            let config = Config::load()?;
            download::command::run_release(&args, &config.download, &config.registry())
        }
    }
}

fn cmd_init() -> Result<()> {
    let created = Config::init()?;
    let path = Config::config_path()?;

    if created {
        println!(
            "{} Created config at {}",
            "Success:".green().bold(),
            path.display()
        );
    } else {
        println!("Config already exists at {}", path.display());
    }

    Ok(())
}

fn optional_text(message: &str, help: &str) -> Result<Option<String>> {
    let input = Text::new(message).with_help_message(help).prompt()?;
    let input = input.trim();
    Ok((!input.is_empty()).then(|| input.to_string()))
}

/// Platform from `--platform`, or an interactive pick.
fn choose_platform(platform: Option<String>) -> Result<PlatformKind> {
    if let Some(p) = platform {
        return Ok(p.parse()?);
    }

    let options = vec!["github", "gitlab", "bitbucket", "gitea", "other"];
    let selection = Select::new("Platform:", options)
        .with_help_message("Select the Git hosting platform")
        .prompt()?;
    Ok(selection.parse()?)
}

fn choose_domain(kind: PlatformKind, domain: Option<String>) -> Result<Option<String>> {
    if domain.is_some() {
        return Ok(domain);
    }
    if kind == PlatformKind::Other {
        let domain = Text::new("Domain:")
            .with_help_message("e.g., 'git.mycompany.com'")
            .prompt()?;
        return Ok(Some(domain.trim().to_string()));
    }

    let self_hosted = Confirm::new("Self-hosted instance?")
        .with_help_message("For GitHub Enterprise, self-hosted GitLab or Gitea")
        .with_default(false)
        .prompt()?;
    if !self_hosted {
        return Ok(None);
    }
    optional_text("Domain:", "e.g., 'github.company.com' or 'gitlab.myorg.com'")
}

fn cmd_add(args: AddArgs) -> Result<()> {
    let mut config = Config::load()?;

    // Get profile name
    let name = match args.name {
        Some(n) => n,
        None => Text::new("Profile name:")
            .with_help_message("e.g., 'work', 'personal', 'client-acme'")
            .prompt()?,
    };

    if config.has_profile(&name) {
        bail!(
            "Profile '{}' already exists. Use a different name or remove it first.",
            name
        );
    }

    let user_name = match args.user_name {
        Some(n) => n,
        None => Text::new("Git user name:")
            .with_help_message("This will be used for commit author")
            .prompt()?,
    };

    let email = match args.email {
        Some(e) => e,
        None => Text::new("Git email:")
            .with_help_message("This will be used for commit author")
            .prompt()?,
    };

    let kind = choose_platform(args.platform)?;
    let domain = choose_domain(kind, args.domain)?;
    let api_url = match args.api_url {
        Some(url) => Some(url),
        None if domain.is_some() && matches!(kind, PlatformKind::Gitea | PlatformKind::Other) => {
            optional_text("API URL (optional):", "e.g., 'https://git.mycompany.com/api/v1'")?
        }
        None => None,
    };
    let platform = PlatformConfig::new(kind, domain, api_url);
    platform.validate()?;

    // Credentials: flags win, otherwise SSH key or token interactively
    let (ssh_key, token) = match (args.ssh_key, args.token) {
        (None, None) => {
            let options = vec!["SSH key", "Personal access token (HTTPS)"];
            let method = Select::new("Authentication:", options).prompt()?;
            if method == "SSH key" {
                (Some(select_or_create_ssh_key(&name, &email)?), None)
            } else {
                let username = Text::new("Username:")
                    .with_help_message("Your account name on the platform")
                    .prompt()?;
                let token = inquire::Password::new("Token:")
                    .without_confirmation()
                    .prompt()?;
                (None, Some(TokenConfig { username, token }))
            }
        }
        (ssh_key, token) => {
            let token = token.map(|token| TokenConfig {
                username: args.username.unwrap_or_else(|| user_name.clone()),
                token,
            });
            (ssh_key, token)
        }
    };

    let gpg_key = match args.gpg_key {
        Some(k) => Some(k),
        None => optional_text("GPG signing key (optional):", "Press Enter to skip")?,
    };

    let profile = Profile::new(user_name, email, platform, ssh_key, token, gpg_key);
    profile.validate()?;

    let instructions = platform::instructions(&profile.platform);
    let uses_ssh = profile.uses_ssh();

    config.add_profile(name.clone(), profile)?;
    config.save()?;
    info!(profile = %name, "Added profile");

    println!();
    println!(
        "{} Added profile '{}'",
        "Success:".green().bold(),
        name.cyan()
    );
    if uses_ssh {
        println!("Add your public key at {}", instructions.ssh_key_url.cyan());
        println!("Run {} to sync SSH config", "forgehop ssh-sync".yellow());
    } else {
        println!("Manage tokens at {}", instructions.token_url.cyan());
    }

    Ok(())
}

fn print_public_key(key: &ssh_keys::SshKey, kind: PlatformKind) -> Result<()> {
    let public_key = ssh_keys::read_public_key(key)?;
    println!();
    println!(
        "{}",
        format!("Public key (add this to {}):", kind.display_name()).yellow()
    );
    println!("{}", public_key.trim());
    println!();
    Ok(())
}

/// Interactive SSH key selection or creation
fn select_or_create_ssh_key(profile_name: &str, email: &str) -> Result<String> {
    const GENERATE: &str = "+ Generate new SSH key";
    const MANUAL: &str = "+ Enter path manually";

    let existing_keys = ssh_keys::discover_keys()?;

    let mut options: Vec<String> = existing_keys
        .iter()
        .map(|k| format!("{} ({})", k.path_display(), k.key_type))
        .collect();
    options.push(GENERATE.to_string());
    options.push(MANUAL.to_string());

    let selection = Select::new("SSH key:", options)
        .with_help_message("Select an existing key or create a new one")
        .raw_prompt()?;

    match selection.value.as_str() {
        GENERATE => {
            println!("Generating new ed25519 SSH key...");
            let key = ssh_keys::generate_key(profile_name, email)?;
            println!(
                "{} Generated SSH key: {}",
                "Success:".green().bold(),
                key.path_display()
            );
            let public_key = ssh_keys::read_public_key(&key)?;
            println!();
            println!("{}", "Public key:".yellow());
            println!("{}", public_key.trim());
            println!();
            Ok(key.path_display())
        }
        MANUAL => {
            let default_path = ssh_keys::display_with_tilde(&ssh_keys::key_path_for(profile_name)?);
            let path = Text::new("SSH key path:")
                .with_default(&default_path)
                .prompt()?;
            Ok(path)
        }
        _ => {
            let key = existing_keys
                .get(selection.index)
                .context("Selected key no longer available")?;
            Ok(key.path_display())
        }
    }
}

fn select_profile(config: &Config, message: &str, name: Option<String>) -> Result<String> {
    if config.profiles.is_empty() {
        bail!("No profiles configured. Run 'forgehop add' first.");
    }

    match name {
        Some(n) => Ok(n),
        None => {
            let profiles: Vec<String> = config.profile_names().into_iter().cloned().collect();
            Ok(Select::new(message, profiles)
                .with_help_message("Use arrow keys to navigate, Enter to select")
                .prompt()?)
        }
    }
}

fn cmd_remove(name: Option<String>, force: bool, clean_ssh: bool) -> Result<()> {
    let mut config = Config::load()?;
    let name = select_profile(&config, "Select profile to remove:", name)?;

    if !config.has_profile(&name) {
        bail!("Profile '{}' not found", name);
    }

    if !force {
        let confirmed = Confirm::new(&format!("Remove profile '{}'?", name))
            .with_default(false)
            .prompt()?;

        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    config.remove_profile(&name);
    config.save()?;

    println!("{} Removed profile '{}'", "Success:".green().bold(), name);

    if clean_ssh {
        ssh::sync_ssh_config(&config)?;
        println!("SSH config updated");
    }

    Ok(())
}

fn cmd_list() -> Result<()> {
    let config = Config::load()?;

    if config.profiles.is_empty() {
        println!("No profiles configured");
        println!("Run {} to add a profile", "forgehop add".yellow());
        return Ok(());
    }

    // Get current profile if in a git repo
    let current = if git::is_git_repo() {
        prompt::get_current_profile(&config)?
    } else {
        None
    };

    println!("{}", "Profiles:".bold());
    println!();

    for name in config.profile_names() {
        let Some(profile) = config.get_profile(name) else {
            continue;
        };
        let marker = if current.as_ref() == Some(name) {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        let default_marker = if config.default_profile.as_ref() == Some(name) {
            " (default)".dimmed().to_string()
        } else {
            String::new()
        };

        println!("{} {}{}", marker, name.cyan().bold(), default_marker);
        println!("    Name:     {}", profile.name);
        println!("    Email:    {}", profile.email);
        let hosting = if profile.platform.is_self_hosted() { ", self-hosted" } else { "" };
        println!(
            "    Platform: {} ({}{})",
            profile.platform.kind.display_name(),
            profile.default_host(),
            hosting
        );
        if let Some(ref key) = profile.ssh_key {
            println!("    SSH Key:  {}", key);
            println!("    Alias:    {}", profile.ssh_host_alias(name).dimmed());
        }
        if let Some(ref token) = profile.token {
            println!("    Token:    {} (user {})", "configured".green(), token.username);
        }
        if let Some(ref gpg) = profile.gpg_key {
            println!("    GPG Key:  {}", gpg);
        }
        if let Some(ref api) = profile.platform.api_url {
            println!("    API:      {}", api);
        }
        println!();
    }

    Ok(())
}

/// Point `origin` at the profile: its SSH alias, or plain HTTPS with the token
/// stored for git's credential helper.
fn rewrite_origin(name: &str, profile: &Profile, scope: ConfigScope) -> Result<Option<String>> {
    let Some(current) = git::get_remote_url("origin")? else {
        return Ok(None);
    };
    let Some(remote) = RemoteUrl::parse(&current) else {
        debug!(url = %current, "Origin is not a recognizable remote, leaving it");
        return Ok(None);
    };

    let url = if profile.uses_ssh() {
        build_remote_url(&profile.ssh_host_alias(name), &remote.repo_path, true)
    } else if let Some(token) = &profile.token {
        let host = profile.default_host();
        git::store_credentials(host, &token.username, &token.token, scope)?;
        build_remote_url(host, &remote.repo_path, false)
    } else {
        return Ok(None);
    };

    if url == current {
        return Ok(None);
    }
    git::set_remote_url("origin", &url)?;
    Ok(Some(url))
}

fn cmd_use(name: Option<String>, global: bool, keep_remote: bool) -> Result<()> {
    let config = Config::load()?;
    let name = select_profile(&config, "Select profile:", name)?;

    let profile = config
        .get_profile(&name)
        .with_context(|| format!("Profile '{}' not found", name))?;

    let scope = if global {
        ConfigScope::Global
    } else {
        if !git::is_git_repo() {
            bail!("Not in a git repository. Use --global to set globally.");
        }
        ConfigScope::Local
    };

    git::apply_profile(
        &profile.name,
        &profile.email,
        profile.gpg_key.as_deref(),
        scope,
    )?;

    let scope_str = if global { "globally" } else { "locally" };
    println!(
        "{} Switched to profile '{}' {}",
        "Success:".green().bold(),
        name.cyan(),
        scope_str
    );
    println!("  Name:  {}", profile.name);
    println!("  Email: {}", profile.email);

    if profile.gpg_key.is_some() {
        println!("  GPG signing: enabled");
    }

    if !keep_remote && git::is_git_repo() {
        if let Some(url) = rewrite_origin(&name, profile, scope)? {
            println!("  Remote: {}", url.dimmed());
        }
    }

    Ok(())
}

fn cmd_auth(name: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let name = select_profile(&config, "Select profile to authenticate:", name)?;

    let profile = config
        .get_profile(&name)
        .with_context(|| format!("Profile '{}' not found", name))?;

    println!(
        "Authenticating CLI tools for profile '{}'...",
        name.cyan()
    );
    println!();

    auth::authenticate(&name, profile)?;

    println!();
    println!(
        "{} Authentication complete for '{}'",
        "Success:".green().bold(),
        name
    );

    Ok(())
}

fn report_check(label: &str, ok: bool, message: &str) {
    let status = if ok { "✓".green().bold() } else { "✗".red().bold() };
    println!("  {} {:<6} {}", status, label, message);
}

fn cmd_test(name: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let name = select_profile(&config, "Select profile to test:", name)?;
    let profile = config
        .get_profile(&name)
        .with_context(|| format!("Profile '{}' not found", name))?;
    let registry = config.registry();

    println!(
        "Testing profile '{}' on {}",
        name.cyan(),
        profile.default_host()
    );
    println!();

    let mut all_ok = true;

    if profile.uses_ssh() {
        let alias = profile.ssh_host_alias(&name);
        let result = ssh::test_connection(&alias, profile.platform.kind, &registry)?;
        all_ok &= result.ok;
        report_check("SSH", result.ok, &result.message);
        if !result.ok {
            println!(
                "         Run {} if the alias is missing",
                "forgehop ssh-sync".yellow()
            );
        }
    }

    if let Some(token) = &profile.token {
        let client = HttpClient::new(&HttpSettings {
            user_agent: config.download.user_agent.clone(),
            ..HttpSettings::default()
        })?;
        let status = auth::token::check_token(&client, &profile.platform, token, &registry)?;
        all_ok &= status.ok;
        report_check("Token", status.ok, &status.message);
    }

    println!();
    if all_ok {
        println!("{} Profile '{}' is working", "Success:".green().bold(), name);
        Ok(())
    } else {
        let instructions = platform::instructions(&profile.platform);
        println!("SSH keys: {}", instructions.ssh_key_url.cyan());
        println!("Tokens:   {}", instructions.token_url.cyan());
        bail!("Profile '{}' failed one or more checks", name)
    }
}

fn cmd_current(porcelain: bool) -> Result<()> {
    let config = Config::load()?;

    if porcelain {
        prompt::output_porcelain(&config)
    } else {
        prompt::output_human(&config)
    }
}

fn apply_local(config: &Config, profile_name: &str) -> Result<()> {
    if let Some(profile) = config.get_profile(profile_name) {
        git::apply_profile(
            &profile.name,
            &profile.email,
            profile.gpg_key.as_deref(),
            ConfigScope::Local,
        )?;
        println!(
            "{} Applied profile '{}'",
            "Success:".green().bold(),
            profile_name
        );
    }
    Ok(())
}

fn cmd_detect(auto: bool) -> Result<()> {
    if !git::is_git_repo() {
        bail!("Not in a git repository");
    }

    let config = Config::load()?;
    let registry = config.registry();

    match detect::detect_and_suggest(&config, &registry)? {
        Some((profile_name, reason)) => {
            println!(
                "{} Detected profile: {}",
                "Match:".green().bold(),
                profile_name.cyan().bold()
            );
            println!("  Reason: {}", reason);

            if auto {
                println!();
                apply_local(&config, &profile_name)?;
            } else if Confirm::new("Apply this profile?")
                .with_default(true)
                .prompt()?
            {
                apply_local(&config, &profile_name)?;
            } else {
                println!("Cancelled");
            }
        }
        None => {
            println!("No matching profile detected for this repository");

            if let Some(url) = git::get_remote_url("origin")? {
                println!("  Remote origin: {}", url);
                if let Some(remote) = RemoteUrl::parse(&url) {
                    let detected = registry.detect_remote(&remote.host);
                    println!(
                        "  Platform:      {} ({})",
                        detected.kind.display_name(),
                        detected.host()
                    );
                }
            }

            if !config.profiles.is_empty() && !auto {
                println!();
                let apply_manually = Confirm::new("Would you like to select a profile manually?")
                    .with_default(true)
                    .prompt()?;

                if apply_manually {
                    let name = select_profile(&config, "Select profile:", None)?;
                    apply_local(&config, &name)?;
                }
            }
        }
    }

    Ok(())
}

fn cmd_ssh_sync() -> Result<()> {
    let config = Config::load()?;

    if config.profiles.is_empty() {
        println!("No profiles to sync");
        return Ok(());
    }

    let (count, was_update) = ssh::sync_ssh_config(&config)?;

    let action = if was_update { "Updated" } else { "Added" };
    println!(
        "{} {} SSH config with {} profile(s)",
        "Success:".green().bold(),
        action,
        count
    );

    let path = ssh::ssh_config_path()?;
    println!("  File: {}", path.display());

    println!();
    println!("SSH Host aliases:");
    for name in config.profile_names() {
        if let Some(profile) = config.get_profile(name) {
            if profile.uses_ssh() {
                let alias = profile.ssh_host_alias(name);
                println!("  {} -> {}", alias.cyan(), profile.default_host());
            }
        }
    }

    Ok(())
}

/// Store `key_path` on the profile when it exists and has no key yet.
fn attach_key(config: &mut Config, name: &str, key_path: String) -> Result<Option<PlatformConfig>> {
    let Some(profile) = config.profiles.get_mut(name) else {
        return Ok(None);
    };
    let platform = profile.platform.clone();
    if profile.ssh_key.is_none() {
        profile.ssh_key = Some(key_path);
        config.save()?;
        println!("  Saved key on profile '{}'", name.cyan());
    }
    Ok(Some(platform))
}

fn print_key_next_steps(platform: &PlatformConfig) {
    let instructions = platform::instructions(platform);
    println!("Add it at:  {}", instructions.ssh_key_url.cyan());
    println!("Then test:  {}", instructions.ssh_test_command.yellow());
}

fn cmd_keygen(name: &str, email: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    let email = match email.or_else(|| config.get_profile(name).map(|p| p.email.clone())) {
        Some(email) => email,
        None => Text::new("Key comment (email):").prompt()?,
    };

    println!("Generating new ed25519 SSH key...");
    let key = ssh_keys::generate_key(name, &email)?;
    println!(
        "{} Generated SSH key: {}",
        "Success:".green().bold(),
        key.path_display()
    );

    let platform = attach_key(&mut config, name, key.path_display())?.unwrap_or_default();
    print_public_key(&key, platform.kind)?;
    print_key_next_steps(&platform);
    Ok(())
}

fn cmd_import_key(name: &str, path: &Path) -> Result<()> {
    let mut config = Config::load()?;
    let source = ssh_keys::expand_home(&path.to_string_lossy());
    let destination = ssh_keys::key_path_for(name)?;

    let key = ssh_keys::import_key(&source, &destination)?;
    println!(
        "{} Imported {} as {}",
        "Success:".green().bold(),
        source.display(),
        key.path_display()
    );

    let platform = attach_key(&mut config, name, key.path_display())?.unwrap_or_default();
    print_public_key(&key, platform.kind)?;
    print_key_next_steps(&platform);
    Ok(())
}

/// Normalize a clone target: full remotes pass through, `owner/repo` means GitHub.
fn clone_source(url: &str) -> Option<RemoteUrl> {
    RemoteUrl::parse(url).or_else(|| {
        let trimmed = url.trim_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();
        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Some(RemoteUrl {
                host: "github.com".to_string(),
                repo_path: format!("{}/{}", owner, repo.trim_end_matches(".git")),
                is_ssh: true,
            }),
            _ => RemoteUrl::parse(&format!("https://{}", trimmed)),
        }
    })
}

fn cmd_clone(url: &str, directory: Option<PathBuf>, profile_name: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let registry = config.registry();
    let remote = clone_source(url).with_context(|| format!("Not a repository URL: {}", url))?;

    let profile_name = match profile_name {
        Some(name) => name,
        None => match detect::best_match(std::slice::from_ref(&remote), &config, &registry) {
            Some(result) => {
                println!(
                    "{} Using profile {} ({})",
                    "Match:".green().bold(),
                    result.profile_name.cyan().bold(),
                    result.reason
                );
                result.profile_name
            }
            None => select_profile(&config, "Clone with profile:", None)?,
        },
    };
    let profile = config
        .get_profile(&profile_name)
        .with_context(|| format!("Profile '{}' not found", profile_name))?;

    let clone_url = if profile.uses_ssh() {
        build_remote_url(&profile.ssh_host_alias(&profile_name), &remote.repo_path, true)
    } else {
        let host = profile.default_host();
        if let Some(token) = &profile.token {
            git::store_credentials(host, &token.username, &token.token, ConfigScope::Global)?;
        }
        build_remote_url(host, &remote.repo_path, false)
    };

    println!("Cloning {}", clone_url.cyan());
    let path = git::clone_repo(&clone_url, directory.as_deref())?;

    git::set_config_in(&path, "user.name", &profile.name)?;
    git::set_config_in(&path, "user.email", &profile.email)?;
    if let Some(gpg) = &profile.gpg_key {
        git::set_config_in(&path, "user.signingkey", gpg)?;
        git::set_config_in(&path, "commit.gpgsign", "true")?;
    }

    println!(
        "{} Cloned into {} with profile '{}'",
        "Success:".green().bold(),
        path.display(),
        profile_name.cyan()
    );
    Ok(())
}
