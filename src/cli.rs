use crate::reference::RefKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forgehop")]
#[command(
    author,
    version,
    about = "Switch Git identities and fetch files across GitHub, GitLab, Bitbucket and Gitea"
)]
pub struct Cli {
    /// Print diagnostic logs to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize forgehop configuration directory and create empty config
    Init,

    /// Add a new profile interactively
    Add(AddArgs),

    /// Remove a profile
    Remove {
        /// Profile name to remove (interactive if not provided)
        name: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,

        /// Also remove SSH config entry
        #[arg(long)]
        clean_ssh: bool,
    },

    /// List all configured profiles
    List,

    /// Switch to a profile
    Use {
        /// Profile name to switch to (interactive if not provided)
        name: Option<String>,

        /// Apply globally instead of to current repository
        #[arg(short, long)]
        global: bool,

        /// Leave the origin remote URL untouched
        #[arg(long)]
        keep_remote: bool,
    },

    /// Authenticate CLI tools (gh/glab) for a profile
    Auth {
        /// Profile name to authenticate (interactive if not provided)
        name: Option<String>,
    },

    /// Test SSH and token access for a profile
    Test {
        /// Profile name to test (interactive if not provided)
        name: Option<String>,
    },

    /// Show current active profile
    Current {
        /// Machine-readable output for shell prompts
        #[arg(long)]
        porcelain: bool,
    },

    /// Auto-detect appropriate profile from repository remote
    Detect {
        /// Automatically apply detected profile without prompting
        #[arg(short, long)]
        auto: bool,
    },

    /// Sync SSH config with all profiles
    #[command(name = "ssh-sync")]
    SshSync,

    /// Generate a new ed25519 SSH key for a profile
    Keygen {
        /// Profile name the key belongs to
        name: String,

        /// Comment stored in the key (defaults to the profile email)
        #[arg(long)]
        email: Option<String>,
    },

    /// Copy an existing private key into ~/.ssh for a profile
    #[command(name = "import-key")]
    ImportKey {
        /// Profile name the key belongs to
        name: String,

        /// Path of the private key to import
        path: PathBuf,
    },

    /// Clone a repository through a profile's SSH alias
    Clone {
        /// Repository URL, SSH remote or owner/repo
        url: String,

        /// Target directory
        directory: Option<PathBuf>,

        /// Profile to clone with (detected from the host if not provided)
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Download a file, directory or pattern from a Git host, or any URL
    #[command(visible_aliases = ["get", "fetch-file"])]
    Dl(DownloadArgs),

    /// Download an entire directory from a Git host
    #[command(name = "dl-dir")]
    DlDir(DownloadArgs),

    /// Download assets from a GitHub release
    #[command(name = "dl-release")]
    DlRelease(ReleaseArgs),
}

#[derive(Args, Debug, Default)]
pub struct AddArgs {
    /// Profile name (e.g., 'work', 'personal')
    pub name: Option<String>,

    /// Git user name
    #[arg(long)]
    pub user_name: Option<String>,

    /// Git email
    #[arg(long)]
    pub email: Option<String>,

    /// Platform: github, gitlab, bitbucket, gitea or other
    #[arg(long)]
    pub platform: Option<String>,

    /// Domain of a self-hosted instance (required for 'other')
    #[arg(long)]
    pub domain: Option<String>,

    /// REST API base URL of a self-hosted instance
    #[arg(long)]
    pub api_url: Option<String>,

    /// Path to SSH private key
    #[arg(long)]
    pub ssh_key: Option<String>,

    /// Username for HTTPS token authentication
    #[arg(long, requires = "token")]
    pub username: Option<String>,

    /// Personal access token for HTTPS authentication
    #[arg(long)]
    pub token: Option<String>,

    /// GPG signing key ID (optional)
    #[arg(long)]
    pub gpg_key: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct DownloadArgs {
    /// Git URL, owner/repo/path short form, or any http(s) URL
    #[arg(required_unless_present = "file_list")]
    pub url: Option<String>,

    /// Custom output filename
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output directory
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// Keep the repository path structure for single files
    #[arg(long)]
    pub preserve_path: bool,

    /// Download every URL listed in a file (one per line, '#' comments)
    #[arg(short = 'f', long, conflicts_with = "url")]
    pub file_list: Option<PathBuf>,

    /// Download files matching a glob pattern
    #[arg(long)]
    pub pattern: Option<String>,

    /// Exclude files matching a glob pattern
    #[arg(long, requires = "pattern")]
    pub exclude: Option<String>,

    /// Branch to read from
    #[arg(short, long, conflicts_with_all = ["tag", "commit"])]
    pub branch: Option<String>,

    /// Tag to read from
    #[arg(short, long, conflicts_with = "commit")]
    pub tag: Option<String>,

    /// Commit to read from
    #[arg(short, long)]
    pub commit: Option<String>,

    /// Maximum directory depth
    #[arg(long)]
    pub depth: Option<usize>,

    /// Show file info before downloading
    #[arg(long)]
    pub info: bool,

    /// Overwrite existing files
    #[arg(long)]
    pub overwrite: bool,

    /// Custom user agent string
    #[arg(short = 'A', long)]
    pub user_agent: Option<String>,

    /// Extra HTTP header, 'Name: value' (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Don't follow redirects
    #[arg(long)]
    pub no_redirect: bool,

    /// Answer yes to confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

impl DownloadArgs {
    /// The ref override and its kind, if any of --branch, --tag or --commit was given.
    pub fn git_ref(&self) -> Option<(&str, RefKind)> {
        let commit = self.commit.as_deref().map(|r| (r, RefKind::Commit));
        let tag = self.tag.as_deref().map(|r| (r, RefKind::Tag));
        let branch = self.branch.as_deref().map(|r| (r, RefKind::Branch));
        commit.or(tag).or(branch)
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct ReleaseArgs {
    /// GitHub repository URL or owner/repo
    pub repo: String,

    /// Only offer assets whose name contains this text
    #[arg(long)]
    pub asset: Option<String>,

    /// Release tag (defaults to the latest release)
    #[arg(long = "version", id = "release_version")]
    pub version: Option<String>,

    /// Output directory
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// Overwrite existing files
    #[arg(long)]
    pub overwrite: bool,

    /// Download every matching asset without prompting
    #[arg(short, long)]
    pub yes: bool,
}
