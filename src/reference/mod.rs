//! Decomposition of Git hosting URLs and short-hand references, and
//! re-derivation of raw, API and web URLs from the parsed form.

mod parse;
mod synth;

pub use parse::parse;

use crate::platform::PlatformKind;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

/// Ref assumed when a URL does not name one. Repositories whose default
/// branch is not `main` need an explicit `--branch`.
pub const DEFAULT_REF: &str = "main";

/// Entries requested per GitLab tree page; a shorter page is the last one.
pub const TREE_PAGE_SIZE: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Not a recognized Git reference: {0}")]
    Parse(String),
    #[error("No file path in reference to {owner}/{repo}")]
    NoFilePath { owner: String, repo: String },
    #[error("{0} has no supported listing API for this host")]
    UnsupportedPlatform(&'static str),
}

/// What the ref names. Only Gitea puts this in its URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefKind {
    #[default]
    Branch,
    Tag,
    Commit,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
            RefKind::Commit => "commit",
        }
    }

    pub(crate) fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "branch" => Some(RefKind::Branch),
            "tag" => Some(RefKind::Tag),
            "commit" => Some(RefKind::Commit),
            _ => None,
        }
    }
}

/// A location inside a hosted repository.
///
/// `path` is decoded, never starts or ends with `/`; `None` means the
/// repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub platform: PlatformKind,
    pub domain: String,
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    pub ref_kind: RefKind,
    pub path: Option<String>,
    pub is_directory: bool,
    /// Set when the input already was a raw-content URL.
    pub precomputed_raw_url: Option<String>,
}

impl ParsedReference {
    /// Replace the ref (from `--branch`, `--tag` or `--commit`). Any
    /// precomputed raw URL is dropped since it names the old ref.
    pub fn with_ref(mut self, git_ref: &str, kind: RefKind) -> Self {
        self.git_ref = git_ref.to_string();
        self.ref_kind = kind;
        self.precomputed_raw_url = None;
        self
    }

    /// Same repository and ref, different path inside it.
    pub fn with_path(&self, path: &str, is_directory: bool) -> Self {
        let path = path.trim_matches('/');
        Self {
            path: (!path.is_empty()).then(|| path.to_string()),
            is_directory,
            precomputed_raw_url: None,
            ..self.clone()
        }
    }

    /// `owner/repo`, the form used in remotes and API project ids.
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Escaped within a single path segment; `/` separates segments so it is escaped too.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode each segment of a repository path for use in a URL path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

pub(crate) fn strip_git_suffix(repo: &str) -> &str {
    repo.strip_suffix(".git").unwrap_or(repo)
}
