//! Glob patterns over repository-relative paths.
//!
//! `*` matches any run of characters (including `/`), `?` matches exactly one
//! character, and `**/` matches zero or more leading path segments. Every
//! other character, `.` included, is literal.

use crate::walker::FileEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(Vec<char>),
    AnyChar,
    AnySequence,
    AnyDirectories,
}

/// A pattern compiled once into a token list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    tokens: Vec<Token>,
}

impl Glob {
    pub fn new(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut literal = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let token = match chars[i] {
                '*' if chars.get(i + 1) == Some(&'*') && chars.get(i + 2) == Some(&'/') => {
                    i += 3;
                    Token::AnyDirectories
                }
                '*' => {
                    while chars.get(i) == Some(&'*') {
                        i += 1;
                    }
                    Token::AnySequence
                }
                '?' => {
                    i += 1;
                    Token::AnyChar
                }
                c => {
                    literal.push(c);
                    i += 1;
                    continue;
                }
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            // Adjacent wildcards collapse; `**/*` is still two tokens.
            if !(token == Token::AnySequence && tokens.last() == Some(&Token::AnySequence)) {
                tokens.push(token);
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self { tokens }
    }

    pub fn matches(&self, path: &str) -> bool {
        let text: Vec<char> = path.chars().collect();
        Matcher {
            memo: vec![None; (self.tokens.len() + 1) * (text.len() + 1)],
            tokens: &self.tokens,
            text: &text,
        }
        .matches_from(0, 0)
    }
}

/// Backtracking matcher memoized on (token index, text index).
struct Matcher<'a> {
    tokens: &'a [Token],
    text: &'a [char],
    memo: Vec<Option<bool>>,
}

impl Matcher<'_> {
    fn matches_from(&mut self, token: usize, pos: usize) -> bool {
        let slot = token * (self.text.len() + 1) + pos;
        if let Some(known) = self.memo[slot] {
            return known;
        }

        let (tokens, text) = (self.tokens, self.text);
        let result = match tokens.get(token) {
            None => pos == text.len(),
            Some(Token::Literal(literal)) => {
                text[pos..].starts_with(literal) && self.matches_from(token + 1, pos + literal.len())
            }
            Some(Token::AnyChar) => pos < text.len() && self.matches_from(token + 1, pos + 1),
            Some(Token::AnySequence) => (pos..=text.len()).any(|skip| self.matches_from(token + 1, skip)),
            Some(Token::AnyDirectories) => {
                self.matches_from(token + 1, pos)
                    || (pos..text.len())
                        .filter(|&i| text[i] == '/')
                        .any(|slash| self.matches_from(token + 1, slash + 1))
            }
        };

        self.memo[slot] = Some(result);
        result
    }
}

/// Include pattern plus optional exclude pattern.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    include: Glob,
    exclude: Option<Glob>,
}

impl GlobFilter {
    pub fn new(include: &str, exclude: Option<&str>) -> Self {
        Self {
            include: Glob::new(include),
            exclude: exclude.map(Glob::new),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.include.matches(path) && !self.exclude.as_ref().is_some_and(|g| g.matches(path))
    }

    pub fn apply(&self, files: Vec<FileEntry>) -> Vec<FileEntry> {
        files
            .into_iter()
            .filter(|f| self.matches(&f.relative_path))
            .collect()
    }
}
