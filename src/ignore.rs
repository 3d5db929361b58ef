//! Exclusion rules for snapshot creation.
//!
//! Rules are the built-in defaults followed by the lines of an optional
//! `.snapkeepignore` at the root of the source directory.

use std::path::{Component, Path, PathBuf};

use regex::Regex;

pub const IGNORE_FILE: &str = ".snapkeepignore";

pub const DEFAULT_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".hg/",
    "node_modules/",
    ".vscode/",
    ".idea/",
    "target/",
    "dist/",
    "build/",
    "data/",
    ".snapkeep/",
    ".snapkeep-backup-*",
    "*.log",
    "*.tmp",
    "*.swp",
];

#[derive(Debug, Clone)]
enum Rule {
    Dir(String),
    Wildcard(Regex),
    Exact(String),
}

impl Rule {
    fn compile(pattern: &str) -> Self {
        if let Some(dir) = pattern.strip_suffix('/') {
            Rule::Dir(dir.to_string())
        } else if pattern.contains('*') {
            let body = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            // Escaped literals joined by `.*` always form a valid expression
            match Regex::new(&format!("^{}$", body)) {
                Ok(re) => Rule::Wildcard(re),
                Err(_) => Rule::Exact(pattern.to_string()),
            }
        } else {
            Rule::Exact(pattern.to_string())
        }
    }

    fn is_match(&self, rel: &str) -> bool {
        match self {
            Rule::Dir(dir) => {
                rel == dir
                    || rel
                        .strip_prefix(dir.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Rule::Wildcard(re) => re.is_match(rel),
            Rule::Exact(exact) => rel == exact,
        }
    }
}

/// Test a single pattern against a forward-slash relative path.
pub fn matches(pattern: &str, rel_path: &str) -> bool {
    Rule::compile(pattern).is_match(rel_path)
}

#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    root: PathBuf,
    patterns: Vec<String>,
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    /// Defaults plus `.snapkeepignore` overrides for `source_root`.
    pub fn resolve(source_root: &Path) -> Self {
        let mut patterns: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();

        let ignore_file = source_root.join(IGNORE_FILE);
        if ignore_file.is_file() {
            match std::fs::read_to_string(&ignore_file) {
                Ok(content) => patterns.extend(parse_ignore_file(&content)),
                Err(e) => {
                    tracing::warn!(path = %ignore_file.display(), error = %e, "Cannot read ignore file");
                }
            }
        }

        Self::with_patterns(source_root, patterns)
    }

    pub fn with_patterns(source_root: &Path, patterns: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for pattern in patterns {
            if !unique.contains(&pattern) {
                unique.push(pattern);
            }
        }
        let rules = unique.iter().map(|p| Rule::compile(p)).collect();
        Self {
            root: normalize(source_root),
            patterns: unique,
            rules,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Relative forward-slash form of `path`, or `None` if it resolves
    /// outside the root.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let absolute = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        };
        let rel = absolute.strip_prefix(&self.root).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        match self.relative(path) {
            None => true,
            Some(rel) if rel.is_empty() => true,
            Some(rel) => self.is_excluded_rel(&rel),
        }
    }

    pub fn is_excluded_rel(&self, rel: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(rel))
    }
}

fn parse_ignore_file(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

/// Lexical normalization: resolves `.` and `..` without touching the disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
