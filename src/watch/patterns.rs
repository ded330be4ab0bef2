// src/watch/patterns.rs

//! Glob-like pattern compiler.
//!
//! A pattern source is either:
//!
//! - a raw regular expression, when it starts with [`RAW_REGEX_SENTINEL`]
//!   (`%\.go$` compiles to `\.go$`, unanchored), or
//! - a glob: `|`-separated alternatives, each resolved to an absolute,
//!   slash-normalised path and anchored at both ends.
//!
//! Glob syntax:
//!
//! | token | matches |
//! |-------|---------|
//! | `**/` | zero or more whole path segments |
//! | `*`   | one or more characters, never a separator |
//! | `?`   | exactly one non-whitespace character |
//! | `/`   | a path separator (`/` or `\` on Windows) |
//!
//! Anything else is matched literally. `**` not followed by `/` is rejected.

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::errors::{Result, WatchrunError};
use crate::watch::path_utils::absolutize;

/// Leading character that marks a pattern as a raw regular expression.
pub const RAW_REGEX_SENTINEL: char = '%';

const SEPARATOR: &str = if cfg!(windows) { r"[/\\]" } else { "/" };
const NOT_SEPARATOR: &str = if cfg!(windows) { r"[^/\\]" } else { "[^/]" };

/// Immutable compiled matcher.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl Pattern {
    /// Compile `source`, resolving relative alternatives against the current
    /// working directory.
    pub fn compile(source: &str) -> Result<Self> {
        let base = std::env::current_dir()?;
        Self::compile_in(source, &base)
    }

    /// Compile `source`, resolving relative alternatives against `base`.
    pub fn compile_in(source: &str, base: &Path) -> Result<Self> {
        if source.is_empty() {
            return Err(WatchrunError::PatternError("empty pattern".to_string()));
        }

        let expr = match source.strip_prefix(RAW_REGEX_SENTINEL) {
            Some(raw) => raw.to_string(),
            None => glob_to_regex(source, base)?,
        };

        let regex = Regex::new(&expr)
            .map_err(|e| WatchrunError::PatternError(format!("{source}: {e}")))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The source string this pattern was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The generated regular expression (useful for `--dry-run` output).
    pub fn as_regex(&self) -> &str {
        self.regex.as_str()
    }

    /// Test a slash-normalised absolute path.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn glob_to_regex(source: &str, base: &Path) -> Result<String> {
    let mut alternatives = Vec::new();
    for alt in source.split('|') {
        let resolved = absolutize(alt, base);
        alternatives.push(format!("^(?:{})$", translate(&resolved, source)?));
    }
    Ok(alternatives.join("|"))
}

fn translate(glob: &str, source: &str) -> Result<String> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '/' => out.push_str(SEPARATOR),
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) != Some(&'/') {
                    return Err(WatchrunError::PatternError(format!(
                        "invalid wildcard: {source}"
                    )));
                }
                out.push_str(&format!("(?:.*{SEPARATOR})?"));
                i += 2;
            }
            '*' => {
                out.push_str(NOT_SEPARATOR);
                out.push('+');
            }
            '?' => out.push_str(r"\S"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    Ok(out)
}
