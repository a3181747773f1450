//! Shell-style filename patterns for the retention pruner.
//!
//! Patterns match a single file name, never a path: `*` and `?` do not cross
//! anything because there is nothing to cross. A hidden file (leading `.`) is
//! only matched by a pattern that itself starts with a literal `.`.

#![allow(missing_docs)]

use regex::Regex;

use crate::core::errors::{JanitorError, Result};

/// A compiled filename pattern.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    original: String,
    compiled: Regex,
}

impl FilenamePattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        Ok(Self {
            original: pattern.to_string(),
            compiled: glob_to_regex(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub fn is_match(&self, filename: &str) -> bool {
        if filename.starts_with('.') && !self.original.starts_with('.') {
            return false;
        }
        self.compiled.is_match(filename)
    }
}

impl std::fmt::Display for FilenamePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

/// Split the comma-separated pattern argument.
///
/// Items are trimmed and empty items dropped; nothing left is a usage error.
pub fn split_patterns(raw: &str) -> Result<Vec<String>> {
    let patterns: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect();
    if patterns.is_empty() {
        return Err(JanitorError::Usage {
            details: format!("no file patterns in {raw:?}"),
        });
    }
    Ok(patterns)
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let invalid = |details: &str| JanitorError::InvalidPattern {
        pattern: pattern.to_string(),
        details: details.to_string(),
    };
    if pattern.is_empty() {
        return Err(invalid("empty pattern"));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                regex_str.push_str(".*");
                i += 1;
            }
            '?' => {
                regex_str.push('.');
                i += 1;
            }
            '[' => {
                i = push_class(&chars, i, &mut regex_str)
                    .ok_or_else(|| invalid("unterminated '['"))?;
            }
            c => {
                push_literal(&mut regex_str, c);
                i += 1;
            }
        }
    }

    regex_str.push('$');

    // Dot-matches-newline so `*` covers names with odd bytes too.
    Regex::new(&format!("(?s){regex_str}")).map_err(|err| invalid(&err.to_string()))
}

/// Translate a `[...]` class starting at `chars[start]`.
///
/// Returns the index just past the closing `]`, or `None` when unterminated.
/// A `]` right after `[` or `[!` is a literal member, as in shells.
fn push_class(chars: &[char], start: usize, out: &mut String) -> Option<usize> {
    let mut i = start + 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let body_start = i;
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while chars.get(i)? != &']' {
        i += 1;
    }

    out.push('[');
    if negated {
        out.push('^');
    }
    for &c in &chars[body_start..i] {
        // Inside a regex class only these need escaping; '-' keeps its range meaning.
        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(']');
    Some(i + 1)
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}
