//! Route path patterns compiled to regular expressions.
//!
//! Supported syntax:
//!
//! - literal segments, matched case-insensitively
//! - `:name` - one path segment, captured as `name`
//! - `:name?`, `:name+`, `:name*` - optional / repeated segments
//! - `:name(\d+)` - a segment restricted by a custom pattern
//! - `(\d+)` - an unnamed group, captured under its index
//! - `*` - anything, captured under its index
//! - `\:` - escapes a special character
//!
//! A single trailing slash on the request path is always tolerated.

use regex::Regex;
use std::fmt;

use crate::RouterError;

/// Pattern used for a parameter without a custom group
const DEFAULT_SEGMENT: &str = "[^/]+?";

/// A path pattern as given at registration time
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Parameterized path such as `/users/:id`
    Path(String),
    /// Free-form regular expression, matched against the path as is
    Regex(Regex),
}

impl From<&str> for RoutePattern {
    fn from(path: &str) -> Self {
        RoutePattern::Path(path.to_string())
    }
}

impl From<String> for RoutePattern {
    fn from(path: String) -> Self {
        RoutePattern::Path(path)
    }
}

impl From<&String> for RoutePattern {
    fn from(path: &String) -> Self {
        RoutePattern::Path(path.clone())
    }
}

impl From<Regex> for RoutePattern {
    fn from(regex: Regex) -> Self {
        RoutePattern::Regex(regex)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePattern::Path(path) => f.write_str(path),
            RoutePattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// Where a parameter's value lives in the match
#[derive(Debug, Clone)]
enum Slot {
    Named(String),
    Index(usize),
}

#[derive(Debug, Clone)]
struct ParamKey {
    name: String,
    slot: Slot,
}

/// Captured parameters in pattern order, still percent-encoded
pub type RawParams = Vec<(String, Option<String>)>;

/// A compiled route pattern
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    keys: Vec<ParamKey>,
}

impl CompiledPattern {
    /// Compile a pattern
    pub fn compile(pattern: &RoutePattern) -> Result<Self, RouterError> {
        match pattern {
            RoutePattern::Path(path) => compile_path(path),
            RoutePattern::Regex(regex) => Ok(from_regex(regex)),
        }
    }

    /// The pattern as it was registered
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names in capture order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.name.as_str())
    }

    /// Whether `path` matches
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path`, returning every parameter in order. Parameters that
    /// did not participate in the match are `None`.
    pub fn captures(&self, path: &str) -> Option<RawParams> {
        let caps = self.regex.captures(path)?;
        let params = self
            .keys
            .iter()
            .map(|key| {
                let value = match &key.slot {
                    Slot::Named(group) => caps.name(group),
                    Slot::Index(index) => caps.get(*index),
                };
                (key.name.clone(), value.map(|m| m.as_str().to_string()))
            })
            .collect();
        Some(params)
    }
}

fn from_regex(regex: &Regex) -> CompiledPattern {
    let mut unnamed = 0usize;
    let keys = regex
        .capture_names()
        .enumerate()
        .skip(1)
        .map(|(index, name)| {
            let name = name.map(str::to_string).unwrap_or_else(|| {
                unnamed += 1;
                (unnamed - 1).to_string()
            });
            ParamKey {
                name,
                slot: Slot::Index(index),
            }
        })
        .collect();
    CompiledPattern {
        source: regex.as_str().to_string(),
        regex: regex.clone(),
        keys,
    }
}

// ============================================================================
// Path compilation
// ============================================================================

struct PathCompiler<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    body: String,
    literal: String,
    keys: Vec<ParamKey>,
    unnamed: usize,
}

fn compile_path(path: &str) -> Result<CompiledPattern, RouterError> {
    let mut compiler = PathCompiler {
        source: path,
        chars: path.chars().collect(),
        pos: 0,
        body: String::new(),
        literal: String::new(),
        keys: Vec::new(),
        unnamed: 0,
    };
    compiler.run()?;

    let body = compiler.body.strip_suffix('/').unwrap_or(&compiler.body);
    let expression = format!("(?i)^{}/?$", body);
    let regex = Regex::new(&expression).map_err(|e| RouterError::InvalidPattern {
        pattern: path.to_string(),
        reason: e.to_string(),
    })?;

    Ok(CompiledPattern {
        source: path.to_string(),
        regex,
        keys: compiler.keys,
    })
}

impl PathCompiler<'_> {
    fn run(&mut self) -> Result<(), RouterError> {
        while let Some(&c) = self.chars.get(self.pos) {
            match c {
                '\\' => {
                    let escaped = self.chars.get(self.pos + 1).copied().unwrap_or('\\');
                    self.literal.push(escaped);
                    self.pos += 2;
                }
                ':' if self.peek_is_name(self.pos + 1) => {
                    self.pos += 1;
                    let name = self.read_name();
                    let pattern = match self.chars.get(self.pos) {
                        Some('(') => self.read_group()?,
                        _ => DEFAULT_SEGMENT.to_string(),
                    };
                    let modifier = self.read_modifier();
                    self.push_param(name, &pattern, modifier);
                }
                '(' => {
                    let pattern = self.read_group()?;
                    let modifier = self.read_modifier();
                    let name = self.next_unnamed();
                    self.push_param(name, &pattern, modifier);
                }
                '*' => {
                    self.pos += 1;
                    self.flush_literal();
                    let name = self.next_unnamed();
                    let slot = self.next_slot();
                    self.body.push_str(&format!("(?P<{}>.*)", slot));
                    self.keys.push(ParamKey {
                        name,
                        slot: Slot::Named(slot),
                    });
                }
                _ => {
                    self.literal.push(c);
                    self.pos += 1;
                }
            }
        }
        self.flush_literal();
        Ok(())
    }

    fn peek_is_name(&self, pos: usize) -> bool {
        self.chars.get(pos).map_or(false, |c| is_name_char(*c))
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.peek_is_name(self.pos) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// Read a balanced `( ... )` group starting at the current position
    fn read_group(&mut self) -> Result<String, RouterError> {
        let start = self.pos + 1;
        let mut depth = 0usize;
        while let Some(&c) = self.chars.get(self.pos) {
            match c {
                '\\' => self.pos += 1,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        if inner.is_empty() {
                            return Err(self.invalid("empty group"));
                        }
                        return Ok(inner);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.invalid("unbalanced parenthesis"))
    }

    fn read_modifier(&mut self) -> Option<char> {
        match self.chars.get(self.pos) {
            Some(&m @ ('?' | '+' | '*')) => {
                self.pos += 1;
                Some(m)
            }
            _ => None,
        }
    }

    fn push_param(&mut self, name: String, pattern: &str, modifier: Option<char>) {
        // a slash right before a parameter belongs to it, so `/:id?` also
        // matches a path without the segment
        let prefix = if self.literal.ends_with('/') {
            self.literal.pop();
            "/"
        } else {
            ""
        };
        self.flush_literal();

        let slot = self.next_slot();
        let capture = match modifier {
            Some('?') => format!("(?:{prefix}(?P<{slot}>{pattern}))?"),
            Some('+') => {
                format!("{prefix}(?P<{slot}>(?:{pattern})(?:{prefix}(?:{pattern}))*)")
            }
            Some('*') => {
                format!("(?:{prefix}(?P<{slot}>(?:{pattern})(?:{prefix}(?:{pattern}))*))?")
            }
            _ => format!("{prefix}(?P<{slot}>{pattern})"),
        };
        self.body.push_str(&capture);
        self.keys.push(ParamKey {
            name,
            slot: Slot::Named(slot),
        });
    }

    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            self.body.push_str(&regex::escape(&self.literal));
            self.literal.clear();
        }
    }

    fn next_slot(&self) -> String {
        format!("p{}", self.keys.len())
    }

    fn next_unnamed(&mut self) -> String {
        self.unnamed += 1;
        (self.unnamed - 1).to_string()
    }

    fn invalid(&self, reason: &str) -> RouterError {
        RouterError::InvalidPattern {
            pattern: self.source.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
