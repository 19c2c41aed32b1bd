//! `.env` file parsing, rendering, and discovery.
//!
//! Supported syntax:
//! - `KEY=VALUE`, with `export ` prefix allowed
//! - single- or double-quoted values (`\n`, `\"`, `\\` unescaped inside double quotes)
//! - `# comments` and blank lines (skipped)
//! - ` # trailing comments` after unquoted values

use std::fs;
use std::io;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Environment name for a bare `.env` file.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// A `.env*` file and the environment it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvFile {
    pub name: String,
    /// Relative to the project root, `/`-separated.
    pub path: String,
}

/// Parse `.env` content into ordered `(key, value)` pairs.
///
/// Later duplicates override earlier ones, like a shell would.
pub fn parse(content: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, raw_value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = parse_value(raw_value.trim());
        if let Some(existing) = entries.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value;
        } else {
            entries.push((key.to_owned(), value));
        }
    }

    entries
}

fn parse_value(raw: &str) -> String {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.rfind('"').map(|end| &r[..end])) {
        return unescape(inner);
    }
    if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.rfind('\'').map(|end| &r[..end])) {
        return inner.to_owned();
    }
    match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end().to_owned(),
        None => raw.to_owned(),
    }
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Render pairs back to `.env` syntax, quoting where needed.
pub fn render<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        out.push_str(&quote(value));
        out.push('\n');
    }
    out
}

fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '#' | '\\' | '$' | '`'));
    if plain {
        return value.to_owned();
    }

    let mut quoted = String::with_capacity(value.len().saturating_add(2));
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Environment name for a file name: `.env` → `default`,
/// `.env.production` → `production`. `None` for other files.
pub fn environment_name(file_name: &str) -> Option<String> {
    if file_name == ".env" {
        return Some(DEFAULT_ENVIRONMENT.to_owned());
    }
    file_name
        .strip_prefix(".env.")
        .filter(|suffix| !suffix.is_empty())
        .map(ToOwned::to_owned)
}

/// Find `.env*` files under `root`, skipping hidden directories.
///
/// # Errors
///
/// Returns the first I/O error from reading a directory.
pub fn scan(root: &Path) -> io::Result<Vec<EnvFile>> {
    let mut found = Vec::new();
    scan_dir(root, root, &mut found)?;
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn scan_dir(root: &Path, dir: &Path, found: &mut Vec<EnvFile>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if !name.starts_with('.') {
                scan_dir(root, &entry.path(), found)?;
            }
        } else if file_type.is_file() {
            if let Some(env) = environment_name(name) {
                let path = entry.path();
                let relative = path.strip_prefix(root).unwrap_or(&path);
                found.push(EnvFile {
                    name: env,
                    path: to_slash(relative),
                });
            }
        }
    }
    Ok(())
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a server-supplied path is safe to write under the project root.
pub fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
