//! Rules for user-chosen names, slugs, variable keys, and file paths.
//!
//! Slugs and variable keys become storage key segments, and variable paths
//! become files on developer machines, so all three are validated strictly.

use std::path::{Component, Path};

use crate::error::ServiceError;

const MAX_NAME_LEN: usize = 100;
const MAX_SLUG_LEN: usize = 63;
const MAX_KEY_LEN: usize = 256;
const MAX_PATH_LEN: usize = 512;

/// Default file a variable is written to.
pub const DEFAULT_VARIABLE_PATH: &str = ".env";

fn invalid(reason: impl Into<String>) -> ServiceError {
    ServiceError::InvalidInput {
        reason: reason.into(),
    }
}

/// Derive a slug from a display name: `"My App (EU)"` becomes `"my-app-eu"`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    slug.trim_end_matches('-').to_owned()
}

/// Trim and check a display name.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidInput`] for blank or overlong names.
pub fn clean_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid(format!("name must be at most {MAX_NAME_LEN} characters")));
    }
    Ok(name.to_owned())
}

/// Use the explicit slug if given, otherwise derive one from `name`.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidInput`] if the result is not a valid slug.
pub fn resolve_slug(explicit: Option<&str>, name: &str) -> Result<String, ServiceError> {
    let slug = match explicit {
        Some(s) => s.trim().to_owned(),
        None => slugify(name),
    };
    check_slug(&slug)?;
    Ok(slug)
}

/// Slugs are 1-63 chars of `[a-z0-9-]`, not starting or ending with `-`.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidInput`] when the rule is violated.
pub fn check_slug(slug: &str) -> Result<(), ServiceError> {
    let valid = !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(invalid(format!(
            "slug '{slug}' must be 1-{MAX_SLUG_LEN} lowercase letters, digits, or hyphens"
        )))
    }
}

/// Variable keys are shell identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidInput`] when the rule is violated.
pub fn check_variable_key(key: &str) -> Result<(), ServiceError> {
    let mut bytes = key.bytes();
    let valid = key.len() <= MAX_KEY_LEN
        && bytes
            .next()
            .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(invalid(format!(
            "variable key '{key}' must match [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

/// Normalise a variable's target file, defaulting to [`DEFAULT_VARIABLE_PATH`].
///
/// Paths must be relative and must not climb out of the project directory.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidInput`] for absolute, escaping, or overlong paths.
pub fn clean_variable_path(path: Option<&str>) -> Result<String, ServiceError> {
    let path = path.map(str::trim).filter(|p| !p.is_empty());
    let Some(path) = path else {
        return Ok(DEFAULT_VARIABLE_PATH.to_owned());
    };

    if path.len() > MAX_PATH_LEN || path.contains('\0') {
        return Err(invalid("variable path is too long or contains NUL"));
    }
    let confined = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && !path.starts_with('\\');
    if !confined {
        return Err(invalid(format!(
            "variable path '{path}' must be relative and stay inside the project"
        )));
    }
    Ok(path.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("My App (EU)"), "my-app-eu");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn resolve_slug_prefers_explicit() {
        assert_eq!(resolve_slug(Some("acme"), "Whatever").unwrap(), "acme");
        assert_eq!(resolve_slug(None, "Acme Corp").unwrap(), "acme-corp");
        assert!(resolve_slug(None, "???").is_err());
        assert!(resolve_slug(Some("Bad Slug"), "x").is_err());
    }

    #[test]
    fn variable_keys_are_identifiers() {
        assert!(check_variable_key("DATABASE_URL").is_ok());
        assert!(check_variable_key("_private").is_ok());
        assert!(check_variable_key("1ABC").is_err());
        assert!(check_variable_key("A-B").is_err());
        assert!(check_variable_key("a/b").is_err());
        assert!(check_variable_key("").is_err());
    }

    #[test]
    fn variable_paths_stay_inside_the_project() {
        assert_eq!(clean_variable_path(None).unwrap(), ".env");
        assert_eq!(clean_variable_path(Some("  ")).unwrap(), ".env");
        assert_eq!(
            clean_variable_path(Some("apps/api/.env.production")).unwrap(),
            "apps/api/.env.production"
        );
        assert!(clean_variable_path(Some("../.bashrc")).is_err());
        assert!(clean_variable_path(Some("/etc/passwd")).is_err());
        assert!(clean_variable_path(Some("a/../../b")).is_err());
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(clean_name("  Acme  ").unwrap(), "Acme");
        assert!(clean_name("   ").is_err());
        assert!(clean_name(&"x".repeat(101)).is_err());
    }
}
