//! Input checks for externally supplied identifiers and paths.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::OrchestratorError;
use crate::batch::BatchManifest;

const MAX_IDENTIFIER_LEN: usize = 128;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9._-]*$").expect("identifier pattern is valid")
});

/// Batch and order ids become collection names, so they are restricted to
/// `[A-Za-z0-9._-]` with no leading dot.
pub(crate) fn validate_identifier(what: &str, id: &str) -> Result<(), OrchestratorError> {
    let valid = id.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(id);
    if valid {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidRequest(format!(
            "invalid {} id '{}'",
            what, id
        )))
    }
}

pub(crate) fn validate_identity(identity: &str) -> Result<(), OrchestratorError> {
    if identity.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest(
            "identity must not be empty".to_string(),
        ));
    }
    Ok(())
}

static SHA256_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{64}$").expect("digest pattern is valid"));

/// Relative, slash-separated, no empty or dot segments.
fn is_relative_path(path: &str) -> bool {
    let trimmed = path.trim_matches('/');
    !trimmed.is_empty()
        && !path.starts_with('/')
        && !trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
}

/// Order items are production-relative paths; they may not climb out.
pub(crate) fn validate_item(item: &str) -> Result<(), OrchestratorError> {
    if !is_relative_path(item) {
        return Err(OrchestratorError::InvalidRequest(format!(
            "invalid item path '{}'",
            item
        )));
    }
    Ok(())
}

/// A manifest must list at least one file, each once, with a SHA-256 digest.
pub(crate) fn validate_manifest(manifest: &BatchManifest) -> Result<(), OrchestratorError> {
    let invalid = |message: String| -> Result<(), OrchestratorError> {
        Err(OrchestratorError::InvalidRequest(message))
    };
    if manifest.files.is_empty() {
        return invalid("manifest lists no files".to_string());
    }

    let mut seen = HashSet::new();
    for entry in &manifest.files {
        if !is_relative_path(&entry.path) || entry.path.ends_with('/') {
            return invalid(format!("invalid manifest path '{}'", entry.path));
        }
        if !SHA256_HEX.is_match(&entry.sha256) {
            return invalid(format!("invalid sha256 for '{}'", entry.path));
        }
        if !seen.insert(entry.path.as_str()) {
            return invalid(format!("'{}' is listed twice", entry.path));
        }
    }
    Ok(())
}
