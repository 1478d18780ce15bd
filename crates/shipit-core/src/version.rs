//! Version marker resolution.
//!
//! The release version is declared in exactly one place: a marker file in
//! the repository containing a single `<key> = <value>` assignment. The
//! resolver is pure and deterministic; the same content always yields the
//! same marker or the same error.

use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::{Error, Result};

// Accepted marker grammar: dotted numeric release (at least two segments),
// optional aN/bN/rcN pre-release, optional .postN / .devN, optional
// semver-style -suffix tail.
static MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(\.\d+)+((a|b|rc)\d+)?(\.post\d+)?(\.dev\d+)?(-[0-9A-Za-z][0-9A-Za-z.-]*)?$")
        .unwrap()
});

/// A validated version marker, e.g. `1.4.0` or `2.0.0rc1`.
///
/// Constructed only through [`VersionMarker::parse`] or the resolver, so a
/// value of this type is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct VersionMarker(String);

impl VersionMarker {
    /// Validate a candidate value against the marker grammar.
    pub fn parse(value: &str) -> Result<Self> {
        if MARKER_REGEX.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::VersionFormat(format!(
                "value {value:?} does not match the version grammar"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolve the version marker from marker-file content.
///
/// Blank lines and `#` comment lines are ignored. Exactly one line must
/// remain and it must be a `<key> = <value>` assignment; the value is
/// trimmed and surrounding matching quotes are stripped before validation.
pub fn resolve_marker(content: &str) -> Result<VersionMarker> {
    let candidates: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let line = match candidates.as_slice() {
        [] => {
            return Err(Error::VersionFormat(
                "no assignment line found in marker file".to_string(),
            ));
        }
        [line] => *line,
        more => {
            return Err(Error::VersionFormat(format!(
                "expected exactly one assignment line, found {}",
                more.len()
            )));
        }
    };

    let Some((key, raw_value)) = line.split_once('=') else {
        return Err(Error::VersionFormat(format!(
            "line {line:?} is not a `<key> = <value>` assignment"
        )));
    };

    if key.trim().is_empty() {
        return Err(Error::VersionFormat(format!(
            "assignment {line:?} has an empty key"
        )));
    }

    VersionMarker::parse(strip_quotes(raw_value.trim()))
}

/// Read and resolve the marker file at `path`.
///
/// A missing marker file is a version resolution failure like any other
/// unresolvable marker; other IO failures surface as IO errors.
pub fn read_marker(path: &Path) -> Result<VersionMarker> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::VersionFormat(format!("marker file {} not found", path.display()))
        }
        _ => Error::Io(e),
    })?;
    resolve_marker(&content)
}

/// Strip one pair of surrounding matching quotes, if present.
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
