//! The set of file extensions that may be created inside the watched tree.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, WatcherError};

/// Immutable set of allowed extensions.
///
/// Entries are stored lower-case and include the leading `.`.
#[derive(Debug, Clone, Default)]
pub struct AllowedExtensions {
    extensions: HashSet<String>,
}

impl AllowedExtensions {
    /// Load the allowlist from a file with one extension per line.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| WatcherError::Allowlist {
            path: path.to_path_buf(),
            source,
        })?;

        let allowlist = Self::parse(&content);
        info!(
            "Loaded {} allowed extensions from {}",
            allowlist.len(),
            path.display()
        );
        Ok(allowlist)
    }

    /// Parse allowlist content. Blank lines are ignored; there is no comment syntax.
    pub fn parse(content: &str) -> Self {
        content.lines().collect()
    }

    /// Whether the extension of `path` is in the allowlist.
    pub fn is_allowed(&self, path: &Path) -> bool {
        let extension = normalize_extension(path);
        let allowed = self.extensions.contains(&extension);
        debug!(
            "Extension {extension:?} of {} allowed: {allowed}",
            path.display()
        );
        allowed
    }

    /// Whether the given extension, in any case, is in the allowlist.
    pub fn contains(&self, extension: &str) -> bool {
        normalize_entry(extension).is_some_and(|ext| self.extensions.contains(&ext))
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowedExtensions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            extensions: iter
                .into_iter()
                .filter_map(|entry| normalize_entry(entry.as_ref()))
                .collect(),
        }
    }
}

/// Normalize one allowlist line: trimmed, lower-cased, with a leading `.`.
fn normalize_entry(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let entry = entry.to_lowercase();
    if entry.starts_with('.') {
        Some(entry)
    } else {
        Some(format!(".{entry}"))
    }
}

/// Lower-cased extension of a path, including the leading `.`.
///
/// The extension starts at the last `.` of the final path component, so a
/// dotfile such as `.bashrc` is its own extension. Names without a `.`
/// yield an empty string.
pub fn normalize_extension(path: &Path) -> String {
    let Some(name) = path.file_name() else {
        return String::new();
    };
    let name = name.to_string_lossy();

    match name.rfind('.') {
        Some(index) => name[index..].to_lowercase(),
        None => String::new(),
    }
}
