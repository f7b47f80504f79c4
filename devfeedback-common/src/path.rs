//! Canonical project-relative paths.
//!
//! The file watcher reports absolute, OS-specific paths while the browser
//! runtime reports URL-ish paths relative to the dev server root. Both are
//! reduced to the same key here: relative to the project root, forward
//! slashes, no leading slash.

use std::path::Path;

/// Normalize a path that is already relative to the project root.
///
/// Replaces backslashes with forward slashes and strips leading `/` and
/// `./` segments. Idempotent.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut rest = unified.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_string()
}

/// Make `raw` relative to `root` (when it lies under it) and normalize it.
///
/// Paths outside the root and paths that are already relative pass through
/// [`normalize`] unchanged.
pub fn relative_to_root(root: &Path, raw: &str) -> String {
    let root_text = root.to_string_lossy().replace('\\', "/");
    let root_text = root_text.trim_end_matches('/');
    let raw_text = raw.replace('\\', "/");

    if !root_text.is_empty() {
        if let Some(rest) = raw_text.strip_prefix(root_text) {
            if rest.is_empty() || rest.starts_with('/') {
                return normalize(rest);
            }
        }
    }

    normalize(&raw_text)
}
