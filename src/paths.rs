//! Path and filename helpers shared by the crawler, the record stores and
//! the unfold pipeline.
//!
//! Catalog titles are arbitrary user text, so anything that becomes a file
//! name goes through [`sanitize_filename`] first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Characters that are unsafe in a filename on at least one common platform.
const UNSAFE_FILENAME_CHARS: &str = r#"[<>:"/\\|?*\x00-\x1F]"#;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UNSAFE_FILENAME_CHARS).expect("static regex is valid"))
}

/// Replace every unsafe character with an underscore and trim the result.
///
/// A title that sanitizes to nothing becomes `_` so it can still be used as
/// a file stem.
/// `Tiles: Forest / Night` -> `Tiles_ Forest _ Night`
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name, "_");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether the final component of `path` is a hidden file (`.DS_Store`, `._icon.png`).
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Lowercase extension without the dot, if any.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

/// File name as a lossy string (empty for paths like `/` or `..`).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File stem as a lossy string.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Create the directory `path` will live in and return it.
///
/// A bare file name lives in `.`.
pub fn ensure_parent_dirs(path: &Path) -> io::Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(parent)
}
