//! Extension-based classification of pack members.

use std::collections::BTreeSet;
use std::path::Path;

use crate::archive::ArchiveFormat;
use crate::config::default_accepted_extensions;
use crate::paths;

/// What the pipeline does with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedKind {
    /// Leaf asset kept in the output tree under `<ext>/`
    Accepted(String),
    /// Container to expand recursively
    Archive(ArchiveFormat),
    Ignored,
}

/// Maps file names to a [`ClassifiedKind`].
#[derive(Debug, Clone)]
pub struct AssetClassifier {
    accepted: BTreeSet<String>,
}

impl Default for AssetClassifier {
    fn default() -> Self {
        Self::new(default_accepted_extensions())
    }
}

impl AssetClassifier {
    /// Extensions are matched case-insensitively; a leading dot is tolerated.
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted = accepted
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { accepted }
    }

    pub fn accepted_extensions(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(String::as_str)
    }

    /// Classify by name only. Hidden and extensionless files are always ignored,
    /// and archive extensions win over accepted ones.
    pub fn classify(&self, path: &Path) -> ClassifiedKind {
        if paths::is_hidden(path) {
            return ClassifiedKind::Ignored;
        }

        let Some(ext) = paths::extension_lower(path) else {
            return ClassifiedKind::Ignored;
        };

        if let Some(format) = ArchiveFormat::from_extension(&ext) {
            return ClassifiedKind::Archive(format);
        }

        if self.accepted.contains(&ext) {
            return ClassifiedKind::Accepted(ext);
        }

        ClassifiedKind::Ignored
    }
}
