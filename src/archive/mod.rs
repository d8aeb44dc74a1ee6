//! Archive handling.
//!
//! Provides unified archive extraction using native Rust crates for
//! ZIP (zip crate), tarballs (tar with flate2/bzip2/xz2), 7z (sevenz-rust2)
//! and RAR (unrar).
//!
//! Formats are dispatched through an [`ExtractorRegistry`] keyed by
//! [`ArchiveFormat`], so a new container type only needs an [`Extractor`]
//! implementation and a registry entry. Extraction always happens inside a
//! [`tempfile::TempDir`] owned by the returned [`ExtractedArchive`]; dropping
//! it removes the scratch area whether or not processing succeeded.

mod rar;
mod sevenzip;
mod tarball;
mod zipfile;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

pub use rar::RarExtractor;
pub use sevenzip::SevenZipExtractor;
pub use tarball::{Compression, TarExtractor};
pub use zipfile::ZipExtractor;

/// Container formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Gz,
    Bz2,
    Xz,
    Rar,
    SevenZ,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 7] = [
        ArchiveFormat::Zip,
        ArchiveFormat::Tar,
        ArchiveFormat::Gz,
        ArchiveFormat::Bz2,
        ArchiveFormat::Xz,
        ArchiveFormat::Rar,
        ArchiveFormat::SevenZ,
    ];

    /// Map a lowercase extension (no dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "zip" => Some(ArchiveFormat::Zip),
            "tar" => Some(ArchiveFormat::Tar),
            "gz" => Some(ArchiveFormat::Gz),
            "bz2" => Some(ArchiveFormat::Bz2),
            "xz" => Some(ArchiveFormat::Xz),
            "rar" => Some(ArchiveFormat::Rar),
            "7z" => Some(ArchiveFormat::SevenZ),
            _ => None,
        }
    }

    /// The lowercase extension this format is recognised by.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Gz => "gz",
            ArchiveFormat::Bz2 => "bz2",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::Rar => "rar",
            ArchiveFormat::SevenZ => "7z",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Archive extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Unsupported archive format: {format} ({path})")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("Corrupt or unreadable {format} archive {path}: {reason}")]
    Corrupt {
        path: PathBuf,
        format: ArchiveFormat,
        reason: String,
    },

    #[error("I/O error while extracting {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub(crate) fn corrupt(path: &Path, format: ArchiveFormat, reason: impl fmt::Display) -> Self {
        ArchiveError::Corrupt {
            path: path.to_path_buf(),
            format,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Expands one archive format into a directory.
///
/// Implementations only unpack the top level; nested archives are left as
/// regular files for the caller to re-enter.
pub trait Extractor: Send + Sync {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError>;
}

/// Maps format tags to extractor implementations.
pub struct ExtractorRegistry {
    extractors: HashMap<ArchiveFormat, Box<dyn Extractor>>,
    scratch_root: Option<PathBuf>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExtractorRegistry {
    /// A registry with no formats.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
            scratch_root: None,
        }
    }

    /// A registry covering every [`ArchiveFormat`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ArchiveFormat::Zip, ZipExtractor);
        registry.register(ArchiveFormat::Tar, TarExtractor::new(Compression::None));
        registry.register(ArchiveFormat::Gz, TarExtractor::new(Compression::Gzip));
        registry.register(ArchiveFormat::Bz2, TarExtractor::new(Compression::Bzip2));
        registry.register(ArchiveFormat::Xz, TarExtractor::new(Compression::Xz));
        registry.register(ArchiveFormat::Rar, RarExtractor);
        registry.register(ArchiveFormat::SevenZ, SevenZipExtractor);
        registry
    }

    /// Add or replace the extractor for `format`.
    pub fn register(&mut self, format: ArchiveFormat, extractor: impl Extractor + 'static) {
        self.extractors.insert(format, Box::new(extractor));
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Open `path` as `format`.
    pub fn open<'a>(&'a self, path: &Path, format: ArchiveFormat) -> Result<ArchiveHandle<'a>, ArchiveError> {
        let extractor = self
            .extractors
            .get(&format)
            .ok_or_else(|| ArchiveError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: format.to_string(),
            })?;

        if !path.is_file() {
            return Err(ArchiveError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "archive is not a regular file"),
            ));
        }

        Ok(ArchiveHandle {
            path: path.to_path_buf(),
            format,
            extractor: extractor.as_ref(),
            scratch_root: self.scratch_root.as_deref(),
        })
    }
}

/// An archive bound to the extractor that understands it.
pub struct ArchiveHandle<'a> {
    path: PathBuf,
    format: ArchiveFormat,
    extractor: &'a dyn Extractor,
    scratch_root: Option<&'a Path>,
}

impl ArchiveHandle<'_> {
    /// Expand the archive into a fresh scratch directory and list every
    /// regular file in it, sorted by path.
    pub fn extract_all(&self) -> Result<ExtractedArchive, ArchiveError> {
        let scratch = match self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| ArchiveError::io(root, e))?;
                tempfile::Builder::new()
                    .prefix(".unfold-")
                    .tempdir_in(root)
            }
            None => tempfile::Builder::new().prefix("unfold-").tempdir(),
        }
        .map_err(|e| ArchiveError::io(&self.path, e))?;

        self.extractor.unpack(&self.path, scratch.path())?;

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(scratch.path())
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();

        debug!(
            "Extracted {} ({}): {} files",
            self.path.display(),
            self.format,
            files.len()
        );

        Ok(ExtractedArchive { scratch, files })
    }
}

/// Files expanded from one archive. The scratch directory is removed on drop.
pub struct ExtractedArchive {
    scratch: TempDir,
    files: Vec<PathBuf>,
}

impl ExtractedArchive {
    /// Absolute paths of the regular files, sorted.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Root of the scratch directory.
    pub fn root(&self) -> &Path {
        self.scratch.path()
    }
}

/// Create the extraction destination.
pub(crate) fn prepare_dest(dest: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(dest).map_err(|e| ArchiveError::io(dest, e))
}
