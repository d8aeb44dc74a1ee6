//! 7z extraction via sevenz-rust2 (pure Rust, no external binary).

use std::path::Path;

use super::{prepare_dest, ArchiveError, ArchiveFormat, Extractor};

/// Extracts `.7z` archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct SevenZipExtractor;

impl Extractor for SevenZipExtractor {
    fn unpack(&self, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
        prepare_dest(dest)?;

        sevenz_rust2::decompress_file(archive_path, dest)
            .map_err(|e| ArchiveError::corrupt(archive_path, ArchiveFormat::SevenZ, e))
    }
}
