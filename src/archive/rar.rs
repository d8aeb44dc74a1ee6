//! RAR extraction via unrar.

use std::path::Path;

use super::{prepare_dest, ArchiveError, ArchiveFormat, Extractor};

/// Extracts `.rar` archives entry by entry, skipping directory headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RarExtractor;

impl Extractor for RarExtractor {
    fn unpack(&self, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
        prepare_dest(dest)?;

        let corrupt = |e: unrar::error::UnrarError| ArchiveError::corrupt(archive_path, ArchiveFormat::Rar, e);

        let archive = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(corrupt)?;

        // Iterate through entries using read_header pattern
        let mut cursor = Some(archive);

        while let Some(archive) = cursor.take() {
            match archive.read_header().map_err(corrupt)? {
                Some(entry) => {
                    let next = if entry.entry().is_file() {
                        entry.extract_with_base(dest).map_err(corrupt)?
                    } else {
                        entry.skip().map_err(corrupt)?
                    };
                    cursor = Some(next);
                }
                None => break, // End of archive
            }
        }

        Ok(())
    }
}
