//! ZIP extraction via the zip crate.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{prepare_dest, ArchiveError, ArchiveFormat, Extractor};

/// Extracts `.zip` archives. Entry names are sanitized by the zip crate, so
/// paths escaping the destination are never written.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn unpack(&self, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
        prepare_dest(dest)?;

        let file = File::open(archive_path).map_err(|e| ArchiveError::io(archive_path, e))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| ArchiveError::corrupt(archive_path, ArchiveFormat::Zip, e))?;

        archive
            .extract(dest)
            .map_err(|e| ArchiveError::corrupt(archive_path, ArchiveFormat::Zip, e))
    }
}
