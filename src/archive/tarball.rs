//! Tar extraction, optionally behind a gzip, bzip2 or xz stream.
//!
//! A compressed file is decompressed once into an anonymous temp file. If
//! that stream starts with a valid tar header it is unpacked as a tarball;
//! otherwise it is a single compressed file (`icon.png.gz`) and is written
//! out under its stem.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use tracing::debug;
use xz2::read::XzDecoder;

use super::{prepare_dest, ArchiveError, ArchiveFormat, Extractor};
use crate::paths;

/// Stream compression wrapped around a tarball
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// Tar extractor
#[derive(Debug, Clone, Copy)]
pub struct TarExtractor {
    compression: Compression,
}

impl TarExtractor {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn format(&self) -> ArchiveFormat {
        match self.compression {
            Compression::None => ArchiveFormat::Tar,
            Compression::Gzip => ArchiveFormat::Gz,
            Compression::Bzip2 => ArchiveFormat::Bz2,
            Compression::Xz => ArchiveFormat::Xz,
        }
    }

    /// Create appropriate reader based on compression
    fn decoder(&self, file: File) -> Box<dyn Read> {
        let reader = BufReader::new(file);
        match self.compression {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new(reader)),
        }
    }

    fn unpack_tar<R: Read>(&self, reader: R, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
        tar::Archive::new(reader)
            .unpack(dest)
            .map_err(|e| ArchiveError::corrupt(archive_path, self.format(), e))
    }
}

impl Extractor for TarExtractor {
    fn unpack(&self, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
        prepare_dest(dest)?;

        let file = File::open(archive_path).map_err(|e| ArchiveError::io(archive_path, e))?;

        if self.compression == Compression::None {
            return self.unpack_tar(BufReader::new(file), archive_path, dest);
        }

        let mut decompressed = tempfile::tempfile().map_err(|e| ArchiveError::io(archive_path, e))?;
        io::copy(&mut self.decoder(file), &mut decompressed)
            .map_err(|e| ArchiveError::corrupt(archive_path, self.format(), e))?;
        decompressed
            .seek(SeekFrom::Start(0))
            .map_err(|e| ArchiveError::io(archive_path, e))?;

        if starts_with_tar_header(&mut decompressed) {
            decompressed
                .seek(SeekFrom::Start(0))
                .map_err(|e| ArchiveError::io(archive_path, e))?;
            return self.unpack_tar(BufReader::new(decompressed), archive_path, dest);
        }

        let mut name = paths::file_stem(archive_path);
        if name.is_empty() {
            name = "data".to_string();
        }
        debug!(
            "{} is not a tarball, keeping decompressed stream as {}",
            archive_path.display(),
            name
        );

        decompressed
            .seek(SeekFrom::Start(0))
            .map_err(|e| ArchiveError::io(archive_path, e))?;
        let out_path = dest.join(name);
        let mut out = File::create(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
        io::copy(&mut decompressed, &mut out).map_err(|e| ArchiveError::io(&out_path, e))?;

        Ok(())
    }
}

/// Whether the stream's first header block parses (checksum included).
fn starts_with_tar_header(file: &mut File) -> bool {
    let mut archive = tar::Archive::new(file);
    match archive.entries() {
        Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
        Err(_) => false,
    }
}
