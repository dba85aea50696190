//! Archive extraction for committed uploads.
//!
//! Supports tar archives, uncompressed or compressed with gzip, bzip2 or
//! xz; the compression is detected from the file's magic bytes, not its
//! name.
//!
//! Extraction runs in two passes.  The first reads every entry to the end
//! without touching the destination, so a corrupt or non-archive file is
//! reported as [`ArchiveError::Invalid`] before anything is written.  The
//! second unpacks; failures there are environmental ([`ArchiveError::Io`]).

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Leading bytes of a bzip2 stream.
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Leading bytes of an xz stream.
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];

/// Compression wrapped around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    fn detect(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if head.starts_with(BZIP2_MAGIC) {
            Compression::Bzip2
        } else if head.starts_with(XZ_MAGIC) {
            Compression::Xz
        } else {
            Compression::None
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file is not a readable archive of a supported kind.
    #[error("invalid archive: {0}")]
    Invalid(#[source] io::Error),

    /// The archive could not be opened or unpacked for reasons unrelated to
    /// its contents.
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Unpack every entry of `archive` into `dest`, returning the entry count.
///
/// Entries whose paths would land outside `dest` (e.g. `../x`) are skipped
/// by the `tar` crate and logged.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let count = scan(archive)?;
    if count == 0 {
        return Err(ArchiveError::Invalid(io::Error::new(
            io::ErrorKind::InvalidData,
            "archive has no entries",
        )));
    }

    let mut reader = open(archive)?;
    let mut unpacked = 0;
    for entry in reader.entries()? {
        let mut entry = entry?;
        if entry.unpack_in(dest)? {
            unpacked += 1;
        } else {
            warn!(
                "Skipped archive entry outside {}: {}",
                dest.display(),
                entry.path()?.display()
            );
        }
    }

    debug!(
        "Extracted {} of {} entries from {}",
        unpacked,
        count,
        archive.display()
    );
    Ok(count)
}

/// Open `path` as a tar stream, decompressing according to its magic bytes.
fn open(path: &Path) -> io::Result<tar::Archive<Box<dyn Read>>> {
    let mut file = BufReader::new(File::open(path)?);
    let compression = Compression::detect(file.fill_buf()?);
    debug!("Opening {} ({:?})", path.display(), compression);
    let reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(BzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
        Compression::None => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

/// Read through every entry, counting them.
fn scan(path: &Path) -> Result<usize, ArchiveError> {
    let mut reader = open(path)?;
    let mut count = 0;
    for entry in reader.entries().map_err(ArchiveError::Invalid)? {
        let mut entry = entry.map_err(ArchiveError::Invalid)?;
        entry.path().map_err(ArchiveError::Invalid)?;
        io::copy(&mut entry, &mut io::sink()).map_err(ArchiveError::Invalid)?;
        count += 1;
    }
    Ok(count)
}

// -- Tests --------------------------------------------------------------------
