//! Streaming payload staging with incremental SHA-512.
//!
//! A [`Stager`] writes upload chunks to a fresh temporary file while
//! feeding the same bytes to a SHA-512 hasher, so an upload of any size
//! is verified without being held in memory.  The temporary file lives on
//! the same volume as the destination so the final placement is a rename.
//!
//! Temporary files are owned by a [`TempPath`]: dropping a `Stager` or a
//! [`StagedPayload`] on any error path deletes the file.

use std::path::Path;

use sha2::{Digest, Sha512};
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Write buffer for staged payloads.
pub const STAGING_BUFFER_SIZE: usize = 8 * 1024;

/// An in-progress staged upload.
pub struct Stager {
    file: BufWriter<tokio::fs::File>,
    path: TempPath,
    hasher: Sha512,
    size: u64,
}

impl Stager {
    /// Create a new temporary file in `dir`.
    pub fn create(dir: &Path) -> anyhow::Result<Self> {
        let (file, path) = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir)?
            .into_parts();
        Ok(Self {
            file: BufWriter::with_capacity(STAGING_BUFFER_SIZE, tokio::fs::File::from_std(file)),
            path,
            hasher: Sha512::new(),
            size: 0,
        })
    }

    /// Append a chunk to the staged file and the running digest.
    pub async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.hasher.update(chunk);
        self.file.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// Flush and fsync the staged file and finalize the digest.
    pub async fn finish(self) -> anyhow::Result<StagedPayload> {
        let Stager {
            mut file,
            path,
            hasher,
            size,
        } = self;

        file.flush().await?;
        let file = file.into_inner();
        file.sync_all().await?;
        drop(file);

        Ok(StagedPayload {
            path,
            digest: hex::encode(hasher.finalize()),
            size,
        })
    }
}

impl std::fmt::Debug for Stager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stager")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

/// A fully written, durably synced payload awaiting commit.
#[derive(Debug)]
pub struct StagedPayload {
    path: TempPath,
    digest: String,
    size: u64,
}

impl StagedPayload {
    /// Lowercase hex SHA-512 of the staged bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Number of staged bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole-string comparison against a claimed digest.
    pub fn matches(&self, claimed: &str) -> bool {
        self.digest == claimed
    }

    /// Rename the staged file to `dest`, replacing any existing file.
    ///
    /// On failure the staged file is removed.
    pub(crate) fn persist(self, dest: &Path) -> std::io::Result<()> {
        self.path.persist(dest).map_err(|e| e.error)
    }
}

// -- Tests --------------------------------------------------------------------
