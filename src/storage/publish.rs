//! Commit of verified uploads into the versioned tree.
//!
//! Steps, in order:
//! 1. create `{project}/{project}-{version}/` (concurrent creation is fine)
//! 2. write `{filename}.sha512` durably (temp, fsync, rename)
//! 3. apply the captured file mode and rename the staged payload into place
//! 4. repoint `{project}/LATEST` (remove, then create)
//! 5. optionally unpack the committed file as an archive
//!
//! A failed extraction does not roll back steps 1-4.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{archive, LocalStore};
use crate::errors::UploadError;
use crate::request::UploadRequest;

/// Name of the per-project pointer to the newest version directory.
pub const LATEST: &str = "LATEST";

/// Suffix of the sidecar file holding the checksum line.
pub const SIDECAR_SUFFIX: &str = ".sha512";

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// The version directory.
    pub dir: PathBuf,
    /// The committed payload.
    pub path: PathBuf,
    /// Payload size in bytes.
    pub size: u64,
    /// Number of archive entries unpacked, if extraction was requested.
    pub extracted: Option<usize>,
}

impl LocalStore {
    /// Commit a verified upload and, if requested, extract it.
    ///
    /// The caller must have checked the staged digest.  Filesystem failures
    /// surface as `Internal`; an unreadable archive surfaces as `BadArchive`
    /// after the commit has already happened.
    pub fn publish(&self, request: UploadRequest) -> Result<Published, UploadError> {
        let extract = request.extract;
        let mut published = self.commit(request)?;

        if extract {
            match archive::extract(&published.path, &published.dir) {
                Ok(count) => published.extracted = Some(count),
                Err(archive::ArchiveError::Invalid(e)) => {
                    debug!("Rejecting {}: {}", published.path.display(), e);
                    return Err(UploadError::BadArchive);
                }
                Err(archive::ArchiveError::Io(e)) => {
                    return Err(UploadError::Internal(e.into()));
                }
            }
        }

        Ok(published)
    }

    /// Place the payload and its sidecar, then repoint `LATEST`.
    pub fn commit(&self, request: UploadRequest) -> anyhow::Result<Published> {
        let dir_name = request.version_dir_name();
        let UploadRequest {
            project,
            version,
            checksum,
            filename,
            staged,
            ..
        } = request;

        let project_dir = self.project_dir(&project);
        let dir = project_dir.join(&dir_name);
        std::fs::create_dir_all(&dir)?;

        let sidecar = dir.join(format!("{filename}{SIDECAR_SUFFIX}"));
        write_durable(&dir, &sidecar, checksum.raw.as_bytes(), self.file_mode())?;

        let dest = dir.join(&filename);
        let size = staged.size();
        set_mode(staged.path(), self.file_mode())?;
        staged.persist(&dest)?;
        sync_dir(&dir)?;

        update_latest(&project_dir, &dir_name)?;

        info!(
            project = %project,
            version = %version,
            filename = %filename,
            size,
            "Committed upload"
        );

        Ok(Published {
            dir,
            path: dest,
            size,
            extracted: None,
        })
    }
}

/// Write `data` to `path` via a synced temp file in `dir`.
fn write_durable(dir: &Path, path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    set_mode(tmp.path(), mode)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Attempts at replacing `LATEST` while other commits race for it.
const LATEST_ATTEMPTS: usize = 16;

/// Replace the `LATEST` link in `project_dir` with one pointing at `target`.
///
/// Not atomic: the link is briefly absent between removal and creation.
/// Concurrent commits race; whichever creates its link last wins.
pub fn update_latest(project_dir: &Path, target: &str) -> std::io::Result<()> {
    let latest = project_dir.join(LATEST);
    let mut attempt = 1;
    loop {
        remove_if_present(&latest)?;
        match symlink_dir(target, &latest) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < LATEST_ATTEMPTS => {
                debug!("LATEST in {} recreated concurrently, retrying", project_dir.display());
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn symlink_dir(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Persist directory entries (the rename) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

// -- Tests --------------------------------------------------------------------
