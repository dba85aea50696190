//! On-disk distfiles tree.
//!
//! The filesystem is the system of record; there is no index.  Layout:
//!
//! ```text
//! {basedir}/{project}/{project}-{version}/{filename}
//! {basedir}/{project}/{project}-{version}/{filename}.sha512
//! {basedir}/{project}/LATEST -> {project}-{version}
//! {basedir}/.staging/          in-flight uploads
//! ```
//!
//! Writes follow crash-only rules: stage to a temp file, fsync, rename.

pub mod archive;
pub mod publish;
pub mod staging;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Directory under the base directory holding in-flight uploads.
pub const STAGING_DIR: &str = ".staging";

/// Widest mode a committed file may get before the umask is applied.
pub const BASE_FILE_MODE: u32 = 0o666;

/// Stores verified uploads under a base directory.
#[derive(Debug)]
pub struct LocalStore {
    /// Root of the distfiles tree.
    basedir: PathBuf,
    /// Where uploads are staged before verification.
    staging_dir: PathBuf,
    /// Permission bits for committed files (`0o666 & !umask`).
    file_mode: u32,
}

impl LocalStore {
    /// Open a store rooted at `basedir`, creating the base and staging
    /// directories if needed.  Committed files get `0o666 & !umask`.
    pub fn new(basedir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let umask = process_umask();
        debug!("Using umask {:03o}", umask);

        let basedir = basedir.into();
        std::fs::create_dir_all(&basedir)?;
        let staging_dir = basedir.join(STAGING_DIR);
        std::fs::create_dir_all(&staging_dir)?;

        Ok(Self::with_file_mode(
            basedir,
            staging_dir,
            BASE_FILE_MODE & !umask,
        ))
    }

    fn with_file_mode(basedir: PathBuf, staging_dir: PathBuf, file_mode: u32) -> Self {
        Self {
            basedir,
            staging_dir,
            file_mode,
        }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// Begin staging a new upload.
    pub fn stager(&self) -> anyhow::Result<staging::Stager> {
        staging::Stager::create(&self.staging_dir)
    }

    /// `{basedir}/{project}`
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.basedir.join(project)
    }

    /// `{basedir}/{project}/{project}-{version}`
    pub fn version_dir(&self, project: &str, version: &str) -> PathBuf {
        self.project_dir(project).join(format!("{project}-{version}"))
    }
}

static PROCESS_UMASK: OnceLock<u32> = OnceLock::new();

/// The process umask, read on first use and cached.
///
/// `umask(2)` can only be read by setting it, so the first call briefly
/// installs `0o022` and restores the original.  Call it at startup before
/// any other thread creates files.
pub fn process_umask() -> u32 {
    *PROCESS_UMASK.get_or_init(read_umask)
}

#[cfg(unix)]
fn read_umask() -> u32 {
    use nix::sys::stat::{umask, Mode};

    let current = umask(Mode::from_bits_truncate(0o022));
    umask(current);
    u32::from(current.bits()) & 0o777
}

#[cfg(not(unix))]
fn read_umask() -> u32 {
    0
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let basedir = dir.path().join("distfiles");
        let store = LocalStore::new(&basedir).unwrap();
        assert!(basedir.is_dir());
        assert!(store.staging_dir().is_dir());
        assert_eq!(std::fs::read_dir(store.staging_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_layout_paths() {
        let store = LocalStore::with_file_mode("/srv".into(), "/srv/.staging".into(), 0o644);
        assert_eq!(store.project_dir("abc"), PathBuf::from("/srv/abc"));
        assert_eq!(
            store.version_dir("abc", "1.0"),
            PathBuf::from("/srv/abc/abc-1.0")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_within_base_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        assert_eq!(store.file_mode(), BASE_FILE_MODE & !process_umask());
        // Owner can always read and write under any sane umask.
        assert_eq!(store.file_mode() & 0o600, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_umask_is_restored() {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let umask = process_umask();
        assert_eq!(umask & !0o777, 0);
        assert_eq!(process_umask(), umask);

        // The umask in force afterwards is the one that was read.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh");
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o666)
            .open(&path)
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o666 & !umask);
    }
}
