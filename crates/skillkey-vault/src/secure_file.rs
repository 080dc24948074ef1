//! Symlink-resistant, owner-only storage of the keystore file.
//!
//! The keystore lives at `<dir>/keystore.json`, where `<dir>` defaults to
//! `~/.8004skill`. Every open refuses to follow a symbolic link
//! (`O_NOFOLLOW` on Unix, plus an `lstat` pre-check so the failure is
//! reported as [`KeystoreError::SymlinkRefused`] rather than a bare I/O
//! error). Writes go to a sibling temp file created with mode 0600, are
//! synced, and then renamed over the destination, so a crash leaves either
//! the old document or the new one.
//!
//! On Unix, [`SecureFile::load`] also refuses a file that other users can
//! access or that the current user does not own.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::document::KeystoreDocument;
use crate::error::{KeystoreError, Result};

/// Directory name under the home directory.
pub const KEYSTORE_DIR_NAME: &str = ".8004skill";

/// File name of the keystore inside its directory.
pub const KEYSTORE_FILE_NAME: &str = "keystore.json";

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Home-relative folders that cloud sync clients mirror off the machine.
const CLOUD_SYNC_DIRS: [&str; 5] = [
    "Library/Mobile Documents",
    "Library/CloudStorage",
    "Dropbox",
    "Google Drive",
    "OneDrive",
];

/// Handle on the keystore file and its directory. Holds no open descriptor.
#[derive(Debug, Clone)]
pub struct SecureFile {
    dir: PathBuf,
    path: PathBuf,
}

impl SecureFile {
    /// A store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(KEYSTORE_FILE_NAME);
        Self { dir, path }
    }

    /// `~/.8004skill`.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Io`] if the home directory cannot be
    /// determined.
    pub fn default_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(KEYSTORE_DIR_NAME))
            .ok_or_else(|| {
                KeystoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "cannot determine home directory",
                ))
            })
    }

    /// Path of the keystore file. No I/O.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether anything (including a symlink) occupies the keystore path.
    pub fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    /// Read and validate the keystore.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::KeystoreNotFound`] if the file is absent.
    /// - [`KeystoreError::SymlinkRefused`] if the file or its directory is a
    ///   symlink.
    /// - [`KeystoreError::InsecurePermissions`] if the file is not a regular
    ///   file, is group/other accessible, or is owned by another user.
    /// - [`KeystoreError::MalformedJson`] / [`KeystoreError::SchemaInvalid`]
    ///   for bad content.
    pub fn load(&self) -> Result<KeystoreDocument> {
        refuse_symlink(&self.dir)?;
        refuse_symlink(&self.path)?;
        // A FIFO or device at the path would block or misbehave on open.
        if fs::symlink_metadata(&self.path).is_ok_and(|m| !m.is_file()) {
            return Err(KeystoreError::InsecurePermissions {
                path: self.path.clone(),
                detail: "not a regular file".into(),
            });
        }

        let mut file = open_for_read(&self.path).map_err(|e| self.open_error(e))?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(KeystoreError::InsecurePermissions {
                path: self.path.clone(),
                detail: "not a regular file".into(),
            });
        }
        #[cfg(unix)]
        {
            if let Some(detail) = unix::permission_problem(&metadata) {
                return Err(KeystoreError::InsecurePermissions {
                    path: self.path.clone(),
                    detail,
                });
            }
        }

        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        drop(file);

        let doc = KeystoreDocument::parse(&raw)?;
        tracing::debug!(path = %self.path.display(), entries = doc.entries.len(), "loaded keystore");
        Ok(doc)
    }

    /// Write `doc` as pretty-printed JSON, replacing the current file.
    ///
    /// # Errors
    ///
    /// [`KeystoreError::SymlinkRefused`] if the directory or destination is a
    /// symlink; [`KeystoreError::Io`] for any filesystem failure. The temp file
    /// is removed on every error path.
    pub fn save(&self, doc: &KeystoreDocument) -> Result<()> {
        self.ensure_dir()?;
        refuse_symlink(&self.path)?;

        let mut json = serde_json::to_string_pretty(doc)?;
        json.push('\n');

        let tmp = self
            .dir
            .join(format!(".{KEYSTORE_FILE_NAME}.{}.tmp", std::process::id()));
        match fs::remove_file(&tmp) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let written = (|| -> Result<()> {
            let mut file = create_for_write(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })();

        let renamed = written
            .and_then(|()| refuse_symlink(&self.path))
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(KeystoreError::from));
        if let Err(e) = renamed {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        if let Err(e) = File::open(&self.dir).and_then(|d| d.sync_all()) {
            tracing::debug!(error = %e, "directory sync skipped");
        }

        tracing::info!(path = %self.path.display(), entries = doc.entries.len(), "saved keystore");
        Ok(())
    }

    /// Non-fatal warnings about where and how the keystore is stored.
    pub fn inspect(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if fs::symlink_metadata(&self.dir).is_ok_and(|m| m.file_type().is_symlink()) {
            warnings.push(format!(
                "Keystore directory {} is a symlink; keystore operations will refuse it.",
                self.dir.display()
            ));
        }

        match fs::symlink_metadata(&self.path) {
            Ok(m) if m.file_type().is_symlink() => warnings.push(format!(
                "Keystore path {} is a symlink; keystore operations will refuse it.",
                self.path.display()
            )),
            Ok(_metadata) => {
                #[cfg(unix)]
                {
                    if let Some(detail) = unix::permission_problem(&_metadata) {
                        warnings.push(format!(
                            "Keystore file {}: {detail}. Run: chmod 600 {}",
                            self.path.display(),
                            self.path.display()
                        ));
                    }
                }
            }
            Err(_) => {}
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(m) = fs::symlink_metadata(&self.dir) {
                let bits = m.permissions().mode() & 0o777;
                if m.is_dir() && bits & 0o077 != 0 {
                    warnings.push(format!(
                        "Keystore directory {} has permissions {bits:03o} (expected 700).",
                        self.dir.display()
                    ));
                }
            }
        }

        if let (Ok(resolved), Some(home)) = (fs::canonicalize(&self.path), dirs::home_dir()) {
            warnings.extend(cloud_sync_warning(&resolved, &home));
        }

        warnings
    }

    // -- Internal helpers ---------------------------------------------------

    fn ensure_dir(&self) -> Result<()> {
        refuse_symlink(&self.dir)?;
        if self.dir.is_dir() {
            return Ok(());
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(&self.dir)?;

        // The process umask may have masked the requested mode.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(DIR_MODE))?;
        }

        tracing::info!(dir = %self.dir.display(), "created keystore directory");
        Ok(())
    }

    fn open_error(&self, e: io::Error) -> KeystoreError {
        if e.kind() == io::ErrorKind::NotFound {
            return KeystoreError::KeystoreNotFound {
                path: self.path.clone(),
            };
        }
        #[cfg(unix)]
        {
            if e.raw_os_error() == Some(libc::ELOOP) {
                return KeystoreError::SymlinkRefused {
                    path: self.path.clone(),
                };
            }
        }
        KeystoreError::Io(e)
    }
}

/// Fail with [`KeystoreError::SymlinkRefused`] if `path` is a symlink. A
/// missing path passes.
fn refuse_symlink(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.file_type().is_symlink() => Err(KeystoreError::SymlinkRefused {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Warning text if `resolved` sits inside a cloud-synced folder under `home`.
pub fn cloud_sync_warning(resolved: &Path, home: &Path) -> Option<String> {
    CLOUD_SYNC_DIRS
        .iter()
        .any(|dir| resolved.starts_with(home.join(dir)))
        .then(|| {
            format!(
                "Keystore path ({}) appears to be inside a cloud-synced directory. \
                 The encrypted keystore may be replicated to cloud storage. \
                 Consider moving it outside of synced directories.",
                resolved.display()
            )
        })
}

/// Why the regular file at `path` is not an owner-only file of the current
/// user, or `None` if it is fine or cannot be inspected. Symlinks are not
/// followed.
pub fn ownership_problem(path: &Path) -> Option<String> {
    let _metadata = fs::symlink_metadata(path).ok()?;
    #[cfg(unix)]
    {
        unix::permission_problem(&_metadata)
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(unix)]
fn open_for_read(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_read(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

#[cfg(unix)]
fn create_for_write(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(FILE_MODE)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

#[cfg(not(unix))]
fn create_for_write(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
mod unix {
    use std::fs::Metadata;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    /// Describe why `metadata` is not an owner-only file of the current user.
    pub(super) fn permission_problem(metadata: &Metadata) -> Option<String> {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        if metadata.uid() != euid {
            return Some(format!(
                "owned by uid {} but current uid is {euid}",
                metadata.uid()
            ));
        }
        let bits = metadata.permissions().mode() & 0o777;
        if bits & 0o077 != 0 {
            return Some(format!(
                "permissions {bits:03o} allow group or other access (expected 600)"
            ));
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
