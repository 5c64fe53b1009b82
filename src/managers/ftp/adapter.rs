/*!
 * FTP Filesystem Adapter
 * Maps FTP file operations onto one view and renders failures as replies
 *
 * Each connection owns its adapter and view. Every lookup goes to the
 * backend, so changes made by other connections are seen immediately.
 */

use std::io::{Read, Write};
use thiserror::Error;
use tracing::warn;

use crate::managers::transfer::{self, TransferError};
use crate::vfs::{paths, FileMetadata, FileSystemView, VfsError};

const NO_SUCH_ENTRY: &str = "No such file or directory";
const NOT_A_DIRECTORY: &str = "Not a directory";
const INACCESSIBLE: &str = "File system currently inaccessible";
const EXTERNAL_MODIFICATION: &str = "Operation failed due to external modification of file system";

/// Failure of an adapter operation, already phrased for the client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Rejected or failed operation; answered with 550
    #[error("{0}")]
    Failed(String),

    /// Quota exhausted; answered with 552
    #[error("{0}")]
    StorageFull(String),

    /// The data connection broke; answered with 426
    #[error("{0}")]
    Transfer(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl AdapterError {
    fn failed(message: &str) -> Self {
        Self::Failed(message.to_string())
    }

    /// Default rendering of a backend error
    fn from_vfs(e: VfsError) -> Self {
        match e {
            VfsError::InvalidPath(_) => Self::failed(NO_SUCH_ENTRY),
            VfsError::InvalidTarget(_) => Self::failed(NOT_A_DIRECTORY),
            VfsError::AccessFailed(_) => Self::failed(INACCESSIBLE),
            VfsError::InsufficientSpace { .. } => Self::StorageFull(e.to_string()),
            VfsError::AlreadyExists(_) => Self::failed("File exists"),
            other => Self::Failed(other.to_string()),
        }
    }

    fn from_transfer(e: TransferError) -> Self {
        match e {
            TransferError::Vfs(e) => Self::from_vfs(e),
            TransferError::Io(e) => Self::Transfer(e.to_string()),
        }
    }
}

pub struct FtpFsAdapter {
    view: FileSystemView,
}

impl FtpFsAdapter {
    pub fn new(view: FileSystemView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &FileSystemView {
        &self.view
    }

    /// Absolute form of a client path; backslashes count as separators
    pub fn abs(&self, path: &str) -> String {
        self.view.get_abs_path(&path.replace('\\', "/"))
    }

    pub fn cwd(&self) -> String {
        self.view.working_dir()
    }

    pub fn chdir(&self, path: &str) -> AdapterResult<()> {
        self.view.set_working_dir(&self.abs(path)).map_err(AdapterError::from_vfs)
    }

    /// Entries of a directory, or the single entry when `path` is a file
    pub fn list(&self, path: &str) -> AdapterResult<Vec<FileMetadata>> {
        let abs = self.abs(path);
        let meta = self.metadata(&abs)?;
        if meta.is_file() {
            return Ok(vec![meta]);
        }
        self.view.get_content_metadata(&abs).map_err(AdapterError::from_vfs)
    }

    pub fn metadata(&self, path: &str) -> AdapterResult<FileMetadata> {
        self.view.get_metadata(&self.abs(path)).map_err(AdapterError::from_vfs)
    }

    pub fn size(&self, path: &str) -> AdapterResult<u64> {
        let meta = self.metadata(path)?;
        if meta.is_dir() {
            return Err(AdapterError::failed("Is a directory"));
        }
        Ok(meta.size)
    }

    pub fn mkdir(&self, path: &str) -> AdapterResult<String> {
        let abs = self.abs(path);
        match self.view.make_dir(&abs) {
            Ok(()) => Ok(abs),
            Err(VfsError::InvalidPath(_)) => {
                Err(AdapterError::failed("Invalid path for new directory"))
            }
            Err(VfsError::AlreadyExists(_)) => {
                Err(AdapterError::failed("Can't create directory: File exists"))
            }
            Err(e) => Err(AdapterError::from_vfs(e)),
        }
    }

    pub fn rmdir(&self, path: &str) -> AdapterResult<()> {
        let abs = self.abs(path);
        let _guard = self.view.lock();
        if !self.view.is_dir(&abs).map_err(AdapterError::from_vfs)? {
            return Err(AdapterError::failed(NOT_A_DIRECTORY));
        }
        self.view.delete(&abs).map_err(AdapterError::from_vfs)
    }

    pub fn remove(&self, path: &str) -> AdapterResult<()> {
        let abs = self.abs(path);
        let _guard = self.view.lock();
        if self.view.is_dir(&abs).map_err(AdapterError::from_vfs)? {
            return Err(AdapterError::failed("Given path points to a directory"));
        }
        self.view.delete(&abs).map_err(AdapterError::from_vfs)
    }

    /// Rename, replacing an existing file at the destination. The checks
    /// and the move happen as one step under the backend lock. A replaced
    /// file is parked beside the destination and only deleted once the move
    /// has succeeded; a failed move puts it back.
    pub fn rename(&self, from: &str, to: &str) -> AdapterResult<()> {
        let from = self.abs(from);
        let to = self.abs(to);

        let _guard = self.view.lock();
        if !self.view.exists(&from).map_err(AdapterError::from_vfs)? {
            return Err(AdapterError::failed(NO_SUCH_ENTRY));
        }
        if from == to {
            return Ok(());
        }
        if paths::is_within(&from, &to) {
            return Err(AdapterError::failed("Cannot move source to the given destination"));
        }
        let parked = if self.view.exists(&to).map_err(AdapterError::from_vfs)? {
            if self.view.is_dir(&to).map_err(AdapterError::from_vfs)? {
                return Err(AdapterError::failed("Destination is an existing directory"));
            }
            let parked = self.parking_name(&to)?;
            self.view
                .move_entry(&to, &parked)
                .map_err(|_| AdapterError::failed(EXTERNAL_MODIFICATION))?;
            Some(parked)
        } else {
            None
        };

        if let Err(e) = self.view.move_entry(&from, &to) {
            if let Some(parked) = &parked {
                if let Err(restore) = self.view.move_entry(parked, &to) {
                    warn!(
                        path = %to,
                        parked = %parked,
                        error = %restore,
                        "Could not restore replaced file"
                    );
                }
            }
            return Err(match e {
                VfsError::AccessFailed(_) => AdapterError::failed(INACCESSIBLE),
                _ => AdapterError::failed(EXTERNAL_MODIFICATION),
            });
        }
        if let Some(parked) = parked {
            self.view
                .delete(&parked)
                .map_err(|_| AdapterError::failed(EXTERNAL_MODIFICATION))?;
        }
        Ok(())
    }

    /// Unused sibling name for a file being replaced
    fn parking_name(&self, path: &str) -> AdapterResult<String> {
        for n in 0..u32::MAX {
            let candidate = format!("{}.replaced-{}", path, n);
            if !self.view.exists(&candidate).map_err(AdapterError::from_vfs)? {
                return Ok(candidate);
            }
        }
        Err(AdapterError::failed(EXTERNAL_MODIFICATION))
    }

    /// Stream the file at `path` from `offset` into `writer`
    pub fn retrieve(&self, path: &str, offset: u64, writer: &mut dyn Write) -> AdapterResult<u64> {
        let abs = self.abs(path);
        if self.view.is_dir(&abs).map_err(AdapterError::from_vfs)? {
            return Err(AdapterError::failed("Is a directory"));
        }
        transfer::download(&self.view, &abs, offset, writer).map_err(AdapterError::from_transfer)
    }

    /// Store everything `reader` yields at `path`. The target is checked
    /// before any data is accepted; a failed upload leaves nothing behind.
    pub fn store(&self, path: &str, reader: &mut dyn Read) -> AdapterResult<u64> {
        let abs = self.abs(path);
        self.check_store_target(&abs)?;
        transfer::upload(&self.view, reader, &abs).map_err(AdapterError::from_transfer)
    }

    pub fn check_store_target(&self, abs: &str) -> AdapterResult<()> {
        if paths::is_root(abs) {
            return Err(AdapterError::failed("Is a directory"));
        }
        let parent = paths::parent(abs).unwrap_or(paths::ROOT);
        match self.view.is_dir(parent) {
            Ok(true) => {}
            Ok(false) => return Err(AdapterError::failed(NO_SUCH_ENTRY)),
            Err(e) => return Err(AdapterError::from_vfs(e)),
        }
        let _guard = self.view.lock();
        let exists = self.view.exists(abs).map_err(AdapterError::from_vfs)?;
        if exists && self.view.is_dir(abs).map_err(AdapterError::from_vfs)? {
            return Err(AdapterError::failed("Is a directory"));
        }
        Ok(())
    }
}
