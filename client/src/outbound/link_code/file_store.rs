//! Capability-scoped file store for the one-shot linking code.
//!
//! The code lives in a single file named after [`LINK_CODE_KEY`] inside a
//! directory opened once through `cap_std`; nothing outside that directory is
//! reachable.

use std::io;
use std::path::{Path, PathBuf};

use cap_std::{ambient_authority, fs::Dir};
use tracing::debug;

use crate::domain::ports::{LINK_CODE_KEY, LinkCode, LinkCodeStore, LinkCodeStoreError};

/// Link code store backed by a file in one directory.
#[derive(Debug)]
pub struct FileLinkCodeStore {
    directory: Dir,
    root: PathBuf,
}

impl FileLinkCodeStore {
    /// Open (creating when missing) the directory holding the code.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while creating or opening `root`.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        Dir::create_ambient_dir_all(root, ambient_authority())?;
        let directory = Dir::open_ambient_dir(root, ambient_authority())?;
        Ok(Self {
            directory,
            root: root.to_path_buf(),
        })
    }

    /// Directory the code is stored in.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn io_error(action: &str, error: &io::Error) -> LinkCodeStoreError {
    LinkCodeStoreError::io(format!("{action} {LINK_CODE_KEY}: {error}"))
}

impl LinkCodeStore for FileLinkCodeStore {
    fn load(&self) -> Result<Option<LinkCode>, LinkCodeStoreError> {
        match self.directory.read_to_string(LINK_CODE_KEY) {
            Ok(raw) => Ok(LinkCode::parse(&raw)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error("read", &error)),
        }
    }

    fn save(&self, code: &LinkCode) -> Result<(), LinkCodeStoreError> {
        self.directory
            .write(LINK_CODE_KEY, code.as_str())
            .map_err(|error| io_error("write", &error))?;
        debug!(root = %self.root.display(), "linking code saved");
        Ok(())
    }

    fn remove(&self) -> Result<(), LinkCodeStoreError> {
        match self.directory.remove_file(LINK_CODE_KEY) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error("remove", &error)),
        }
    }
}
