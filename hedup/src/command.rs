//! Resolution of external program names.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::Error;

/// Maps a program name from the configuration to the executable to run.
pub trait CommandResolver {
    /// Resolve `program`.
    ///
    /// Absolute paths are returned verbatim, bare names are looked up.
    fn resolve(&self, program: &str) -> Result<PathBuf, Error>;
}

impl<T: CommandResolver + ?Sized> CommandResolver for &T {
    fn resolve(&self, program: &str) -> Result<PathBuf, Error> {
        (**self).resolve(program)
    }
}

/// Looks up bare program names in a list of directories, like `which`.
#[derive(Clone, Debug, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Search the directories listed in `$PATH`.
    pub fn from_env() -> Self {
        let dirs = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

impl CommandResolver for SearchPath {
    fn resolve(&self, program: &str) -> Result<PathBuf, Error> {
        let path = Path::new(program);

        if path.is_absolute() {
            return Ok(path.to_owned());
        }

        if program.contains('/') {
            // relative path, not subject to the search path
            return if is_executable(path) {
                Ok(path.to_owned())
            } else {
                Err(Error::ExecutableNotFound(program.to_string()))
            };
        }

        self.dirs
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| Error::ExecutableNotFound(program.to_string()))
    }
}
