//! Zonefile lookup.
//!
//! Zonefiles are maintained by the user and named after the domain they describe. They are
//! searched for in the following directories, the first match wins:
//!
//! 1. `$HOME/.config/hedup/zonefiles`
//! 2. `/etc/hedup/zonefiles`
//! 3. the bundled zonefile directory ([`BUNDLED_ZONEFILE_DIR`])

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Error;

/// System wide zonefile directory.
pub const SYSTEM_ZONEFILE_DIR: &str = "/etc/hedup/zonefiles";

/// Zonefile directory shipped with the package, can be changed at build time via
/// `HEDUP_ZONEFILE_DIR`.
pub const BUNDLED_ZONEFILE_DIR: &str = match option_env!("HEDUP_ZONEFILE_DIR") {
    Some(dir) => dir,
    None => "/usr/share/hedup/zonefiles",
};

/// Ordered list of directories containing zonefiles.
#[derive(Clone, Debug)]
pub struct ZonefileSearchPath {
    dirs: Vec<PathBuf>,
}

impl ZonefileSearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// The standard search path for a user with the given home directory.
    pub fn for_home(home: Option<&Path>) -> Self {
        let mut dirs = Vec::with_capacity(3);
        if let Some(home) = home {
            dirs.push(home.join(".config/hedup/zonefiles"));
        }
        dirs.push(PathBuf::from(SYSTEM_ZONEFILE_DIR));
        dirs.push(PathBuf::from(BUNDLED_ZONEFILE_DIR));
        Self { dirs }
    }

    /// The standard search path for the current user (`$HOME`).
    pub fn from_env() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::for_home(home.as_deref())
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Returns the path of the first zonefile named exactly like `domain`.
    pub fn locate(&self, domain: &str) -> Option<PathBuf> {
        // never leave the zonefile directories
        if domain.is_empty() || domain.starts_with('.') || domain.contains('/') {
            return None;
        }

        self.dirs
            .iter()
            .map(|dir| dir.join(domain))
            .find(|path| path.is_file())
    }

    /// Locate and read the zonefile for `domain`.
    ///
    /// The content is returned as is, without any decoding.
    pub fn read(&self, domain: &str) -> Result<(PathBuf, Vec<u8>), Error> {
        let path = self
            .locate(domain)
            .ok_or_else(|| Error::ZonefileNotFound(domain.to_string()))?;

        debug!("using zonefile {path:?} for {domain}");

        match std::fs::read(&path) {
            Ok(content) => Ok((path, content)),
            Err(source) => Err(Error::ZonefileRead { path, source }),
        }
    }

    /// Print every existing zonefile directory together with the domains it contains.
    pub fn list_domains<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        for dir in self.dirs.iter().filter(|dir| dir.is_dir()) {
            writeln!(out)?;
            writeln!(out, "Available domains in folder: {}", dir.display())?;
            writeln!(out)?;

            for entry in std::fs::read_dir(dir)? {
                writeln!(out, "{}", entry?.file_name().to_string_lossy())?;
            }
        }
        Ok(())
    }
}
