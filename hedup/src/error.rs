use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Error types returned by this crate.
///
/// Every error is fatal for the current invocation, nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration file exists but could not be read.
    #[error("unable to read config file {path:?} - {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    /// A configuration file is not a valid YAML mapping of known option types.
    #[error("unable to parse config file {path:?} - {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A required option is still unset after merging all configuration layers.
    #[error("missing required option '{0}'")]
    MissingOption(&'static str),

    /// An executable given by bare name was not found in the search path.
    #[error("could not find executable: {0}")]
    ExecutableNotFound(String),

    /// None of the zonefile directories contains a file for the domain.
    #[error("no zonefile found for domain '{0}'")]
    ZonefileNotFound(String),

    #[error("unable to read zonefile {path:?} - {source}")]
    ZonefileRead { path: PathBuf, source: io::Error },

    /// An external program could not be started.
    #[error("could not spawn {program:?} - {source}")]
    Spawn { program: PathBuf, source: io::Error },

    /// Feeding or collecting the standard streams of an external program failed.
    #[error("couldn't communicate with {program:?} - {source}")]
    Pipe { program: PathBuf, source: io::Error },

    /// An external program exited unsuccessfully.
    #[error("{program:?} did not exit successfully ({status})")]
    ProcessFailed { program: PathBuf, status: ExitStatus },

    /// A variable required in automatic mode is not set.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {0} is not valid unicode")]
    EnvNotUnicode(&'static str),

    /// Writing console output failed.
    #[error("output error - {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Check if this is a configuration error (missing option, bad config file or unresolvable
    /// executable).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigRead { .. }
                | Error::ConfigParse { .. }
                | Error::MissingOption(_)
                | Error::ExecutableNotFound(_)
        )
    }
}
