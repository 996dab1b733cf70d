use std::{fmt, io, path::PathBuf};

use crate::process;

/// Classifies why a build failed. Every kind is fatal to the build it occurs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    EnvironmentSetupFailure,
    PullFailure,
    BuildProcessFailure,
    ArtifactDiscoveryFailure,
    ChecksumFailure,
    ReportFailure,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::EnvironmentSetupFailure => "EnvironmentSetupFailure",
            ErrorKind::PullFailure => "PullFailure",
            ErrorKind::BuildProcessFailure => "BuildProcessFailure",
            ErrorKind::ArtifactDiscoveryFailure => "ArtifactDiscoveryFailure",
            ErrorKind::ChecksumFailure => "ChecksumFailure",
            ErrorKind::ReportFailure => "ReportFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum Source {
    None,
    Process(process::Error),
    Io(io::Error),
    Walk(walkdir::Error),
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Source,
}

impl Error {
    fn new(kind: ErrorKind, message: impl Into<String>, source: Source) -> Self {
        Self {
            kind,
            message: message.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message, Source::None)
    }

    pub fn environment_setup(message: impl Into<String>, error: process::Error) -> Self {
        Self::new(
            ErrorKind::EnvironmentSetupFailure,
            message,
            Source::Process(error),
        )
    }

    pub fn invalid_request_io(message: impl Into<String>, error: io::Error) -> Self {
        Self::new(ErrorKind::InvalidRequest, message, Source::Io(error))
    }

    pub fn environment_setup_io(message: impl Into<String>, error: io::Error) -> Self {
        Self::new(
            ErrorKind::EnvironmentSetupFailure,
            message,
            Source::Io(error),
        )
    }

    pub fn pull(image: &str, error: process::Error) -> Self {
        Self::new(
            ErrorKind::PullFailure,
            format!("failed to pull image {image:?}"),
            Source::Process(error),
        )
    }

    pub fn build_process(error: process::Error) -> Self {
        Self::new(
            ErrorKind::BuildProcessFailure,
            "the image builder did not complete successfully",
            Source::Process(error),
        )
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArtifactDiscoveryFailure, message, Source::None)
    }

    pub fn discovery_io(path: PathBuf, error: io::Error) -> Self {
        Self::new(
            ErrorKind::ArtifactDiscoveryFailure,
            format!("failed to read output directory {path:?}"),
            Source::Io(error),
        )
    }

    pub fn discovery_walk(error: walkdir::Error) -> Self {
        let message = match error.path() {
            Some(path) => format!("failed to walk output directory entry {path:?}"),
            None => "failed to walk output directory".to_owned(),
        };
        Self::new(
            ErrorKind::ArtifactDiscoveryFailure,
            message,
            Source::Walk(error),
        )
    }

    pub fn checksum(path: PathBuf, error: io::Error) -> Self {
        Self::new(
            ErrorKind::ChecksumFailure,
            format!("failed to compute checksum of {path:?}"),
            Source::Io(error),
        )
    }

    pub fn report(message: impl Into<String>, error: io::Error) -> Self {
        Self::new(ErrorKind::ReportFailure, message, Source::Io(error))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{kind}: {message}", kind = self.kind, message = self.message)?;
        match &self.source {
            Source::None => Ok(()),
            Source::Process(error) => write!(f, ": {error}"),
            Source::Io(error) => write!(f, ": {error}"),
            Source::Walk(error) => write!(f, ": {error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Source::None => None,
            Source::Process(error) => Some(error),
            Source::Io(error) => Some(error),
            Source::Walk(error) => Some(error),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
