use thiserror::Error;

pub mod access;
pub mod cli;
pub mod config;
pub mod id;
pub mod logging;
pub mod wc;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("'{0}' is not a working copy")]
    NotAWorkingCopy(String),
    #[error("working copy '{0}' locked")]
    Locked(String),
    #[error("working copy '{0}' is already open in this access set")]
    AlreadyOpen(String),
    #[error(transparent)]
    NotLocked(#[from] NotLocked),
    #[error("lock file '{0}' is not a regular file")]
    LockNotFile(String),
    #[error("path '{path}' ends in '{base_name}', which is unsupported for this operation")]
    BadPath { path: String, base_name: String },
    #[error("working copy format {format} of '{path}' is not supported")]
    UnsupportedFormat { path: String, format: u32 },
    #[error("access baton for '{0}' has been closed")]
    BatonClosed(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    MalformedId(#[from] id::IdParseError),
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error("binary encoding error")]
    Encode(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("cli error: {0}")]
    Cli(String),
}

/// Reasons a directory has no usable write lock in an access set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotLocked {
    #[error("Directory '{0}' is missing")]
    Missing(String),
    #[error("Expected '{0}' to be a directory but found a file")]
    ExpectedDirectory(String),
    #[error("Expected '{0}' to be a file but found a directory")]
    ExpectedFile(String),
    #[error("Directory '{0}' containing working copy admin area is missing")]
    AdminAreaMissing(String),
    #[error("Unable to lock '{0}'")]
    UnableToLock(String),
    #[error("Write-lock stolen in '{0}'")]
    Stolen(String),
    #[error("No write-lock in '{0}'")]
    NoWriteLock(String),
    #[error("Unable to check path existence for '{0}'")]
    ProbeFailed(String),
    #[error("Working copy '{0}' is not locked")]
    Generic(String),
}

impl Error {
    /// Downcast helper for callers branching on expected outcomes.
    pub fn of(err: &anyhow::Error) -> Option<&Error> {
        err.downcast_ref::<Error>()
    }

    pub fn is_not_a_working_copy(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(Error::NotAWorkingCopy(_)))
    }

    pub fn is_not_locked(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(Error::NotLocked(_)))
    }

    /// True for both cross-process contention and a double open inside one access set.
    pub fn is_locked(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(Error::Locked(_) | Error::AlreadyOpen(_)))
    }
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    // Initialize logging before doing anything else. Defaults to human format for the CLI.
    logging::init_logging(logging::LogFormat::Human)?;

    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;
    cli::dispatch(cli_args)
}
