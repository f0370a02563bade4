use std::fmt;

/// Failure of a repository operation.
///
/// Besides the [`ErrorKind`] every error can carry the name of the operation that
/// failed, the diagnostic text the backend produced, and the arguments involved
/// (paths, ref names). The UI relies on all three to show an actionable message.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    operation: Option<String>,
    output: Option<String>,
    args: Option<Vec<String>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            operation: None,
            output: None,
            args: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn args(&self) -> Option<&[String]> {
        self.args.as_deref()
    }

    /// Re-kinds the error, keeping operation, output and args.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.output = Some(output);
        }
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Stamps `operation` unless a more specific name was recorded closer to the failure.
    pub fn in_operation(mut self, operation: &str) -> Self {
        if self.operation.is_none() {
            self.operation = Some(operation.to_string());
        }
        self
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::new(ErrorKind::PermissionDenied).with_output(err.to_string())
            }
            kind => Self::new(ErrorKind::Io(kind)).with_output(err.to_string()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(operation) => write!(f, "{operation}: {}", self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }
        if let Some(output) = &self.output {
            write!(f, "\n{}", output.trim_end())?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    #[error("i/o error: {0:?}")]
    Io(std::io::ErrorKind),
    #[error("not a git repository")]
    NotARepository,
    #[error("permission denied")]
    PermissionDenied,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("{0}")]
    Backend(String),

    #[error("another write is in progress")]
    WriteLockUnavailable,
    #[error("git command failed")]
    GitCommandFailed,
    #[error("uncommitted changes would be overwritten")]
    UncommittedChanges,
    #[error("reference not found")]
    RefNotFound,
    #[error("patch did not apply")]
    PatchDidNotApply,
    #[error("stash produced conflicts")]
    StashConflict,
    #[error("reference is in use")]
    RefInUse,
    #[error("object not found")]
    ObjectNotFound,
    #[error("repository is shutting down")]
    RepositoryShuttingDown,
    #[error("file system watch unavailable")]
    WatchUnavailable,
    #[error("cancelled")]
    Cancelled,
}

/// How the UI should react to an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Repository missing, permissions, watch failures. Degrade, never crash.
    Environment,
    /// The tool or library refused the operation. Show the diagnostic text.
    Operation,
    /// State moved underneath a stale read. Offer "refresh and retry".
    Race,
    /// Misuse such as calling into a handle that is shutting down.
    Contract,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Io(_)
            | ErrorKind::NotARepository
            | ErrorKind::PermissionDenied
            | ErrorKind::WatchUnavailable => ErrorCategory::Environment,
            ErrorKind::PatchDidNotApply | ErrorKind::WriteLockUnavailable => ErrorCategory::Race,
            ErrorKind::RepositoryShuttingDown | ErrorKind::Unsupported(_) => {
                ErrorCategory::Contract
            }
            ErrorKind::Backend(_)
            | ErrorKind::GitCommandFailed
            | ErrorKind::UncommittedChanges
            | ErrorKind::RefNotFound
            | ErrorKind::StashConflict
            | ErrorKind::RefInUse
            | ErrorKind::ObjectNotFound
            | ErrorKind::Cancelled => ErrorCategory::Operation,
        }
    }
}
