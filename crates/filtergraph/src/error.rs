//! Error types shared by layouts, the compiler and the runtime pipeline
//!
//! Every failure is raised at the call that detects it. Callers higher up may wrap an
//! error with extra context; [`Error::kind`] still reports the original category.

use std::fmt;

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The graph description is malformed (names, ports, connections)
    Configuration,
    /// The compiler could not produce an execution plan
    Build,
    /// A run-time call was made with the wrong arguments or an unknown name
    Runtime,
    /// The device backend reported a failure
    Device,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration error"),
            Self::Build => write!(f, "build error"),
            Self::Runtime => write!(f, "runtime error"),
            Self::Device => write!(f, "device error"),
        }
    }
}

/// Errors raised by filter graph construction, compilation and execution
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed graph: duplicate names, re-targeted ports, dangling ports
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Scheduling or merging could not make progress
    #[error("build error: {0}")]
    Build(String),
    /// Wrong number of inputs, unknown output or filter path
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Failure reported by the device backend
    #[error("device error: {0}")]
    Device(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Another error with a message prepended by an outer layer
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub(crate) fn device<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Device(Box::new(error))
    }

    /// Returns the category of the innermost error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Build(_) => ErrorKind::Build,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Device(_) => ErrorKind::Device,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Wraps this error with a message describing the operation that failed
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension for attaching context to results
pub trait ResultExt<T> {
    /// Prepends `context` to the error, if any
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`] but only builds the message on failure
    fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
