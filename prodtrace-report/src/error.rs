use std::error::Error;
use std::fmt;

/// The error type for [`ReportError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportErrorKind {
    /// The report could not be read.
    Read,
    /// The translated report could not be written.
    Write,
}

impl fmt::Display for ReportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "failed to read report"),
            Self::Write => write!(f, "failed to write translated report"),
        }
    }
}

/// An error when translating a report.
///
/// Malformed report content and missing debug files are never errors; only failures of the
/// underlying reader or writer are reported.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ReportError {
    kind: ReportErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ReportError {
    pub(crate) fn new<E>(kind: ReportErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`ReportErrorKind`] for this error.
    pub fn kind(&self) -> ReportErrorKind {
        self.kind
    }
}

impl From<ReportErrorKind> for ReportError {
    fn from(kind: ReportErrorKind) -> Self {
        Self { kind, source: None }
    }
}
