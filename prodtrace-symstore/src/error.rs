use std::error::Error;
use std::fmt;
use std::io;

/// The error type for [`SymbolError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolErrorKind {
    /// Reading or writing a local file failed.
    Io,
    /// A symbol package could not be read as a zip archive.
    BadArchive,
    /// A debug file extracted from a symbol package does not match the requested identity.
    ///
    /// The package name matched the requested assembly version, so this indicates an
    /// inconsistent package rather than a miss.
    ArchiveMismatch,
    /// Downloading from a remote symbol store failed.
    Download,
}

impl fmt::Display for SymbolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "failed to access symbol file"),
            Self::BadArchive => write!(f, "invalid symbol package"),
            Self::ArchiveMismatch => {
                write!(f, "debug file in symbol package does not match the requested identity")
            }
            Self::Download => write!(f, "failed to download symbol file"),
        }
    }
}

/// An error returned by the [`SymbolStore`](crate::SymbolStore).
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct SymbolError {
    kind: SymbolErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl SymbolError {
    pub(crate) fn new<E>(kind: SymbolErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`SymbolErrorKind`] for this error.
    pub fn kind(&self) -> SymbolErrorKind {
        self.kind
    }
}

impl From<SymbolErrorKind> for SymbolError {
    fn from(kind: SymbolErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<io::Error> for SymbolError {
    fn from(e: io::Error) -> Self {
        Self::new(SymbolErrorKind::Io, e)
    }
}
