//! Format-independent access to debug files.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::Path;

use prodtrace_common::{ByteView, DebugId, SourceLocation};
use prodtrace_ppdb::PortablePdb;

use crate::base::{DebugFileIdentity, FileFormat, SourceLookup};
use crate::native::NativePdbDebugFile;
use crate::portable::PortablePdbDebugFile;

macro_rules! match_inner {
    ($value:expr, DebugFile($pat:pat) => $expr:expr) => {
        match $value {
            DebugFile::Pdb($pat) => $expr,
            DebugFile::PortablePdb($pat) => $expr,
        }
    };
}

/// The error type for [`DebugFileError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugFileErrorKind {
    /// The file could not be read.
    Io,
    /// The file is neither a native nor a Portable PDB.
    UnsupportedFormat,
    /// The native PDB is corrupted.
    BadPdb,
    /// The Portable PDB is corrupted.
    BadPortablePdb,
}

impl fmt::Display for DebugFileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "failed to read debug file"),
            Self::UnsupportedFormat => write!(f, "unsupported debug file format"),
            Self::BadPdb => write!(f, "invalid pdb file"),
            Self::BadPortablePdb => write!(f, "invalid portable pdb file"),
        }
    }
}

/// An error when opening a [`DebugFile`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct DebugFileError {
    kind: DebugFileErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl DebugFileError {
    fn new<E>(kind: DebugFileErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`DebugFileErrorKind`] for this error.
    pub fn kind(&self) -> DebugFileErrorKind {
        self.kind
    }
}

impl From<DebugFileErrorKind> for DebugFileError {
    fn from(kind: DebugFileErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<io::Error> for DebugFileError {
    fn from(e: io::Error) -> Self {
        Self::new(DebugFileErrorKind::Io, e)
    }
}

/// Tries to infer the debug file format from the start of the given buffer.
pub fn peek(data: &[u8]) -> FileFormat {
    if NativePdbDebugFile::test(data) {
        FileFormat::Pdb
    } else if PortablePdbDebugFile::test(data) {
        FileFormat::PortablePdb
    } else {
        FileFormat::Unknown
    }
}

/// Reads the identity embedded in the debug file at `path`.
///
/// Unlike [`DebugFile::open`], this does not index native PDBs.
#[tracing::instrument(level = "trace", name = "peek_identity", skip_all, fields(path = %path.display()))]
pub fn peek_identity(path: &Path) -> Result<DebugFileIdentity, DebugFileError> {
    let data = ByteView::open(path)?;

    let format = peek(&data);
    let debug_id = match format {
        FileFormat::Pdb => NativePdbDebugFile::peek_id(&data)
            .map_err(|e| DebugFileError::new(DebugFileErrorKind::BadPdb, e))?,
        FileFormat::PortablePdb => PortablePdb::parse(&data)
            .map_err(|e| DebugFileError::new(DebugFileErrorKind::BadPortablePdb, e))?
            .debug_id()
            .ok_or(DebugFileErrorKind::BadPortablePdb)?,
        FileFormat::Unknown => return Err(DebugFileErrorKind::UnsupportedFormat.into()),
    };

    Ok(DebugFileIdentity { format, debug_id })
}

/// A debug file of any supported format.
///
/// The variant is selected by the file signature, not by the file name.
#[derive(Debug)]
pub enum DebugFile {
    /// A native MSF PDB.
    Pdb(NativePdbDebugFile),
    /// A Portable PDB.
    PortablePdb(PortablePdbDebugFile),
}

impl DebugFile {
    /// Opens and parses the debug file at `path`.
    #[tracing::instrument(level = "debug", name = "DebugFile::open", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, DebugFileError> {
        let data = ByteView::open(path)?;
        Self::parse(data)
    }

    /// Parses a debug file from the given buffer.
    pub fn parse(data: ByteView<'static>) -> Result<Self, DebugFileError> {
        let file = match peek(&data) {
            FileFormat::Pdb => NativePdbDebugFile::parse(&data)
                .map(DebugFile::Pdb)
                .map_err(|e| DebugFileError::new(DebugFileErrorKind::BadPdb, e))?,
            FileFormat::PortablePdb => PortablePdbDebugFile::parse(data)
                .map(DebugFile::PortablePdb)
                .map_err(|e| DebugFileError::new(DebugFileErrorKind::BadPortablePdb, e))?,
            FileFormat::Unknown => return Err(DebugFileErrorKind::UnsupportedFormat.into()),
        };

        tracing::debug!(
            format = %file.file_format(),
            debug_id = %file.debug_id(),
            "opened debug file"
        );
        Ok(file)
    }

    /// The container file format.
    pub fn file_format(&self) -> FileFormat {
        match self {
            DebugFile::Pdb(_) => FileFormat::Pdb,
            DebugFile::PortablePdb(_) => FileFormat::PortablePdb,
        }
    }

    /// The debug identifier of this file.
    pub fn debug_id(&self) -> DebugId {
        match_inner!(self, DebugFile(file) => file.debug_id())
    }

    /// The identity of this file, used to verify it against a requested identity.
    pub fn identity(&self) -> DebugFileIdentity {
        DebugFileIdentity {
            format: self.file_format(),
            debug_id: self.debug_id(),
        }
    }
}

impl SourceLookup for DebugFile {
    fn source_location(&self, token: u32, il_offset: u32) -> Option<SourceLocation> {
        match_inner!(self, DebugFile(file) => file.source_location(token, il_offset))
    }
}
