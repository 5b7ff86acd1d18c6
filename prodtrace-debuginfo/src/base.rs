use std::fmt;
use std::str::FromStr;

use prodtrace_common::{DebugId, SourceLocation};

/// Represents the physical debug file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum FileFormat {
    /// An unknown file format.
    Unknown,
    /// Program Database, the native debug companion format on Windows.
    Pdb,
    /// Portable PDB, the cross-platform debug format of .NET.
    PortablePdb,
}

impl FileFormat {
    /// Returns the name of the file format.
    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Unknown => "unknown",
            FileFormat::Pdb => "pdb",
            FileFormat::PortablePdb => "portablepdb",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error returned for unknown or invalid [`FileFormat`]s.
#[derive(Debug)]
pub struct UnknownFileFormatError;

impl fmt::Display for UnknownFileFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown file format")
    }
}

impl std::error::Error for UnknownFileFormatError {}

impl FromStr for FileFormat {
    type Err = UnknownFileFormatError;

    fn from_str(string: &str) -> Result<FileFormat, UnknownFileFormatError> {
        Ok(match string {
            "pdb" => FileFormat::Pdb,
            "portablepdb" => FileFormat::PortablePdb,
            _ => return Err(UnknownFileFormatError),
        })
    }
}

/// The identity embedded in a debug file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugFileIdentity {
    /// The format of the file the identity was read from.
    pub format: FileFormat,
    /// GUID and age of the file.
    pub debug_id: DebugId,
}

impl DebugFileIdentity {
    /// Checks whether this file is the one requested by `requested`.
    ///
    /// Native PDBs must match GUID and age. Portable PDBs carry no age, so only the GUID is
    /// compared.
    pub fn matches(&self, requested: &DebugId) -> bool {
        match self.format {
            FileFormat::PortablePdb => self.debug_id.uuid() == requested.uuid(),
            _ => self.debug_id == *requested,
        }
    }
}

/// Resolves method tokens and IL offsets to source locations.
///
/// Implementors answer "no location" with `None` whenever the token is unknown or no line
/// information covers the offset.
pub trait SourceLookup {
    /// Returns the source location of `il_offset` within the method `token`.
    fn source_location(&self, token: u32, il_offset: u32) -> Option<SourceLocation>;
}

impl<T: SourceLookup + ?Sized> SourceLookup for &T {
    fn source_location(&self, token: u32, il_offset: u32) -> Option<SourceLocation> {
        (**self).source_location(token, il_offset)
    }
}

impl<T: SourceLookup + ?Sized> SourceLookup for Box<T> {
    fn source_location(&self, token: u32, il_offset: u32) -> Option<SourceLocation> {
        (**self).source_location(token, il_offset)
    }
}
