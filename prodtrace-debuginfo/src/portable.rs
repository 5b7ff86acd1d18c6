//! Support for Portable PDB files.

use std::fmt;

use prodtrace_common::{ByteView, DebugId, SelfCell, SourceLocation};
use prodtrace_ppdb::{FormatError, FormatErrorKind, PortablePdb};

use crate::base::SourceLookup;

/// A Portable PDB kept alive together with its file contents.
pub struct PortablePdbDebugFile {
    cell: SelfCell<ByteView<'static>, PortablePdb<'static>>,
    debug_id: DebugId,
}

impl PortablePdbDebugFile {
    /// Tests whether the buffer could contain a Portable PDB.
    pub fn test(data: &[u8]) -> bool {
        PortablePdb::peek(data)
    }

    /// Parses a Portable PDB from the given buffer.
    ///
    /// Files without a `#Pdb` stream carry no identity and are rejected.
    pub fn parse(data: ByteView<'static>) -> Result<Self, FormatError> {
        let cell = SelfCell::try_new(data, |p| PortablePdb::parse(unsafe { &*p }))?;
        let debug_id = cell
            .get()
            .debug_id()
            .ok_or(FormatErrorKind::InvalidHeader)?;

        Ok(PortablePdbDebugFile { cell, debug_id })
    }

    /// The debug identifier of this PDB, with age `1`.
    pub fn debug_id(&self) -> DebugId {
        self.debug_id
    }
}

impl fmt::Debug for PortablePdbDebugFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortablePdbDebugFile")
            .field("debug_id", &self.debug_id)
            .field("ppdb", self.cell.get())
            .finish()
    }
}

impl SourceLookup for PortablePdbDebugFile {
    fn source_location(&self, token: u32, il_offset: u32) -> Option<SourceLocation> {
        match self.cell.get().lookup(token, il_offset) {
            Ok(Some(info)) => SourceLocation::new(Some(info.file), info.line),
            Ok(None) => None,
            Err(error) => {
                tracing::debug!(%error, token, il_offset, "failed to read sequence points");
                None
            }
        }
    }
}
