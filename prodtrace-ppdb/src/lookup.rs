use crate::format::{FormatError, PortablePdb, TableType};

/// Source line information of an IL offset within a method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineInfo {
    /// The name of the document containing the sequence point, usually a full path.
    pub file: String,
    /// The start line of the sequence point.
    pub line: u32,
}

impl<'data> PortablePdb<'data> {
    /// Looks up the source location of an IL offset in the method with the given metadata token.
    ///
    /// The token must refer to the `MethodDef` table (`0x06xxxxxx`). Hidden sequence points are
    /// ignored, and the point with the greatest IL offset not exceeding `il_offset` is returned.
    /// Returns `Ok(None)` if the token is not a method of this PDB or no sequence point
    /// qualifies.
    pub fn lookup(&self, token: u32, il_offset: u32) -> Result<Option<LineInfo>, FormatError> {
        if token >> 24 != TableType::MethodDef as u32 {
            return Ok(None);
        }

        let row = (token & 0x00ff_ffff) as usize;
        let rows = self.get_table(TableType::MethodDebugInformation)?.rows;
        if row == 0 || row > rows {
            return Ok(None);
        }

        let sequence_points = self.get_sequence_points(row)?;
        let best = sequence_points
            .iter()
            .filter(|sp| !sp.is_hidden() && sp.il_offset <= il_offset)
            .max_by_key(|sp| sp.il_offset);

        let Some(point) = best else {
            return Ok(None);
        };

        let file = self.get_document_name(point.document_id as usize)?;
        Ok(Some(LineInfo {
            file,
            line: point.start_line,
        }))
    }
}
