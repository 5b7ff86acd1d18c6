use std::fmt;

use super::metadata::TableType;
use super::utils::{decode_signed, decode_unsigned};
use super::{FormatError, FormatErrorKind, PortablePdb};

/// Line number marking a hidden sequence point.
const HIDDEN_LINE: u32 = 0xfeefee;

/// A single entry of a method's sequence points blob.
///
/// See <https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#sequence-points-blob>.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct SequencePoint {
    pub(crate) il_offset: u32,
    pub(crate) start_line: u32,
    pub(crate) start_column: u32,
    pub(crate) end_line: u32,
    pub(crate) end_column: u32,
    /// 1-based row in the `Document` table.
    pub(crate) document_id: u32,
}

impl SequencePoint {
    /// Returns true if this is a "hidden" sequence point.
    pub(crate) fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
            && self.end_line == HIDDEN_LINE
            && self.start_column == 0
            && self.end_column == 0
    }

    fn new(
        il_offset: u32,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        document_id: u32,
    ) -> Result<Self, FormatError> {
        if il_offset >= 0x20000000
            || start_line >= 0x20000000
            || end_line >= 0x20000000
            || start_column >= 0x10000
            || end_column >= 0x10000
            || start_line == HIDDEN_LINE
            || end_line == HIDDEN_LINE
            || end_line < start_line
            || (end_line == start_line && end_column <= start_column)
        {
            Err(FormatErrorKind::InvalidSequencePoint.into())
        } else {
            Ok(Self {
                il_offset,
                start_line,
                start_column,
                end_line,
                end_column,
                document_id,
            })
        }
    }

    fn new_hidden(il_offset: u32, document_id: u32) -> Self {
        Self {
            il_offset,
            start_line: HIDDEN_LINE,
            start_column: 0,
            end_line: HIDDEN_LINE,
            end_column: 0,
            document_id,
        }
    }

    /// Parses one record of the blob.
    ///
    /// The first record stores the absolute IL offset, later ones the delta to the previous
    /// record. Start line and column of the first non-hidden record are absolute, later ones are
    /// signed deltas to the previous non-hidden record.
    fn parse(
        data: &[u8],
        prev: Option<SequencePoint>,
        prev_non_hidden: Option<SequencePoint>,
        document_id: u32,
    ) -> Result<(Self, &[u8]), FormatError> {
        let invalid = || FormatError::from(FormatErrorKind::InvalidSequencePoint);

        let (il_offset, data) = match prev {
            Some(prev) => {
                let (delta_il_offset, data) = decode_unsigned(data)?;
                let il_offset = prev
                    .il_offset
                    .checked_add(delta_il_offset)
                    .ok_or_else(invalid)?;
                (il_offset, data)
            }
            None => decode_unsigned(data)?,
        };

        let (delta_lines, data) = decode_unsigned(data)?;
        let (delta_cols, data) = if delta_lines == 0 {
            let (n, data) = decode_unsigned(data)?;
            (n as i64, data)
        } else {
            let (n, data) = decode_signed(data)?;
            (n as i64, data)
        };

        if delta_lines == 0 && delta_cols == 0 {
            return Ok((Self::new_hidden(il_offset, document_id), data));
        }

        let (start_line, start_column, data) = match prev_non_hidden {
            Some(prev) => {
                let (delta_start_line, data) = decode_signed(data)?;
                let (delta_start_col, data) = decode_signed(data)?;
                let start_line = prev.start_line as i64 + delta_start_line as i64;
                let start_column = prev.start_column as i64 + delta_start_col as i64;
                (start_line, start_column, data)
            }
            None => {
                let (start_line, data) = decode_unsigned(data)?;
                let (start_column, data) = decode_unsigned(data)?;
                (start_line as i64, start_column as i64, data)
            }
        };

        let end_line = start_line + delta_lines as i64;
        let end_column = start_column + delta_cols;

        let to_u32 = |n: i64| u32::try_from(n).map_err(|_| invalid());
        let point = Self::new(
            il_offset,
            to_u32(start_line)?,
            to_u32(start_column)?,
            to_u32(end_line)?,
            to_u32(end_column)?,
            document_id,
        )?;

        Ok((point, data))
    }
}

impl fmt::Debug for SequencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hidden() {
            f.debug_struct("HiddenSequencePoint")
                .field("il_offset", &self.il_offset)
                .field("document_id", &self.document_id)
                .finish()
        } else {
            f.debug_struct("SequencePoint")
                .field("il_offset", &self.il_offset)
                .field("start_line", &self.start_line)
                .field("start_column", &self.start_column)
                .field("end_line", &self.end_line)
                .field("end_column", &self.end_column)
                .field("document_id", &self.document_id)
                .finish()
        }
    }
}

impl<'data> PortablePdb<'data> {
    /// Decodes the sequence points of the method in the given `MethodDebugInformation` row.
    ///
    /// The row equals the row of the method in the assembly's `MethodDef` table.
    pub(crate) fn get_sequence_points(&self, row: usize) -> Result<Vec<SequencePoint>, FormatError> {
        let document = self.get_table_cell_u32(TableType::MethodDebugInformation, row, 1)?;
        let offset = self.get_table_cell_u32(TableType::MethodDebugInformation, row, 2)?;
        if offset == 0 {
            return Ok(Vec::new());
        }

        let data = self.get_blob(offset)?;
        let (_local_signature, mut data) = decode_unsigned(data)?;
        let mut current_document = match document {
            0 => {
                let (initial_document, rest) = decode_unsigned(data)?;
                data = rest;
                initial_document
            }
            _ => document,
        };

        let mut sequence_points: Vec<SequencePoint> = Vec::new();
        let mut last_non_hidden = None;

        while !data.is_empty() {
            // A zero IL delta after the first record introduces a document change.
            if !sequence_points.is_empty() && data[0] == 0 {
                let (doc, rest) = decode_unsigned(&data[1..])?;
                current_document = doc;
                data = rest;
                continue;
            }

            let (sequence_point, rest) = SequencePoint::parse(
                data,
                sequence_points.last().copied(),
                last_non_hidden,
                current_document,
            )?;
            data = rest;

            sequence_points.push(sequence_point);
            if !sequence_point.is_hidden() {
                last_non_hidden = Some(sequence_point);
            }
        }

        Ok(sequence_points)
    }
}
