mod metadata;
mod raw;
mod sequence_points;
mod streams;
mod utils;

use std::fmt;

use thiserror::Error;
use watto::Pod;

use prodtrace_common::{AsSelf, DebugId, Uuid};

pub use metadata::TableType;

use metadata::{MetadataStream, Table};
use streams::{BlobStream, PdbStream};

/// The kind of a [`FormatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FormatErrorKind {
    /// The header of the Portable PDB file could not be read.
    #[error("invalid header")]
    InvalidHeader,
    /// The header of the Portable PDB does not contain the `BSJB` signature.
    #[error("invalid signature")]
    InvalidSignature,
    /// The file ends prematurely.
    #[error("invalid length")]
    InvalidLength,
    /// The file does not contain a valid version string.
    #[error("invalid version string")]
    InvalidVersionString,
    /// A stream header could not be read.
    #[error("invalid stream header")]
    InvalidStreamHeader,
    /// A stream's name could not be read.
    #[error("invalid stream name")]
    InvalidStreamName,
    /// The table stream is too small to hold all claimed tables.
    #[error(
        "insufficient table data: {0} bytes required, but table stream only contains {1} bytes"
    )]
    InsufficientTableData(usize, usize),
    /// The table stream declares a table that is not part of the known schema.
    #[error("unknown table {0:#04x}")]
    UnknownTable(usize),
    /// The given offset is out of bounds for the `#Blob` heap.
    #[error("invalid blob offset")]
    InvalidBlobOffset,
    /// The given offset points to invalid blob data.
    #[error("invalid blob data")]
    InvalidBlobData,
    /// Blob data was requested, but the file does not contain a `#Blob` stream.
    #[error("file does not contain a #Blob stream")]
    NoBlobStream,
    /// Tried to read an invalid compressed unsigned number.
    #[error("invalid compressed unsigned number")]
    InvalidCompressedUnsigned,
    /// Tried to read an invalid compressed signed number.
    #[error("invalid compressed signed number")]
    InvalidCompressedSigned,
    /// Could not read a document name.
    #[error("invalid document name")]
    InvalidDocumentName,
    /// Failed to parse a sequence point.
    #[error("invalid sequence point")]
    InvalidSequencePoint,
    /// Table data was requested, but the file does not contain a `#~` stream.
    #[error("file does not contain a #~ stream")]
    NoMetadataStream,
    /// The given row index is out of bounds for the table.
    #[error("row index {1} is out of bounds for table {0:?}")]
    RowIndexOutOfBounds(TableType, usize),
    /// The given column index is out of bounds for the table.
    #[error("column index {1} is out of bounds for table {0:?}")]
    ColIndexOutOfBounds(TableType, usize),
}

/// An error encountered while parsing a [`PortablePdb`] file.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FormatError {
    pub(crate) kind: FormatErrorKind,
    #[source]
    pub(crate) source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FormatError {
    /// Creates a new FormatError from a known kind of error as well as an arbitrary error
    /// payload.
    pub(crate) fn new<E>(kind: FormatErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`FormatErrorKind`] for this error.
    pub fn kind(&self) -> FormatErrorKind {
        self.kind
    }
}

impl From<FormatErrorKind> for FormatError {
    fn from(kind: FormatErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// A parsed Portable PDB file.
///
/// Only the streams needed for line lookups are interpreted: `#Pdb`, `#~` and `#Blob`.
#[derive(Clone)]
pub struct PortablePdb<'data> {
    header: &'data raw::Header,
    version_string: &'data str,
    pdb_stream: Option<PdbStream<'data>>,
    metadata_stream: Option<MetadataStream<'data>>,
    blob_stream: Option<BlobStream<'data>>,
}

impl fmt::Debug for PortablePdb<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortablePdb")
            .field("header", &self.header)
            .field("version_string", &self.version_string)
            .field("pdb_guid", &self.pdb_guid())
            .field("has_table_stream", &self.metadata_stream.is_some())
            .field("has_blob_stream", &self.blob_stream.is_some())
            .finish()
    }
}

impl<'slf, 'data: 'slf> AsSelf<'slf> for PortablePdb<'data> {
    type Ref = PortablePdb<'slf>;

    fn as_self(&'slf self) -> &'slf Self::Ref {
        self
    }
}

impl<'data> PortablePdb<'data> {
    /// Checks whether the provided buffer could potentially be a Portable PDB file,
    /// without fully parsing it.
    pub fn peek(buf: &[u8]) -> bool {
        match buf.get(..4) {
            Some(magic) => u32::from_le_bytes([magic[0], magic[1], magic[2], magic[3]])
                == raw::METADATA_SIGNATURE,
            None => false,
        }
    }

    /// Parses the provided buffer into a Portable PDB file.
    #[tracing::instrument(level = "trace", name = "PortablePdb::parse", skip_all)]
    pub fn parse(buf: &'data [u8]) -> Result<Self, FormatError> {
        let (header, rest) =
            raw::Header::ref_from_prefix(buf).ok_or(FormatErrorKind::InvalidHeader)?;

        if header.signature != raw::METADATA_SIGNATURE {
            return Err(FormatErrorKind::InvalidSignature.into());
        }

        let version_length = header.version_length as usize;
        let version_buf = rest
            .get(..version_length)
            .ok_or(FormatErrorKind::InvalidLength)?;
        let version_buf = version_buf
            .split(|c| *c == 0)
            .next()
            .ok_or(FormatErrorKind::InvalidVersionString)?;
        let version_string = std::str::from_utf8(version_buf)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidVersionString, e))?;

        let streams_buf = &rest[version_length..];
        let (header2, mut streams_buf) =
            raw::HeaderPart2::ref_from_prefix(streams_buf).ok_or(FormatErrorKind::InvalidHeader)?;

        let mut pdb_stream = None;
        let mut tables_buf = None;
        let mut blob_stream = None;

        for _ in 0..header2.streams {
            let (stream, after_header_buf) = raw::StreamHeader::ref_from_prefix(streams_buf)
                .ok_or(FormatErrorKind::InvalidStreamHeader)?;

            let name_buf = after_header_buf.get(..32).unwrap_or(after_header_buf);
            let name_buf = name_buf
                .split(|c| *c == 0)
                .next()
                .ok_or(FormatErrorKind::InvalidStreamName)?;
            let name = std::str::from_utf8(name_buf)
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidStreamName, e))?;

            // Names are null terminated and padded to the next 4 byte boundary.
            let rounded_name_len = (name.len() + 4) & !3;
            streams_buf = after_header_buf
                .get(rounded_name_len..)
                .ok_or(FormatErrorKind::InvalidLength)?;

            let offset = stream.offset as usize;
            let size = stream.size as usize;
            let stream_buf = buf
                .get(offset..offset.saturating_add(size))
                .ok_or(FormatErrorKind::InvalidLength)?;

            match name {
                "#Pdb" => pdb_stream = Some(PdbStream::parse(stream_buf)?),
                "#~" => tables_buf = Some(stream_buf),
                "#Blob" => blob_stream = Some(BlobStream::new(stream_buf)),
                // String, user string, GUID and JIT streams carry nothing line lookups need.
                _ => {}
            }
        }

        // The table layout depends on the row counts of the type system tables, which are
        // recorded in the `#Pdb` stream regardless of stream order.
        let referenced_table_sizes = pdb_stream
            .as_ref()
            .map_or([0; 64], |s: &PdbStream| s.referenced_table_sizes);
        let metadata_stream = tables_buf
            .map(|buf| MetadataStream::parse(buf, &referenced_table_sizes))
            .transpose()?;

        Ok(Self {
            header,
            version_string,
            pdb_stream,
            metadata_stream,
            blob_stream,
        })
    }

    /// The metadata version string, usually `PDB v1.0`.
    pub fn version_string(&self) -> &'data str {
        self.version_string
    }

    /// The GUID identifying this PDB, read from the `#Pdb` stream.
    ///
    /// It equals the GUID of the CodeView debug directory entry in the assembly the PDB belongs
    /// to.
    pub fn pdb_guid(&self) -> Option<Uuid> {
        self.pdb_stream.as_ref().map(|stream| stream.guid())
    }

    /// The debug identifier of this PDB.
    ///
    /// Portable PDBs have no age. The runtime reports them with age `1`, which is used here.
    pub fn debug_id(&self) -> Option<DebugId> {
        self.pdb_guid().map(|guid| DebugId::from_parts(guid, 1))
    }

    /// Reads the blob starting at the given offset from this file's blob heap.
    pub(crate) fn get_blob(&self, offset: u32) -> Result<&'data [u8], FormatError> {
        self.blob_stream
            .as_ref()
            .ok_or(FormatErrorKind::NoBlobStream)?
            .get_blob(offset)
    }

    pub(crate) fn get_table(&self, table: TableType) -> Result<Table<'data>, FormatError> {
        let md_stream = self
            .metadata_stream
            .as_ref()
            .ok_or(FormatErrorKind::NoMetadataStream)?;
        Ok(md_stream[table])
    }

    /// Reads the `(row, col)` cell of the given table.
    ///
    /// Row and column indices are 1-based.
    pub(crate) fn get_table_cell_u32(
        &self,
        table: TableType,
        row: usize,
        col: usize,
    ) -> Result<u32, FormatError> {
        self.get_table(table)?.get_cell_u32(row, col)
    }

    /// Reads the name of the document in the given row of the `Document` table.
    pub(crate) fn get_document_name(&self, row: usize) -> Result<String, FormatError> {
        let offset = self.get_table_cell_u32(TableType::Document, row, 1)?;
        self.decode_document_name(offset)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidDocumentName, e))
    }

    /// Document names are stored as a separator followed by blob indices of the path parts.
    fn decode_document_name(&self, offset: u32) -> Result<String, FormatError> {
        let data = self.get_blob(offset)?;
        let (&sep, mut data) = data
            .split_first()
            .ok_or(FormatErrorKind::InvalidBlobOffset)?;
        let sep = if sep == 0 {
            ""
        } else {
            std::str::from_utf8(std::slice::from_ref(&sep))
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidBlobData, e))?
        };

        let mut segments = Vec::new();
        while !data.is_empty() {
            let (idx, rest) = utils::decode_unsigned(data)?;
            data = rest;

            let segment = if idx == 0 {
                ""
            } else {
                std::str::from_utf8(self.get_blob(idx)?)
                    .map_err(|e| FormatError::new(FormatErrorKind::InvalidBlobData, e))?
            };
            segments.push(segment);
        }

        Ok(segments.join(sep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek() {
        assert!(PortablePdb::peek(b"BSJB\x01\x00\x01\x00"));
        assert!(!PortablePdb::peek(b"Microsoft C/C++ MSF 7.00\r\n"));
        assert!(!PortablePdb::peek(b"BSJ"));
    }

    #[test]
    fn test_parse_bad_signature() {
        let mut data = vec![0u8; 32];
        data[..4].copy_from_slice(b"BSJA");
        let err = PortablePdb::parse(&data).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidSignature);
    }

    #[test]
    fn test_parse_truncated() {
        let err = PortablePdb::parse(b"BSJB").unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidHeader);
    }
}
