//! Support for native Program Database files produced for managed code.
//!
//! The .NET compilers targeting the full framework emit MSF 7.00 PDBs. Methods are stored as
//! managed procedure records (`S_GMANPROC` / `S_LMANPROC`) carrying their metadata token, and line
//! records are relative to the procedure's section offset. Adding the IL offset to the procedure
//! offset yields the address to look up.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::Cursor;

use pdb_addr2line::pdb::{
    self, FallibleIterator, LineProgram, PdbInternalSectionOffset, StringTable,
};
use thiserror::Error;

use prodtrace_common::{DebugId, SourceLocation, Uuid};

use crate::base::SourceLookup;

type Pdb<'data> = pdb::PDB<'data, Cursor<&'data [u8]>>;

const MAGIC_BIG: &[u8] = b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00";

const S_GMANPROC_ST: u16 = 0x101a;
const S_LMANPROC_ST: u16 = 0x101b;
const S_GMANPROC: u16 = 0x112a;
const S_LMANPROC: u16 = 0x112b;

/// Line numbers the compiler emits for code without a source mapping.
///
/// `0xfeefee` marks hidden code, `0xf00f00` compiler generated step-through code.
const SENTINEL_LINES: [u32; 2] = [0xfeefee, 0xf00f00];

/// The IL distance skipped per retry after hitting a sentinel line.
const RETRY_DELTA: u32 = 32;

/// The maximum number of retries after hitting a sentinel line.
const MAX_RETRIES: u32 = 8;

/// The error type for [`NativePdbError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativePdbErrorKind {
    /// The PDB file is corrupted. See the cause for more information.
    BadObject,
}

impl fmt::Display for NativePdbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadObject => write!(f, "invalid pdb file"),
        }
    }
}

/// An error when reading a [`NativePdbDebugFile`].
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct NativePdbError {
    kind: NativePdbErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl NativePdbError {
    fn new<E>(kind: NativePdbErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`NativePdbErrorKind`] for this error.
    pub fn kind(&self) -> NativePdbErrorKind {
        self.kind
    }
}

impl From<pdb::Error> for NativePdbError {
    fn from(e: pdb::Error) -> Self {
        Self::new(NativePdbErrorKind::BadObject, e)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LineRecord {
    offset: u32,
    length: Option<u32>,
    line: u32,
    file: Option<String>,
}

impl LineRecord {
    fn covers(&self, address: u32) -> bool {
        match self.length {
            Some(length) => {
                let end = u64::from(self.offset) + u64::from(length);
                self.offset <= address && u64::from(address) < end
            }
            None => self.offset == address,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct ManagedMethod {
    offset: u32,
    /// Line records ordered by offset.
    lines: Vec<LineRecord>,
}

impl ManagedMethod {
    /// Finds the line record covering `address`, else the closest one before it.
    fn line_at(&self, address: u32) -> Option<&LineRecord> {
        self.lines
            .iter()
            .find(|record| record.covers(address))
            .or_else(|| self.lines.iter().rev().find(|record| record.offset <= address))
    }
}

/// The raw fields of a managed procedure record that are needed for lookups.
struct ManagedProcedure {
    token: u32,
    offset: PdbInternalSectionOffset,
}

impl ManagedProcedure {
    /// Parses the record bytes, which start with the two byte symbol kind.
    ///
    /// Layout: kind, parent, end, next, len, debug start, debug end, token, offset, segment.
    fn parse(data: &[u8]) -> Option<Self> {
        let u32_at = |pos: usize| -> Option<u32> {
            let bytes = data.get(pos..pos + 4)?;
            Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        };

        let token = u32_at(26)?;
        let offset = u32_at(30)?;
        let section = data.get(34..36)?;

        Some(ManagedProcedure {
            token,
            offset: PdbInternalSectionOffset {
                offset,
                section: u16::from_le_bytes([section[0], section[1]]),
            },
        })
    }
}

/// A native PDB, indexed by the metadata tokens of its managed methods.
///
/// The index is built eagerly when parsing and owns all data, so the file buffer can be released
/// afterwards.
pub struct NativePdbDebugFile {
    debug_id: DebugId,
    methods: HashMap<u32, ManagedMethod>,
}

impl fmt::Debug for NativePdbDebugFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePdbDebugFile")
            .field("debug_id", &self.debug_id)
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl NativePdbDebugFile {
    /// Tests whether the buffer could contain a native PDB.
    pub fn test(data: &[u8]) -> bool {
        // NB: "Microsoft C/C++ program database 2.00" is not supported by the pdb crate.
        data.starts_with(MAGIC_BIG)
    }

    /// Reads only the identity of the PDB in `data`.
    pub fn peek_id(data: &[u8]) -> Result<DebugId, NativePdbError> {
        let mut pdb = Pdb::open(Cursor::new(data))?;
        read_debug_id(&mut pdb)
    }

    /// Parses the PDB and indexes all managed procedures.
    pub fn parse(data: &[u8]) -> Result<Self, NativePdbError> {
        let mut pdb = Pdb::open(Cursor::new(data))?;
        let debug_id = read_debug_id(&mut pdb)?;

        // PDB::string_table errors if the named stream for the string table is not present.
        // However, this occurs in certain PDBs and does not automatically indicate an error.
        let string_table = match pdb.string_table() {
            Ok(string_table) => Some(string_table),
            Err(pdb::Error::StreamNameNotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let debug_info = pdb.debug_information()?;
        let mut modules = debug_info.modules()?;
        let mut methods = HashMap::new();

        while let Some(module) = modules.next()? {
            let info = match pdb.module_info(&module)? {
                Some(info) => info,
                None => continue,
            };

            let program = info.line_program()?;
            let mut symbols = info.symbols()?;
            while let Some(symbol) = symbols.next()? {
                if !matches!(
                    symbol.raw_kind(),
                    S_GMANPROC | S_LMANPROC | S_GMANPROC_ST | S_LMANPROC_ST
                ) {
                    continue;
                }

                let procedure = match ManagedProcedure::parse(symbol.raw_bytes()) {
                    Some(procedure) => procedure,
                    None => continue,
                };

                let lines = collect_lines(&program, procedure.offset, string_table.as_ref());
                let lines = match lines {
                    Ok(lines) => lines,
                    Err(error) => {
                        tracing::debug!(
                            token = procedure.token,
                            %error,
                            "skipping managed procedure with unreadable lines"
                        );
                        continue;
                    }
                };
                methods.insert(
                    procedure.token,
                    ManagedMethod {
                        offset: procedure.offset.offset,
                        lines,
                    },
                );
            }
        }

        tracing::debug!(%debug_id, methods = methods.len(), "indexed managed procedures");
        Ok(NativePdbDebugFile { debug_id, methods })
    }

    /// The debug identifier of this PDB.
    ///
    /// The age is taken from the debug information stream if present, as it is more likely to
    /// correspond to the executable than the PDB info header.
    pub fn debug_id(&self) -> DebugId {
        self.debug_id
    }

    fn line_at(&self, token: u32, il_offset: u32) -> Option<&LineRecord> {
        let method = self.methods.get(&token)?;
        let address = method.offset.checked_add(il_offset)?;
        method.line_at(address)
    }
}

impl SourceLookup for NativePdbDebugFile {
    fn source_location(&self, token: u32, il_offset: u32) -> Option<SourceLocation> {
        resolve_with_retry(il_offset, |offset| self.line_at(token, offset))
    }
}

fn read_debug_id(pdb: &mut Pdb<'_>) -> Result<DebugId, NativePdbError> {
    let pdb_info = pdb.pdb_information()?;
    let debug_info = pdb.debug_information()?;
    let age = debug_info.age().unwrap_or(pdb_info.age);
    let uuid = Uuid::from_bytes(*pdb_info.guid.as_bytes());
    Ok(DebugId::from_parts(uuid, age))
}

fn collect_lines(
    program: &LineProgram<'_>,
    offset: PdbInternalSectionOffset,
    string_table: Option<&StringTable<'_>>,
) -> Result<Vec<LineRecord>, NativePdbError> {
    let mut lines = Vec::new();
    let mut line_iter = program.lines_for_symbol(offset);

    while let Some(line_info) = line_iter.next()? {
        let file_info = program.get_file_info(line_info.file_index)?;
        let file = match string_table {
            Some(string_table) => {
                let name = file_info.name.to_raw_string(string_table)?;
                Some(name.to_string().into_owned())
            }
            None => None,
        };

        lines.push(LineRecord {
            offset: line_info.offset.offset,
            length: line_info.length,
            line: line_info.line_start,
            file,
        });
    }

    lines.sort_by_key(|line| line.offset);
    Ok(lines)
}

/// Resolves a line, skipping ahead over sentinel lines.
///
/// When a lookup lands on a sentinel line, it is retried [`RETRY_DELTA`] bytes further into the
/// method, at most [`MAX_RETRIES`] times. This maps compiler generated wrapper code to the next
/// user statement.
fn resolve_with_retry<'a, F>(il_offset: u32, lookup: F) -> Option<SourceLocation>
where
    F: Fn(u32) -> Option<&'a LineRecord>,
{
    let mut offset = il_offset;

    for attempt in 0..=MAX_RETRIES {
        let record = lookup(offset)?;
        if !SENTINEL_LINES.contains(&record.line) {
            return SourceLocation::new(record.file.as_deref(), record.line);
        }

        tracing::trace!(offset, attempt, line = record.line, "skipping sentinel line");
        offset = offset.checked_add(RETRY_DELTA)?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn record(offset: u32, length: u32, line: u32) -> LineRecord {
        LineRecord {
            offset,
            length: Some(length),
            line,
            file: Some("Class1.cs".into()),
        }
    }

    fn method(lines: Vec<LineRecord>) -> ManagedMethod {
        ManagedMethod {
            offset: 0x100,
            lines,
        }
    }

    fn location(line: u32) -> Option<SourceLocation> {
        SourceLocation::new(Some("Class1.cs"), line)
    }

    fn managed_procedure_record(token: u32, offset: u32, section: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&S_GMANPROC.to_le_bytes());
        // parent, end, next, len, debug start, debug end
        for value in [0u32, 0x40, 0, 0x2a, 1, 0x29] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.extend_from_slice(&token.to_le_bytes());
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&section.to_le_bytes());
        // flags, return register, name
        data.push(0);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(b"Main\0");
        data
    }

    #[test]
    fn test_parse_managed_procedure() {
        let data = managed_procedure_record(0x0600_002a, 0x1234, 3);
        let procedure = ManagedProcedure::parse(&data).unwrap();

        assert_eq!(procedure.token, 0x0600_002a);
        assert_eq!(procedure.offset.offset, 0x1234);
        assert_eq!(procedure.offset.section, 3);
    }

    #[test]
    fn test_parse_truncated_procedure() {
        let data = managed_procedure_record(0x0600_0001, 0x10, 1);
        assert!(ManagedProcedure::parse(&data[..35]).is_none());
        assert!(ManagedProcedure::parse(&data[..36]).is_some());
    }

    #[test]
    fn test_detects_magic() {
        assert!(NativePdbDebugFile::test(MAGIC_BIG));
        assert!(!NativePdbDebugFile::test(b"BSJB"));
    }

    #[test]
    fn test_line_at_covering_and_preceding() {
        let method = method(vec![
            record(0x100, 4, 10),
            record(0x104, 8, 11),
            record(0x120, 2, 12),
        ]);

        assert_eq!(method.line_at(0x100).unwrap().line, 10);
        assert_eq!(method.line_at(0x106).unwrap().line, 11);
        // Gap between 0x10c and 0x120 falls back to the preceding record.
        assert_eq!(method.line_at(0x110).unwrap().line, 11);
        assert_eq!(method.line_at(0x130).unwrap().line, 12);
        assert_eq!(method.line_at(0xff), None);
    }

    #[test]
    fn test_resolve_without_sentinel() {
        let lines = [record(0, 4, 42)];
        let result = resolve_with_retry(0, |_| lines.first());
        assert_eq!(result, location(42));
    }

    #[test]
    fn test_resolve_skips_sentinels() {
        let method = method(vec![
            record(0x100, 0x20, 0xfeefee),
            record(0x120, 0x20, 0xf00f00),
            record(0x140, 0x10, 27),
        ]);

        let result = resolve_with_retry(0x4, |offset| method.line_at(0x100 + offset));
        assert_eq!(result, location(27));
    }

    #[test]
    fn test_resolve_retry_limit() {
        let hidden = record(0, u32::MAX, 0xfeefee);
        let calls = std::cell::Cell::new(0);
        let result = resolve_with_retry(0, |_| {
            calls.set(calls.get() + 1);
            Some(&hidden)
        });

        assert_eq!(result, None);
        assert_eq!(calls.get(), MAX_RETRIES + 1);
    }

    #[test]
    fn test_resolve_missing_line() {
        let result = resolve_with_retry(0, |_| None);
        assert_eq!(result, None);
    }

    #[test]
    fn test_source_location_by_token() {
        let mut methods = HashMap::new();
        methods.insert(
            0x0600_0001,
            method(vec![record(0x100, 0x10, 5), record(0x110, 4, 6)]),
        );
        let pdb = NativePdbDebugFile {
            debug_id: DebugId::default(),
            methods,
        };

        assert_eq!(pdb.source_location(0x0600_0001, 0x12), location(6));
        assert_eq!(pdb.source_location(0x0600_0002, 0x0), None);
        assert_eq!(pdb.source_location(0x0600_0001, u32::MAX), None);
    }
}
