//! The `#~` table stream and the table schema of ECMA-335 and Portable PDB.
//!
//! Every table that has rows must be sized correctly to find the start of the next one, so the
//! full schema is described here even though only `Document` and `MethodDebugInformation` are
//! ever read.

use std::fmt;
use std::ops::Index;

use watto::Pod;

use super::raw::MetadataStreamHeader;
use super::utils::read_u32;
use super::{FormatError, FormatErrorKind};

/// Tables that can occur in a Portable PDB's `#~` stream or be referenced from it.
///
/// See ECMA-335, II.22 and the Portable PDB specification. The discriminant is the table number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TableType {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
    Document = 0x30,
    MethodDebugInformation = 0x31,
    LocalScope = 0x32,
    LocalVariable = 0x33,
    LocalConstant = 0x34,
    ImportScope = 0x35,
    StateMachineMethod = 0x36,
    CustomDebugInformation = 0x37,
}

use TableType::*;

const ALL_TABLES: [TableType; 53] = [
    Module,
    TypeRef,
    TypeDef,
    FieldPtr,
    Field,
    MethodPtr,
    MethodDef,
    ParamPtr,
    Param,
    InterfaceImpl,
    MemberRef,
    Constant,
    CustomAttribute,
    FieldMarshal,
    DeclSecurity,
    ClassLayout,
    FieldLayout,
    StandAloneSig,
    EventMap,
    EventPtr,
    Event,
    PropertyMap,
    PropertyPtr,
    Property,
    MethodSemantics,
    MethodImpl,
    ModuleRef,
    TypeSpec,
    ImplMap,
    FieldRva,
    EncLog,
    EncMap,
    Assembly,
    AssemblyProcessor,
    AssemblyOs,
    AssemblyRef,
    AssemblyRefProcessor,
    AssemblyRefOs,
    File,
    ExportedType,
    ManifestResource,
    NestedClass,
    GenericParam,
    MethodSpec,
    GenericParamConstraint,
    Document,
    MethodDebugInformation,
    LocalScope,
    LocalVariable,
    LocalConstant,
    ImportScope,
    StateMachineMethod,
    CustomDebugInformation,
];

impl TableType {
    /// Returns the table with the given table number.
    pub fn from_index(index: usize) -> Option<Self> {
        ALL_TABLES.iter().copied().find(|t| *t as usize == index)
    }

    fn columns(self) -> &'static [ColumnKind] {
        use ColumnKind::*;

        match self {
            Module => &[Fixed(2), StringHeap, GuidHeap, GuidHeap, GuidHeap],
            TypeRef => &[Coded(RESOLUTION_SCOPE), StringHeap, StringHeap],
            TypeDef => &[
                Fixed(4),
                StringHeap,
                StringHeap,
                Coded(TYPE_DEF_OR_REF),
                TableIndex(Field),
                TableIndex(MethodDef),
            ],
            FieldPtr => &[TableIndex(Field)],
            Field => &[Fixed(2), StringHeap, BlobHeap],
            MethodPtr => &[TableIndex(MethodDef)],
            MethodDef => &[Fixed(4), Fixed(2), Fixed(2), StringHeap, BlobHeap, TableIndex(Param)],
            ParamPtr => &[TableIndex(Param)],
            Param => &[Fixed(2), Fixed(2), StringHeap],
            InterfaceImpl => &[TableIndex(TypeDef), Coded(TYPE_DEF_OR_REF)],
            MemberRef => &[Coded(MEMBER_REF_PARENT), StringHeap, BlobHeap],
            Constant => &[Fixed(2), Coded(HAS_CONSTANT), BlobHeap],
            CustomAttribute => &[
                Coded(HAS_CUSTOM_ATTRIBUTE),
                Coded(CUSTOM_ATTRIBUTE_TYPE),
                BlobHeap,
            ],
            FieldMarshal => &[Coded(HAS_FIELD_MARSHAL), BlobHeap],
            DeclSecurity => &[Fixed(2), Coded(HAS_DECL_SECURITY), BlobHeap],
            ClassLayout => &[Fixed(2), Fixed(4), TableIndex(TypeDef)],
            FieldLayout => &[Fixed(4), TableIndex(Field)],
            StandAloneSig => &[BlobHeap],
            EventMap => &[TableIndex(TypeDef), TableIndex(Event)],
            EventPtr => &[TableIndex(Event)],
            Event => &[Fixed(2), StringHeap, Coded(TYPE_DEF_OR_REF)],
            PropertyMap => &[TableIndex(TypeDef), TableIndex(Property)],
            PropertyPtr => &[TableIndex(Property)],
            Property => &[Fixed(2), StringHeap, BlobHeap],
            MethodSemantics => &[Fixed(2), TableIndex(MethodDef), Coded(HAS_SEMANTICS)],
            MethodImpl => &[
                TableIndex(TypeDef),
                Coded(METHOD_DEF_OR_REF),
                Coded(METHOD_DEF_OR_REF),
            ],
            ModuleRef => &[StringHeap],
            TypeSpec => &[BlobHeap],
            ImplMap => &[
                Fixed(2),
                Coded(MEMBER_FORWARDED),
                StringHeap,
                TableIndex(ModuleRef),
            ],
            FieldRva => &[Fixed(4), TableIndex(Field)],
            EncLog => &[Fixed(4), Fixed(4)],
            EncMap => &[Fixed(4)],
            // Hash algorithm, four version numbers and flags are fixed size.
            Assembly => &[Fixed(4), Fixed(8), Fixed(4), BlobHeap, StringHeap, StringHeap],
            AssemblyProcessor => &[Fixed(4)],
            AssemblyOs => &[Fixed(4), Fixed(4), Fixed(4)],
            AssemblyRef => &[Fixed(8), Fixed(4), BlobHeap, StringHeap, StringHeap, BlobHeap],
            AssemblyRefProcessor => &[Fixed(4), TableIndex(AssemblyRef)],
            AssemblyRefOs => &[Fixed(4), Fixed(4), Fixed(4), TableIndex(AssemblyRef)],
            File => &[Fixed(4), StringHeap, BlobHeap],
            ExportedType => &[
                Fixed(4),
                Fixed(4),
                StringHeap,
                StringHeap,
                Coded(IMPLEMENTATION),
            ],
            ManifestResource => &[Fixed(4), Fixed(4), StringHeap, Coded(IMPLEMENTATION)],
            NestedClass => &[TableIndex(TypeDef), TableIndex(TypeDef)],
            GenericParam => &[Fixed(2), Fixed(2), Coded(TYPE_OR_METHOD_DEF), StringHeap],
            MethodSpec => &[Coded(METHOD_DEF_OR_REF), BlobHeap],
            GenericParamConstraint => &[TableIndex(GenericParam), Coded(TYPE_DEF_OR_REF)],
            Document => &[BlobHeap, GuidHeap, BlobHeap, GuidHeap],
            MethodDebugInformation => &[TableIndex(Document), BlobHeap],
            LocalScope => &[
                TableIndex(MethodDef),
                TableIndex(ImportScope),
                TableIndex(LocalVariable),
                TableIndex(LocalConstant),
                Fixed(4),
                Fixed(4),
            ],
            LocalVariable => &[Fixed(2), Fixed(2), StringHeap],
            LocalConstant => &[StringHeap, BlobHeap],
            ImportScope => &[TableIndex(ImportScope), BlobHeap],
            StateMachineMethod => &[TableIndex(MethodDef), TableIndex(MethodDef)],
            CustomDebugInformation => &[Coded(HAS_CUSTOM_DEBUG_INFORMATION), GuidHeap, BlobHeap],
        }
    }
}

/// The maximum number of columns any table has.
const MAX_COLUMNS: usize = 6;

/// A coded index, which refers to a row in one of several tables.
///
/// The lowest `tag_bits` select the table, the rest is the row.
#[derive(Debug, Clone, Copy)]
struct CodedIndex {
    tag_bits: u32,
    tables: &'static [TableType],
}

const RESOLUTION_SCOPE: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[Module, ModuleRef, AssemblyRef, TypeRef],
};
const TYPE_DEF_OR_REF: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[TypeDef, TypeRef, TypeSpec],
};
const MEMBER_REF_PARENT: CodedIndex = CodedIndex {
    tag_bits: 3,
    tables: &[TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec],
};
const HAS_CONSTANT: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[Field, Param, Property],
};
const HAS_CUSTOM_ATTRIBUTE: CodedIndex = CodedIndex {
    tag_bits: 5,
    tables: &[
        MethodDef,
        Field,
        TypeRef,
        TypeDef,
        Param,
        InterfaceImpl,
        MemberRef,
        Module,
        DeclSecurity,
        Property,
        Event,
        StandAloneSig,
        ModuleRef,
        TypeSpec,
        Assembly,
        AssemblyRef,
        File,
        ExportedType,
        ManifestResource,
        GenericParam,
        GenericParamConstraint,
        MethodSpec,
    ],
};
// Tags 0, 1 and 4 are unused.
const CUSTOM_ATTRIBUTE_TYPE: CodedIndex = CodedIndex {
    tag_bits: 3,
    tables: &[MethodDef, MemberRef],
};
const HAS_FIELD_MARSHAL: CodedIndex = CodedIndex {
    tag_bits: 1,
    tables: &[Field, Param],
};
const HAS_DECL_SECURITY: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[TypeDef, MethodDef, Assembly],
};
const HAS_SEMANTICS: CodedIndex = CodedIndex {
    tag_bits: 1,
    tables: &[Event, Property],
};
const METHOD_DEF_OR_REF: CodedIndex = CodedIndex {
    tag_bits: 1,
    tables: &[MethodDef, MemberRef],
};
const MEMBER_FORWARDED: CodedIndex = CodedIndex {
    tag_bits: 1,
    tables: &[Field, MethodDef],
};
const IMPLEMENTATION: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[File, AssemblyRef, ExportedType],
};
const TYPE_OR_METHOD_DEF: CodedIndex = CodedIndex {
    tag_bits: 1,
    tables: &[TypeDef, MethodDef],
};
const HAS_CUSTOM_DEBUG_INFORMATION: CodedIndex = CodedIndex {
    tag_bits: 5,
    tables: &[
        MethodDef,
        Field,
        TypeRef,
        TypeDef,
        Param,
        InterfaceImpl,
        MemberRef,
        Module,
        DeclSecurity,
        Property,
        Event,
        StandAloneSig,
        ModuleRef,
        TypeSpec,
        Assembly,
        AssemblyRef,
        File,
        ExportedType,
        ManifestResource,
        GenericParam,
        GenericParamConstraint,
        MethodSpec,
        Document,
        LocalScope,
        LocalVariable,
        LocalConstant,
        ImportScope,
    ],
};

/// What a column contains, which determines its width.
#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    /// A constant of the given number of bytes.
    Fixed(usize),
    /// An index into the `#Strings` heap.
    StringHeap,
    /// An index into the `#GUID` heap.
    GuidHeap,
    /// An index into the `#Blob` heap.
    BlobHeap,
    /// A row index into the given table.
    TableIndex(TableType),
    /// A coded index into one of several tables.
    Coded(CodedIndex),
}

/// Widths of variable sized columns, derived from heap sizes and row counts.
struct IndexSizes<'a> {
    heap_sizes: u8,
    row_counts: &'a [usize; 64],
}

impl IndexSizes<'_> {
    fn width(&self, kind: ColumnKind) -> usize {
        match kind {
            ColumnKind::Fixed(width) => width,
            ColumnKind::StringHeap => self.heap_index_size(0x1),
            ColumnKind::GuidHeap => self.heap_index_size(0x2),
            ColumnKind::BlobHeap => self.heap_index_size(0x4),
            ColumnKind::TableIndex(table) => {
                if self.row_counts[table as usize] < (1 << 16) {
                    2
                } else {
                    4
                }
            }
            ColumnKind::Coded(coded) => {
                let limit = 1usize << (16 - coded.tag_bits);
                let is_small = coded
                    .tables
                    .iter()
                    .all(|t| self.row_counts[*t as usize] < limit);
                if is_small {
                    2
                } else {
                    4
                }
            }
        }
    }

    fn heap_index_size(&self, flag: u8) -> usize {
        if self.heap_sizes & flag == 0 {
            2
        } else {
            4
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Column {
    offset: usize,
    width: usize,
}

/// A table in a Portable PDB file.
///
/// See ECMA-335, II.22.
#[derive(Clone, Copy)]
pub(crate) struct Table<'data> {
    type_: Option<TableType>,
    pub(crate) rows: usize,
    row_size: usize,
    columns: [Column; MAX_COLUMNS],
    num_columns: usize,
    contents: &'data [u8],
}

impl fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("type", &self.type_)
            .field("rows", &self.rows)
            .field("row_size", &self.row_size)
            .field("columns", &&self.columns[..self.num_columns])
            .finish()
    }
}

impl<'data> Table<'data> {
    const EMPTY: Table<'static> = Table {
        type_: None,
        rows: 0,
        row_size: 0,
        columns: [Column {
            offset: 0,
            width: 0,
        }; MAX_COLUMNS],
        num_columns: 0,
        contents: &[],
    };

    fn new(type_: TableType, rows: usize, sizes: &IndexSizes) -> Self {
        let mut columns = [Column::default(); MAX_COLUMNS];
        let kinds = type_.columns();
        let mut offset = 0;
        for (column, kind) in columns.iter_mut().zip(kinds) {
            let width = sizes.width(*kind);
            *column = Column { offset, width };
            offset += width;
        }

        Table {
            type_: Some(type_),
            rows,
            row_size: offset,
            columns,
            num_columns: kinds.len(),
            contents: &[],
        }
    }

    fn size(&self) -> usize {
        self.rows * self.row_size
    }

    /// Reads the `(row, col)` cell as a `u32`. Indices are 1-based.
    pub(crate) fn get_cell_u32(&self, row: usize, col: usize) -> Result<u32, FormatError> {
        let type_ = self.type_.unwrap_or(Module);

        if row == 0 || row > self.rows {
            return Err(FormatErrorKind::RowIndexOutOfBounds(type_, row).into());
        }
        if col == 0 || col > self.num_columns {
            return Err(FormatErrorKind::ColIndexOutOfBounds(type_, col).into());
        }

        let column = self.columns[col - 1];
        let start = (row - 1) * self.row_size + column.offset;
        let cell = self
            .contents
            .get(start..start + column.width)
            .ok_or(FormatErrorKind::RowIndexOutOfBounds(type_, row))?;

        Ok(match *cell {
            [a] => a as u32,
            [a, b] => u16::from_le_bytes([a, b]) as u32,
            [a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
            _ => return Err(FormatErrorKind::ColIndexOutOfBounds(type_, col).into()),
        })
    }
}

/// The `#~` stream, containing the metadata tables.
#[derive(Debug, Clone)]
pub(crate) struct MetadataStream<'data> {
    tables: [Table<'data>; 64],
}

impl<'data> MetadataStream<'data> {
    /// Parses the table stream.
    ///
    /// `referenced_table_sizes` are the row counts of tables living in the assembly, which affect
    /// the width of index columns.
    pub(crate) fn parse(
        buf: &'data [u8],
        referenced_table_sizes: &[u32; 64],
    ) -> Result<Self, FormatError> {
        let (header, mut rest) =
            MetadataStreamHeader::ref_from_prefix(buf).ok_or(FormatErrorKind::InvalidHeader)?;

        let valid_tables = header.valid_tables;
        let mut local_rows = [0usize; 64];
        for (i, rows) in local_rows.iter_mut().enumerate() {
            if (valid_tables >> i) & 1 == 0 {
                continue;
            }

            let (count, rest_) = read_u32(rest).ok_or(FormatErrorKind::InvalidLength)?;
            *rows = count as usize;
            rest = rest_;
        }

        let mut row_counts = [0usize; 64];
        for (i, count) in row_counts.iter_mut().enumerate() {
            *count = local_rows[i].max(referenced_table_sizes[i] as usize);
        }

        let sizes = IndexSizes {
            heap_sizes: header.heap_sizes,
            row_counts: &row_counts,
        };

        let mut tables = [Table::EMPTY; 64];
        for (i, rows) in local_rows.iter().enumerate() {
            if *rows == 0 {
                continue;
            }
            let type_ = TableType::from_index(i).ok_or(FormatErrorKind::UnknownTable(i))?;
            tables[i] = Table::new(type_, *rows, &sizes);
        }

        let required: usize = tables.iter().map(Table::size).sum();
        if rest.len() < required {
            return Err(FormatErrorKind::InsufficientTableData(required, rest.len()).into());
        }

        for table in tables.iter_mut() {
            let (contents, rest_) = rest.split_at(table.size());
            table.contents = contents;
            rest = rest_;
        }

        Ok(Self { tables })
    }
}

impl<'data> Index<TableType> for MetadataStream<'data> {
    type Output = Table<'data>;

    fn index(&self, index: TableType) -> &Self::Output {
        &self.tables[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(heap_sizes: u8, row_counts: &[usize; 64]) -> IndexSizes<'_> {
        IndexSizes {
            heap_sizes,
            row_counts,
        }
    }

    #[test]
    fn test_from_index() {
        assert_eq!(TableType::from_index(0x06), Some(MethodDef));
        assert_eq!(TableType::from_index(0x31), Some(MethodDebugInformation));
        assert_eq!(TableType::from_index(0x2D), None);
    }

    #[test]
    fn test_column_counts() {
        for table in ALL_TABLES {
            assert!(table.columns().len() <= MAX_COLUMNS, "{table:?}");
        }
    }

    #[test]
    fn test_heap_sizes() {
        let rows = [0; 64];
        assert_eq!(sizes(0, &rows).width(ColumnKind::BlobHeap), 2);
        assert_eq!(sizes(0x4, &rows).width(ColumnKind::BlobHeap), 4);
        assert_eq!(sizes(0x4, &rows).width(ColumnKind::StringHeap), 2);
        assert_eq!(sizes(0x3, &rows).width(ColumnKind::GuidHeap), 4);
    }

    #[test]
    fn test_coded_index_width() {
        let mut rows = [0; 64];
        rows[MethodDef as usize] = (1 << 11) - 1;
        let coded = ColumnKind::Coded(HAS_CUSTOM_DEBUG_INFORMATION);
        assert_eq!(sizes(0, &rows).width(coded), 2);

        rows[Document as usize] = 1 << 11;
        assert_eq!(sizes(0, &rows).width(coded), 4);
        assert_eq!(sizes(0, &rows).width(ColumnKind::TableIndex(Document)), 2);
    }

    #[test]
    fn test_row_width() {
        let rows = [0; 64];
        let table = Table::new(LocalScope, 1, &sizes(0, &rows));
        assert_eq!(table.row_size, 16);
        assert_eq!(table.columns[4].offset, 8);
    }
}
