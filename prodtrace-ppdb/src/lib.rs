//! Provides support for reading Portable PDB files, specifically line information
//! resolution for methods identified by their metadata token.
//!
//! [Portable PDB](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md)
//! is the debugging information format emitted by modern .NET compilers. It is an extension of
//! the [ECMA-335 format](https://www.ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)
//! and recognizable by the `BSJB` metadata signature at the start of the file.
//!
//! # Functionality
//!
//! * Check whether a buffer looks like a Portable PDB with [`PortablePdb::peek`].
//! * Parse Portable PDB files with [`PortablePdb::parse`].
//! * Read the PDB identity with [`PortablePdb::pdb_guid`].
//! * Resolve a method token and IL offset with [`PortablePdb::lookup`].
//!
//! # Structure of a Portable PDB file
//!
//! An ECMA-335 file is divided into sections called _streams_. The ones relevant here are
//! * `#Pdb`, holding the PDB identity and the row counts of the type system tables, which live
//!   in the assembly rather than in the PDB.
//! * `#~` ("metadata"), comprising tables. Line information is stored in the
//!   [`MethodDebugInformation`](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#methoddebuginformation-table-0x31)
//!   table, which has one row per `MethodDef` of the assembly, and the `Document` table.
//! * `#Blob`, comprising blobs of data such as sequence points and document names.
//!
//! Other streams (`#Strings`, `#US`, `#GUID`) are accepted but not interpreted.

#![warn(missing_docs)]

mod format;
mod lookup;

pub use format::{FormatError, FormatErrorKind, PortablePdb, TableType};
pub use lookup::LineInfo;
