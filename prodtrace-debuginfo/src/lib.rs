//! Debug-info providers for .NET debug files.
//!
//! A debug file maps a method, identified by its metadata token, and an IL offset within that
//! method to the source file and line it was compiled from. Two encodings are supported:
//!
//!  - **Portable PDB**: the cross-platform format of modern .NET, starting with `BSJB`. Lookups
//!    decode the method's sequence points.
//!  - **Native PDB**: the MSF 7.00 format written for the full framework. Managed procedures are
//!    indexed by token when the file is opened.
//!
//! Use [`DebugFile::open`] to open a file of either format, selected by its signature, and
//! [`SourceLookup::source_location`] to resolve frames. [`peek_identity`] reads only the embedded
//! identity, which symbol stores use to verify candidates.
//!
//! ```no_run
//! use prodtrace_debuginfo::{DebugFile, SourceLookup};
//!
//! let file = DebugFile::open("MyAssembly.pdb".as_ref())?;
//! if let Some(location) = file.source_location(0x0600_0001, 0xc) {
//!     println!("{location}");
//! }
//! # Ok::<(), prodtrace_debuginfo::DebugFileError>(())
//! ```

#![warn(missing_docs)]

mod base;
mod file;
mod native;
mod portable;

pub use crate::base::*;
pub use crate::file::*;
pub use crate::native::{NativePdbDebugFile, NativePdbError, NativePdbErrorKind};
pub use crate::portable::PortablePdbDebugFile;

pub use prodtrace_ppdb as ppdb;
