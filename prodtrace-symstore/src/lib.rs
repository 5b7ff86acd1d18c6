//! Discovery of .NET debug files.
//!
//! The [`SymbolStore`] searches an ordered [`SymbolPath`] for the debug file of a module,
//! identified by its file name and [`DebugId`](prodtrace_common::DebugId). Supported locations
//! are plain directories, directories in symbol server layout (`<name>/<index>/<name>`), remote
//! symbol servers reached over HTTP (with the `http` feature) and NuGet symbol packages named
//! after the assembly version.
//!
//! A file is only returned after its embedded identity has been verified, so stale caches or
//! mislabeled files never produce wrong source locations.
//!
//! ```no_run
//! use prodtrace_symstore::{DebugFileRequest, SymbolPath, SymbolStore, SymbolStoreConfig};
//!
//! let path = SymbolPath::parse(r"C:\symbols;srv*C:\cache*https://msdl.microsoft.com/download/symbols");
//! let store = SymbolStore::new(SymbolStoreConfig::new(path));
//!
//! let debug_id = "c7f5b1a2-4b2e-4f1d-9a6e-3d2c1b0a9f8e-1".parse()?;
//! let request = DebugFileRequest::new("MyAssembly.pdb", debug_id, "MyAssembly");
//! if let Some(path) = store.find(&request)? {
//!     println!("found {}", path.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

mod archive;
#[cfg(feature = "http")]
mod download;
mod error;
mod path;
mod store;

pub use crate::error::*;
pub use crate::path::*;
pub use crate::store::*;
