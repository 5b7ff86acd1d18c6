//! Common functionality for `prodtrace`.
//!
//! This crate exposes a set of key types:
//!
//!  - [`ByteView`]: Gives access to debug file contents in-memory or on the file system.
//!  - [`SelfCell`]: Keeps a parsed debug file next to the bytes it borrows from.
//!  - [`SourceLocation`]: The resolved source file and line of a stack frame.
//!  - [`SymbolIndex`]: The directory key used by symbol stores to disambiguate debug files.
//!
//! This module is part of the `prodtrace` crate.

#![warn(missing_docs)]

mod byteview;
mod cell;
mod types;

pub use crate::byteview::*;
pub use crate::cell::*;
pub use crate::types::*;

pub use debugid::*;
pub use uuid::Uuid;
