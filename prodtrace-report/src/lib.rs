//! Translation of production .NET exception reports.
//!
//! Production builds often ship without debug files, so their stack traces cannot name source
//! files or lines. Instead, frames are written with the metadata token of the method and the IL
//! offset within its body, and a footer records the debug file identity of every module:
//!
//! ```text
//! System.InvalidOperationException: Sequence contains no elements
//!    at MyAssembly!0x06000002!MyAssembly.Parser.Next(Int32 depth) +0x1b
//! ==========
//! MODULE: MyAssembly => MyAssembly, Version=1.0.0.0; G:11111111-1111-1111-1111-111111111111; A:1
//! ```
//!
//! The [`Translator`] reads such a report, locates the debug files of the listed modules and
//! writes the stack trace back in the familiar format:
//!
//! ```text
//! System.InvalidOperationException: Sequence contains no elements
//!    at MyAssembly.Parser.Next(Int32 depth) in C:\src\Parser.cs:line 42
//! ```
//!
//! Lines that are not recognized are copied unchanged.

#![warn(missing_docs)]

mod error;
mod frame;
mod modules;
mod report;
mod translate;

pub use crate::error::*;
pub use crate::frame::StackFrame;
pub use crate::modules::*;
pub use crate::report::*;
pub use crate::translate::*;
