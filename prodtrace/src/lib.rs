//! Symbolication of production .NET stack traces.
//!
//! Release builds of .NET applications rarely ship their debug files. `prodtrace` works with
//! exception reports that record, for every stack frame, the method's metadata token and the IL
//! offset within its body, together with the identity of each module's debug file. Offline, these
//! reports are translated back into the familiar `at Type.Method() in File.cs:line 42` form.
//!
//! The functionality is split into crates, which are re-exported here behind features:
//!
//!  - [`common`]: Shared types such as [`ByteView`](common::ByteView) and
//!    [`SourceLocation`](common::SourceLocation).
//!  - `ppdb`: A reader for the Portable PDB format.
//!  - `debuginfo`: Opens native and Portable PDBs and resolves tokens and IL offsets.
//!  - `symstore`: Locates verified debug files in directories, symbol servers and symbol
//!    packages.
//!  - `report`: Parses exception reports and writes translated stack traces.
//!
//! By default, the `report` feature and everything it depends on is enabled.

#![warn(missing_docs)]

#[doc(inline)]
pub use prodtrace_common as common;
#[doc(inline)]
#[cfg(feature = "debuginfo")]
pub use prodtrace_debuginfo as debuginfo;
#[doc(inline)]
#[cfg(feature = "ppdb")]
pub use prodtrace_ppdb as ppdb;
#[doc(inline)]
#[cfg(feature = "report")]
pub use prodtrace_report as report;
#[doc(inline)]
#[cfg(feature = "symstore")]
pub use prodtrace_symstore as symstore;
