//! Common data types shared by all `prodtrace` crates.

use std::fmt;

use debugid::DebugId;

/// The original source file and line of a stack frame.
///
/// A line number of `0` carries no meaning. Providers never return such locations; use
/// [`SourceLocation::new`] which filters them out.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SourceLocation {
    /// Path of the source file as recorded in the debug file, if the format stores one.
    pub file: Option<String>,
    /// One-based line number.
    pub line: u32,
}

impl SourceLocation {
    /// Creates a source location, returning `None` if the line is not meaningful.
    pub fn new<F: Into<String>>(file: Option<F>, line: u32) -> Option<Self> {
        if line == 0 {
            return None;
        }

        Some(SourceLocation {
            file: file.map(Into::into),
            line,
        })
    }

    /// The file path, or an empty string if the debug file did not record one.
    pub fn file_str(&self) -> &str {
        self.file.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for SourceLocation {
    /// Formats the location the way the .NET runtime prints it in stack traces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:line {}", self.file_str(), self.line)
    }
}

/// The directory key under which symbol stores file a debug file.
///
/// Symbol servers and their local caches store debug files as `<name>/<index>/<name>`. For
/// native PDBs, the index is the GUID in uppercase hex without dashes, followed by the age in
/// uppercase hex. Portable PDBs carry no age and are stored with a fixed `FFFFFFFF` suffix.
///
/// Some older tools write the age in decimal instead, which only makes a difference from age 10
/// onwards. [`SymbolIndex::native_decimal_age`] returns that key.
///
/// ```
/// use prodtrace_common::{DebugId, SymbolIndex};
///
/// let id: DebugId = "11111111-1111-1111-1111-111111111111-a".parse().unwrap();
/// assert_eq!(
///     SymbolIndex::native(&id).to_string(),
///     "11111111111111111111111111111111A"
/// );
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolIndex(String);

impl SymbolIndex {
    /// The index of a native (MSF) PDB with the given identity.
    pub fn native(id: &DebugId) -> Self {
        SymbolIndex(format!("{}{:X}", Self::guid(id), id.appendix()))
    }

    /// The index of a native PDB with the age written in decimal.
    pub fn native_decimal_age(id: &DebugId) -> Self {
        SymbolIndex(format!("{}{}", Self::guid(id), id.appendix()))
    }

    /// The index of a Portable PDB with the given identity.
    pub fn portable(id: &DebugId) -> Self {
        SymbolIndex(format!("{}FFFFFFFF", Self::guid(id)))
    }

    fn guid(id: &DebugId) -> String {
        id.uuid().as_simple().to_string().to_ascii_uppercase()
    }

    /// Returns the index as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SymbolIndex {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
