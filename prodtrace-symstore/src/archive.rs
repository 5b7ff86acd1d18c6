//! Symbol packages (`.symbols.nupkg`).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use zip::read::ZipArchive;

use crate::error::{SymbolError, SymbolErrorKind};

/// Locates the symbol package of an assembly version in `dir`.
///
/// Packages are named `<short name>.<version>.symbols.nupkg`. Package versions are often
/// normalized to three components, so a single trailing `.0` is stripped as a fallback.
pub(crate) fn find_package(dir: &Path, short_name: &str, version: &str) -> Option<PathBuf> {
    let candidates = std::iter::once(version).chain(version.strip_suffix(".0"));

    for version in candidates {
        let path = dir.join(format!("{short_name}.{version}.symbols.nupkg"));
        tracing::trace!(path = %path.display(), "probing symbol package");
        if path.is_file() {
            return Some(path);
        }
    }

    None
}

/// Returns the last component of a zip entry name, accepting both separators.
fn entry_file_name(entry_name: &str) -> &str {
    entry_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(entry_name)
}

/// Extracts the entry named `file_name` from the package at `package` to `dest`.
///
/// The file name is compared case-insensitively against the last component of each entry.
/// Returns `false` if the package has no such entry.
#[tracing::instrument(level = "debug", name = "extract_package_entry", skip_all, fields(package = %package.display()))]
pub(crate) fn extract_entry(
    package: &Path,
    file_name: &str,
    dest: &Path,
) -> Result<bool, SymbolError> {
    let file = File::open(package)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| SymbolError::new(SymbolErrorKind::BadArchive, e))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| SymbolError::new(SymbolErrorKind::BadArchive, e))?;

        if entry.is_dir() || !entry_file_name(entry.name()).eq_ignore_ascii_case(file_name) {
            continue;
        }

        tracing::debug!(entry = entry.name(), dest = %dest.display(), "extracting debug file");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(dest)?;
        if let Err(e) = io::copy(&mut entry, &mut out) {
            drop(out);
            fs::remove_file(dest).ok();
            return Err(SymbolError::new(SymbolErrorKind::BadArchive, e));
        }

        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodtrace_testutils::write_symbol_package;

    #[test]
    fn test_entry_file_name() {
        assert_eq!(entry_file_name("lib/net8.0/Library.pdb"), "Library.pdb");
        assert_eq!(entry_file_name(r"lib\net48\Library.pdb"), "Library.pdb");
        assert_eq!(entry_file_name("Library.pdb"), "Library.pdb");
        assert_eq!(entry_file_name("lib/"), "");
    }

    #[test]
    fn test_find_package_strips_zero() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Library.1.2.symbols.nupkg");
        write_symbol_package(&package, &[]).unwrap();

        assert_eq!(find_package(dir.path(), "Library", "1.2.0"), Some(package));
        assert_eq!(find_package(dir.path(), "Library", "1.2.0.0"), None);
        assert_eq!(find_package(dir.path(), "Other", "1.2"), None);
    }

    #[test]
    fn test_extract_entry() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Library.1.0.symbols.nupkg");
        write_symbol_package(
            &package,
            &[
                ("lib/net8.0/Library.dll", &b"dll"[..]),
                ("lib/net8.0/LIBRARY.PDB", &b"pdb"[..]),
            ],
        )
        .unwrap();

        let dest = dir.path().join("out/Library.pdb/INDEX/Library.pdb");
        assert!(extract_entry(&package, "library.pdb", &dest).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"pdb");

        let missing = dir.path().join("Other.pdb");
        assert!(!extract_entry(&package, "Other.pdb", &missing).unwrap());
        assert!(!missing.exists());
    }

    #[test]
    fn test_bad_package() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Library.1.0.symbols.nupkg");
        fs::write(&package, b"definitely not a zip file").unwrap();

        let dest = dir.path().join("Library.pdb");
        let err = extract_entry(&package, "Library.pdb", &dest).unwrap_err();
        assert_eq!(err.kind(), SymbolErrorKind::BadArchive);
    }
}
