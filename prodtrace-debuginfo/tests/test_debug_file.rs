use std::fs;

use prodtrace_common::{DebugId, SourceLocation, Uuid};
use prodtrace_debuginfo::{
    peek_identity, DebugFile, DebugFileErrorKind, FileFormat, SourceLookup,
};
use prodtrace_testutils::{Point, PortablePdbBuilder};
use similar_asserts::assert_eq;

const GUID: &str = "c7f5b1a2-4b2e-4f1d-9a6e-3d2c1b0a9f8e";

fn library_pdb() -> (Vec<u8>, u32) {
    let mut builder = PortablePdbBuilder::new(Uuid::parse_str(GUID).unwrap());
    let doc = builder.add_document("/build/Library/Parser.cs");
    let token = builder.add_method(
        doc,
        &[Point::line(0x0, 12), Point::line(0x4, 13), Point::hidden(0x1b)],
    );
    (builder.build(), token)
}

#[test]
fn test_open_portable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Library.pdb");
    let (data, token) = library_pdb();
    fs::write(&path, data).unwrap();

    let file = DebugFile::open(&path).unwrap();
    assert_eq!(file.file_format(), FileFormat::PortablePdb);

    let expected: DebugId = format!("{GUID}-1").parse().unwrap();
    assert_eq!(file.debug_id(), expected);

    assert_eq!(
        file.source_location(token, 0x1b),
        SourceLocation::new(Some("/build/Library/Parser.cs"), 13)
    );
    assert_eq!(file.source_location(token + 1, 0x0), None);
}

#[test]
fn test_peek_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Library.pdb");
    fs::write(&path, library_pdb().0).unwrap();

    let identity = peek_identity(&path).unwrap();
    assert_eq!(identity.format, FileFormat::PortablePdb);

    // Portable PDBs match regardless of the requested age.
    let requested: DebugId = format!("{GUID}-5").parse().unwrap();
    assert!(identity.matches(&requested));

    let other: DebugId = "c7f5b1a2-4b2e-4f1d-9a6e-3d2c1b0a9f8f-1".parse().unwrap();
    assert!(!identity.matches(&other));
}

#[test]
fn test_open_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = DebugFile::open(&dir.path().join("missing.pdb")).unwrap_err();
    assert_eq!(missing.kind(), DebugFileErrorKind::Io);

    let text = dir.path().join("notes.pdb");
    fs::write(&text, "not a debug file at all").unwrap();
    let unsupported = peek_identity(&text).unwrap_err();
    assert_eq!(unsupported.kind(), DebugFileErrorKind::UnsupportedFormat);

    let broken = dir.path().join("broken.pdb");
    let (mut data, _) = library_pdb();
    data.truncate(100);
    fs::write(&broken, data).unwrap();
    let bad = DebugFile::open(&broken).unwrap_err();
    assert_eq!(bad.kind(), DebugFileErrorKind::BadPortablePdb);
}
