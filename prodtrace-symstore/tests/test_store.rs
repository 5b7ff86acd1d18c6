use std::fs;
use std::path::Path;

#[cfg(feature = "http")]
use std::collections::HashMap;
#[cfg(feature = "http")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "http")]
use std::net::TcpListener;
#[cfg(feature = "http")]
use std::sync::{Arc, Mutex};

use prodtrace_common::{DebugId, SymbolIndex, Uuid};
use prodtrace_debuginfo::peek_identity;
use prodtrace_symstore::{
    DebugFileRequest, SymbolErrorKind, SymbolPath, SymbolPathElement, SymbolStore,
    SymbolStoreConfig,
};
use prodtrace_testutils::{layout_path, write_layout, write_symbol_package, Point, PortablePdbBuilder};
use similar_asserts::assert_eq;

const GUID: &str = "c7f5b1a2-4b2e-4f1d-9a6e-3d2c1b0a9f8e";
const OTHER_GUID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

fn portable_pdb(guid: &str) -> Vec<u8> {
    let mut builder = PortablePdbBuilder::new(Uuid::parse_str(guid).unwrap());
    let doc = builder.add_document("/build/Library/Parser.cs");
    builder.add_method(doc, &[Point::line(0, 10)]);
    builder.build()
}

fn debug_id() -> DebugId {
    format!("{GUID}-1").parse().unwrap()
}

fn request() -> DebugFileRequest {
    DebugFileRequest::new("Library.pdb", debug_id(), "Library")
}

fn store(path: &str) -> SymbolStore {
    SymbolStore::new(SymbolStoreConfig::new(SymbolPath::parse(path)))
}

fn store_for(elements: Vec<SymbolPathElement>) -> SymbolStore {
    SymbolStore::new(SymbolStoreConfig::new(elements.into_iter().collect()))
}

fn assert_verified(path: &Path) {
    let identity = peek_identity(path).unwrap();
    assert!(identity.matches(&debug_id()));
}

#[test]
fn test_find_direct() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Library.pdb");
    fs::write(&file, portable_pdb(GUID)).unwrap();

    let store = store_for(vec![SymbolPathElement::Directory(dir.path().into())]);
    assert_eq!(store.find(&request()).unwrap(), Some(file));
}

#[test]
fn test_mismatched_guid_is_never_returned() {
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Library.pdb"), portable_pdb(OTHER_GUID)).unwrap();
    for index in [SymbolIndex::native(&debug_id()), SymbolIndex::portable(&debug_id())] {
        write_layout(cache.path(), "Library.pdb", index.as_str(), &portable_pdb(OTHER_GUID))
            .unwrap();
    }

    let store = store_for(vec![
        SymbolPathElement::Directory(dir.path().into()),
        SymbolPathElement::Cache(cache.path().into()),
    ]);
    assert_eq!(store.find(&request()).unwrap(), None);
}

#[test]
fn test_skips_mismatch_for_later_element() {
    let stale = tempfile::tempdir().unwrap();
    let good = tempfile::tempdir().unwrap();
    fs::write(stale.path().join("Library.pdb"), portable_pdb(OTHER_GUID)).unwrap();
    fs::write(good.path().join("Library.pdb"), portable_pdb(GUID)).unwrap();

    let store = store_for(vec![
        SymbolPathElement::Directory(stale.path().into()),
        SymbolPathElement::Directory(good.path().into()),
    ]);
    assert_eq!(
        store.find(&request()).unwrap(),
        Some(good.path().join("Library.pdb"))
    );
}

#[test]
fn test_find_portable_layout() {
    let dir = tempfile::tempdir().unwrap();
    let index = SymbolIndex::portable(&debug_id());
    let file =
        write_layout(dir.path(), "Library.pdb", index.as_str(), &portable_pdb(GUID)).unwrap();

    let store = store_for(vec![SymbolPathElement::Cache(dir.path().into())]);
    assert_eq!(store.find(&request()).unwrap(), Some(file));
}

#[test]
fn test_find_local_store_and_cache() {
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let index = SymbolIndex::native(&debug_id());
    let in_target =
        write_layout(target.path(), "Library.pdb", index.as_str(), &portable_pdb(GUID)).unwrap();

    let path = format!("srv*{}*{}", cache.path().display(), target.path().display());
    assert_eq!(store(&path).find(&request()).unwrap(), Some(in_target));

    // The cache is probed before the target.
    let in_cache =
        write_layout(cache.path(), "Library.pdb", index.as_str(), &portable_pdb(GUID)).unwrap();
    assert_eq!(store(&path).find(&request()).unwrap(), Some(in_cache));
}

#[test]
fn test_tier_equivalence() {
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Library.pdb"), portable_pdb(GUID)).unwrap();
    let index = SymbolIndex::native(&debug_id());
    write_layout(cache.path(), "Library.pdb", index.as_str(), &portable_pdb(GUID)).unwrap();

    let store = store_for(vec![
        SymbolPathElement::Directory(dir.path().into()),
        SymbolPathElement::Cache(cache.path().into()),
    ]);

    let direct = store.find(&request()).unwrap().unwrap();
    assert_eq!(direct, dir.path().join("Library.pdb"));
    assert_verified(&direct);

    // Only the layout copy is left.
    fs::remove_file(&direct).unwrap();
    let layout = store.find(&request()).unwrap().unwrap();
    assert_verified(&layout);
    assert_eq!(layout, layout_path(cache.path(), "Library.pdb", index.as_str()));
}

#[test]
fn test_find_decimal_age_layout() {
    let debug_id: DebugId = format!("{GUID}-a").parse().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let index = SymbolIndex::native_decimal_age(&debug_id);
    assert!(index.as_str().ends_with("10"));
    let file =
        write_layout(cache.path(), "Library.pdb", index.as_str(), &portable_pdb(GUID)).unwrap();

    let store = store_for(vec![SymbolPathElement::Cache(cache.path().into())]);
    let request = DebugFileRequest::new("Library.pdb", debug_id, "Library");
    assert_eq!(store.find(&request).unwrap(), Some(file));
}

#[test]
fn test_extract_from_package() {
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_symbol_package(
        &target.path().join("Library.1.2.0.symbols.nupkg"),
        &[("lib/net8.0/library.pdb", &portable_pdb(GUID)[..])],
    )
    .unwrap();

    let path = format!("srv*{}*{}", cache.path().display(), target.path().display());
    let request = request().with_version("1.2.0");

    let index = SymbolIndex::native(&debug_id());
    let expected = layout_path(cache.path(), "Library.pdb", index.as_str());
    assert_eq!(store(&path).find(&request).unwrap(), Some(expected.clone()));
    assert_verified(&expected);

    // Subsequent lookups hit the cache directly.
    fs::remove_file(target.path().join("Library.1.2.0.symbols.nupkg")).unwrap();
    assert_eq!(store(&path).find(&request).unwrap(), Some(expected));
}

#[test]
fn test_extract_into_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_symbol_package(
        &dir.path().join("Library.1.2.symbols.nupkg"),
        &[("Library.pdb", &portable_pdb(GUID)[..])],
    )
    .unwrap();

    let store = store_for(vec![SymbolPathElement::Directory(dir.path().into())]);
    let found = store
        .find(&request().with_version("1.2.0"))
        .unwrap()
        .unwrap();

    let index = SymbolIndex::native(&debug_id());
    assert_eq!(found, layout_path(dir.path(), "Library.pdb", index.as_str()));
}

#[test]
fn test_package_requires_version() {
    let dir = tempfile::tempdir().unwrap();
    write_symbol_package(
        &dir.path().join("Library.1.2.0.symbols.nupkg"),
        &[("Library.pdb", &portable_pdb(GUID)[..])],
    )
    .unwrap();

    let store = store_for(vec![SymbolPathElement::Directory(dir.path().into())]);
    assert_eq!(store.find(&request()).unwrap(), None);
}

#[test]
fn test_package_without_entry_continues() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write_symbol_package(
        &first.path().join("Library.1.0.symbols.nupkg"),
        &[("Other.pdb", &portable_pdb(GUID)[..])],
    )
    .unwrap();
    write_symbol_package(
        &second.path().join("Library.1.0.symbols.nupkg"),
        &[("Library.pdb", &portable_pdb(GUID)[..])],
    )
    .unwrap();

    let store = store_for(vec![
        SymbolPathElement::Directory(first.path().into()),
        SymbolPathElement::Directory(second.path().into()),
    ]);
    let found = store.find(&request().with_version("1.0")).unwrap().unwrap();
    assert!(found.starts_with(second.path()));
}

#[test]
fn test_package_mismatch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_symbol_package(
        &dir.path().join("Library.1.2.0.symbols.nupkg"),
        &[("Library.pdb", &portable_pdb(OTHER_GUID)[..])],
    )
    .unwrap();

    let store = store_for(vec![SymbolPathElement::Directory(dir.path().into())]);
    let err = store
        .find(&request().with_version("1.2.0"))
        .unwrap_err();
    assert_eq!(err.kind(), SymbolErrorKind::ArchiveMismatch);

    let index = SymbolIndex::native(&debug_id());
    assert!(!layout_path(dir.path(), "Library.pdb", index.as_str()).exists());
}

#[test]
fn test_bad_package_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Library.1.2.0.symbols.nupkg"), b"not a zip").unwrap();

    let store = store_for(vec![SymbolPathElement::Directory(dir.path().into())]);
    let err = store
        .find(&request().with_version("1.2.0"))
        .unwrap_err();
    assert_eq!(err.kind(), SymbolErrorKind::BadArchive);
}

#[test]
fn test_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(vec![
        SymbolPathElement::Directory(dir.path().join("missing")),
        SymbolPathElement::Cache(dir.path().into()),
    ]);
    assert_eq!(store.find(&request().with_version("1.0.0")).unwrap(), None);
}

#[cfg(feature = "http")]
#[test]
fn test_unreachable_server_is_a_miss() {
    let cache = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    fs::write(local.path().join("Library.pdb"), portable_pdb(GUID)).unwrap();

    let path = format!(
        "srv*{}*http://127.0.0.1:9/symbols;{}",
        cache.path().display(),
        local.path().display()
    );
    assert_eq!(
        store(&path).find(&request()).unwrap(),
        Some(local.path().join("Library.pdb"))
    );
}

/// A symbol server answering from a fixed set of files and recording requested paths.
#[cfg(feature = "http")]
struct SymbolServer {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

#[cfg(feature = "http")]
impl SymbolServer {
    fn start(files: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/sym", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }

                let path = request_line.split(' ').nth(1).unwrap_or_default().to_owned();
                let (status, body) = match files.get(&path) {
                    Some(body) => ("200 OK", body.as_slice()),
                    None => ("404 Not Found", &[][..]),
                };
                log.lock().unwrap().push(path);

                write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
                .unwrap();
                stream.write_all(body).unwrap();
            }
        });

        SymbolServer { url, requests }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(feature = "http")]
fn server_path(index: &SymbolIndex) -> String {
    format!("/sym/Library.pdb/{index}/Library.pdb")
}

#[cfg(feature = "http")]
#[test]
fn test_download_from_server() {
    let native = SymbolIndex::native(&debug_id());
    let server = SymbolServer::start(HashMap::from([(
        server_path(&native),
        portable_pdb(GUID),
    )]));
    let cache = tempfile::tempdir().unwrap();

    let path = format!("srv*{}*{}", cache.path().display(), server.url);
    let expected = layout_path(cache.path(), "Library.pdb", native.as_str());
    assert_eq!(store(&path).find(&request()).unwrap(), Some(expected.clone()));
    assert_verified(&expected);
    assert_eq!(server.requests(), [server_path(&native)]);

    // The downloaded file is served from the cache afterwards.
    assert_eq!(store(&path).find(&request()).unwrap(), Some(expected));
    assert_eq!(server.requests().len(), 1);
}

#[cfg(feature = "http")]
#[test]
fn test_download_mismatch_is_removed() {
    let native = SymbolIndex::native(&debug_id());
    let portable = SymbolIndex::portable(&debug_id());
    let server = SymbolServer::start(HashMap::from([(
        server_path(&native),
        portable_pdb(OTHER_GUID),
    )]));
    let cache = tempfile::tempdir().unwrap();

    let path = format!("srv*{}*{}", cache.path().display(), server.url);
    assert_eq!(store(&path).find(&request()).unwrap(), None);
    assert!(!layout_path(cache.path(), "Library.pdb", native.as_str()).exists());
    assert_eq!(
        server.requests(),
        [server_path(&native), server_path(&portable)]
    );
}

#[cfg(feature = "http")]
#[test]
fn test_not_found_on_server_continues() {
    let server = SymbolServer::start(HashMap::new());
    let cache = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    fs::write(local.path().join("Library.pdb"), portable_pdb(GUID)).unwrap();

    let path = format!(
        "srv*{}*{};{}",
        cache.path().display(),
        server.url,
        local.path().display()
    );
    assert_eq!(
        store(&path).find(&request()).unwrap(),
        Some(local.path().join("Library.pdb"))
    );
    assert_eq!(
        server.requests(),
        [
            server_path(&SymbolIndex::native(&debug_id())),
            server_path(&SymbolIndex::portable(&debug_id())),
        ]
    );
}
