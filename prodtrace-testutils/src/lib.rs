//! Test helpers for `prodtrace`.
#![warn(missing_docs)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Returns the full path to the specified fixture.
///
/// Fixtures are stored in the `prodtrace-testutils/fixtures` directory and paths should be given
/// relative to that location.
///
/// # Example
///
/// ```
/// use prodtrace_testutils::fixture;
///
/// let path = fixture("reports/basic.txt");
/// assert!(path.ends_with("reports/basic.txt"));
/// ```
pub fn fixture<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.push("fixtures");

    let path = path.as_ref();
    full_path.push(path);

    assert!(
        full_path.exists(),
        "Fixture does not exist: {}",
        full_path.display()
    );

    full_path
}

/// Returns the symbol store layout path `<root>/<name>/<index>/<name>`.
pub fn layout_path(root: &Path, name: &str, index: &str) -> PathBuf {
    root.join(name).join(index).join(name)
}

/// Writes `data` to the symbol store layout path below `root`, creating directories.
pub fn write_layout(root: &Path, name: &str, index: &str, data: &[u8]) -> io::Result<PathBuf> {
    let path = layout_path(root, name, index);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, data)?;
    Ok(path)
}

/// Writes a symbol package (a zip archive) containing the given entries.
pub fn write_symbol_package(path: &Path, entries: &[(&str, &[u8])]) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, data) in entries {
        zip.start_file(*name, options)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        zip.write_all(data)?;
    }

    zip.finish().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(())
}

/// A sequence point for [`PortablePdbBuilder::add_method`].
#[derive(Clone, Copy, Debug)]
pub struct Point {
    /// IL offset at which the point starts.
    pub il_offset: u32,
    /// Start line, `None` for hidden points.
    pub line: Option<u32>,
    /// Document the point switches to, `None` to stay in the current document.
    pub document: Option<u32>,
}

impl Point {
    /// A sequence point mapping `il_offset` to `line`.
    pub fn line(il_offset: u32, line: u32) -> Self {
        Point {
            il_offset,
            line: Some(line),
            document: None,
        }
    }

    /// A hidden sequence point.
    pub fn hidden(il_offset: u32) -> Self {
        Point {
            il_offset,
            line: None,
            document: None,
        }
    }

    /// Moves this and all following points of the method to `document`.
    pub fn in_document(mut self, document: u32) -> Self {
        self.document = Some(document);
        self
    }
}

/// Builds minimal Portable PDB files for tests.
///
/// The result contains a `#Pdb` stream, a table stream with the `Document` and
/// `MethodDebugInformation` tables and a blob heap. Every added method becomes the next row of the
/// assembly's `MethodDef` table, so the first method has the token `0x06000001`.
///
/// ```
/// use prodtrace_testutils::{Point, PortablePdbBuilder};
///
/// let mut builder = PortablePdbBuilder::new(uuid::Uuid::nil());
/// let doc = builder.add_document("/src/Class1.cs");
/// let token = builder.add_method(doc, &[Point::line(0, 42)]);
/// assert_eq!(token, 0x0600_0001);
/// assert_eq!(&builder.build()[..4], b"BSJB");
/// ```
#[derive(Clone, Debug)]
pub struct PortablePdbBuilder {
    guid: Uuid,
    documents: Vec<String>,
    methods: Vec<(u32, Vec<Point>)>,
}

impl PortablePdbBuilder {
    /// Creates a builder for a PDB with the given identity.
    pub fn new(guid: Uuid) -> Self {
        PortablePdbBuilder {
            guid,
            documents: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Adds a document and returns its row number.
    pub fn add_document(&mut self, name: &str) -> u32 {
        self.documents.push(name.to_owned());
        self.documents.len() as u32
    }

    /// Adds a method whose sequence points start in `document`, returning its token.
    ///
    /// Points must be ordered by strictly increasing IL offset. Use [`Point::in_document`] to
    /// switch documents within the method.
    pub fn add_method(&mut self, document: u32, points: &[Point]) -> u32 {
        assert!(
            points.windows(2).all(|w| w[0].il_offset < w[1].il_offset),
            "sequence points must be ordered"
        );
        self.methods.push((document, points.to_vec()));
        0x0600_0000 | self.methods.len() as u32
    }

    /// Adds a method without debug information, returning its token.
    pub fn add_empty_method(&mut self) -> u32 {
        self.add_method(0, &[])
    }

    /// Serializes the PDB.
    pub fn build(&self) -> Vec<u8> {
        let mut blobs = BlobHeap::new();

        let document_names: Vec<u32> = self
            .documents
            .iter()
            .map(|name| document_name_blob(&mut blobs, name))
            .collect();

        let method_rows: Vec<(u32, u32)> = self
            .methods
            .iter()
            .map(|(document, points)| {
                if points.is_empty() {
                    (*document, 0)
                } else {
                    let (document, blob) = sequence_points_blob(*document, points);
                    (document, blobs.add(&blob))
                }
            })
            .collect();

        let blob_heap = blobs.finish();
        let wide_blobs = blob_heap.len() > 0xffff;
        let blob_index = |buf: &mut Vec<u8>, index: u32| {
            if wide_blobs {
                buf.extend_from_slice(&index.to_le_bytes());
            } else {
                buf.extend_from_slice(&(index as u16).to_le_bytes());
            }
        };

        let mut pdb = Vec::new();
        let mut id = [0u8; 20];
        id[..16].copy_from_slice(&self.guid.to_bytes_le());
        pdb.extend_from_slice(&id);
        pdb.extend_from_slice(&0u32.to_le_bytes());
        pdb.extend_from_slice(&(1u64 << 0x06).to_le_bytes());
        pdb.extend_from_slice(&(self.methods.len() as u32).to_le_bytes());

        let mut tables = Vec::new();
        tables.extend_from_slice(&0u32.to_le_bytes());
        tables.extend_from_slice(&[2, 0, if wide_blobs { 0x4 } else { 0 }, 1]);
        let mut valid = 0u64;
        if !self.documents.is_empty() {
            valid |= 1 << 0x30;
        }
        if !self.methods.is_empty() {
            valid |= 1 << 0x31;
        }
        tables.extend_from_slice(&valid.to_le_bytes());
        tables.extend_from_slice(&0u64.to_le_bytes());
        if !self.documents.is_empty() {
            tables.extend_from_slice(&(self.documents.len() as u32).to_le_bytes());
        }
        if !self.methods.is_empty() {
            tables.extend_from_slice(&(self.methods.len() as u32).to_le_bytes());
        }
        for name in &document_names {
            blob_index(&mut tables, *name);
            tables.extend_from_slice(&0u16.to_le_bytes());
            blob_index(&mut tables, 0);
            tables.extend_from_slice(&0u16.to_le_bytes());
        }
        for (document, blob) in &method_rows {
            tables.extend_from_slice(&(*document as u16).to_le_bytes());
            blob_index(&mut tables, *blob);
        }

        let streams: [(&str, Vec<u8>); 3] =
            [("#Pdb", pdb), ("#~", tables), ("#Blob", blob_heap)];

        let version = b"PDB v1.0\0\0\0\0";
        let header_len = 16 + version.len() + 4;
        let stream_headers_len: usize = streams
            .iter()
            .map(|(name, _)| 8 + padded(name.len() + 1))
            .sum();

        let mut out = Vec::new();
        out.extend_from_slice(b"BSJB");
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(version.len() as u32).to_le_bytes());
        out.extend_from_slice(version);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        let mut offset = header_len + stream_headers_len;
        for (name, data) in &streams {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&(padded(data.len()) as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.resize(out.len() + padded(name.len() + 1) - name.len(), 0);
            offset += padded(data.len());
        }

        for (_, data) in &streams {
            out.extend_from_slice(data);
            out.resize(out.len() + padded(data.len()) - data.len(), 0);
        }

        out
    }
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

struct BlobHeap {
    buf: Vec<u8>,
}

impl BlobHeap {
    fn new() -> Self {
        // Offset 0 is the empty blob.
        BlobHeap { buf: vec![0] }
    }

    fn add(&mut self, data: &[u8]) -> u32 {
        let offset = self.buf.len() as u32;
        encode_unsigned(&mut self.buf, data.len() as u32);
        self.buf.extend_from_slice(data);
        offset
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn document_name_blob(blobs: &mut BlobHeap, name: &str) -> u32 {
    let separator = if name.contains('/') {
        Some('/')
    } else if name.contains('\\') {
        Some('\\')
    } else {
        None
    };

    let mut blob = Vec::new();
    match separator {
        Some(sep) => {
            blob.push(sep as u8);
            for part in name.split(sep) {
                let index = if part.is_empty() {
                    0
                } else {
                    blobs.add(part.as_bytes())
                };
                encode_unsigned(&mut blob, index);
            }
        }
        None => {
            blob.push(0);
            let index = blobs.add(name.as_bytes());
            encode_unsigned(&mut blob, index);
        }
    }

    blobs.add(&blob)
}

/// Encodes the sequence points blob and returns it with the row's document column.
///
/// Methods spanning several documents store `0` in the row and name the initial document in the
/// blob instead.
fn sequence_points_blob(document: u32, points: &[Point]) -> (u32, Vec<u8>) {
    let mut blob = Vec::new();
    // Local signature
    encode_unsigned(&mut blob, 0);

    let multi_document = points.iter().any(|point| point.document.is_some());
    let mut current_document = points[0].document.unwrap_or(document);
    if multi_document {
        encode_unsigned(&mut blob, current_document);
    }

    let mut prev_offset = None;
    let mut prev_line = None;
    for point in points {
        if let (Some(_), Some(next)) = (prev_offset, point.document) {
            if next != current_document {
                // Document record: zero IL delta followed by the document row.
                encode_unsigned(&mut blob, 0);
                encode_unsigned(&mut blob, next);
                current_document = next;
            }
        }

        match prev_offset {
            None => encode_unsigned(&mut blob, point.il_offset),
            Some(prev) => encode_unsigned(&mut blob, point.il_offset - prev),
        }
        prev_offset = Some(point.il_offset);

        let Some(line) = point.line else {
            encode_unsigned(&mut blob, 0);
            encode_unsigned(&mut blob, 0);
            continue;
        };

        // Every point covers a single column on one line, starting at column 1.
        encode_unsigned(&mut blob, 0);
        encode_unsigned(&mut blob, 1);
        match prev_line {
            None => {
                encode_unsigned(&mut blob, line);
                encode_unsigned(&mut blob, 1);
            }
            Some(prev) => {
                encode_signed(&mut blob, line as i32 - prev as i32);
                encode_signed(&mut blob, 0);
            }
        }
        prev_line = Some(line);
    }

    let row_document = if multi_document { 0 } else { document };
    (row_document, blob)
}

fn encode_unsigned(buf: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        buf.push(value as u8);
    } else if value < 0x4000 {
        buf.extend_from_slice(&(0x8000 | value as u16).to_be_bytes());
    } else {
        buf.extend_from_slice(&(0xc000_0000 | value).to_be_bytes());
    }
}

fn encode_signed(buf: &mut Vec<u8>, value: i32) {
    let sign = (value < 0) as u32;
    if (-0x40..0x40).contains(&value) {
        buf.push(((((value as u32) & 0x3f) << 1) | sign) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        let raw = (((value as u32) & 0x1fff) << 1) | sign;
        buf.extend_from_slice(&(0x8000 | raw as u16).to_be_bytes());
    } else {
        let raw = (((value as u32) & 0x0fff_ffff) << 1) | sign;
        buf.extend_from_slice(&(0xc000_0000 | raw).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_signed() {
        let mut buf = Vec::new();
        encode_signed(&mut buf, 3);
        encode_signed(&mut buf, -3);
        encode_signed(&mut buf, 64);
        encode_signed(&mut buf, -8192);
        assert_eq!(buf, [0x06, 0x7B, 0x80, 0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_stream_layout() {
        let mut builder = PortablePdbBuilder::new(Uuid::nil());
        let doc = builder.add_document("Class1.cs");
        builder.add_method(doc, &[Point::line(0, 1)]);
        let data = builder.build();

        assert_eq!(&data[..4], b"BSJB");
        assert_eq!(data.len() % 4, 0);
        // The first stream starts right after the stream headers.
        assert_eq!(u32::from_le_bytes([data[32], data[33], data[34], data[35]]), 76);
    }
}
