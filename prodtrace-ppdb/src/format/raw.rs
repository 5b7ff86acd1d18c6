use watto::Pod;

/// Signature for physical metadata as specified by ECMA-335, `BSJB` in little endian.
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// First part of the metadata root, as specified in the ECMA-335 spec, II.24.2.1.
///
/// This includes everything before the version string.
#[repr(C)]
#[derive(Debug)]
pub struct Header {
    /// The metadata signature, [`METADATA_SIGNATURE`].
    pub signature: u32,
    /// Major version, 1 (ignore on read).
    pub major_version: u16,
    /// Minor version, 1 (ignore on read).
    pub minor_version: u16,
    /// Reserved, always 0.
    pub _reserved: u32,
    /// Number of bytes allocated to hold the version string, rounded up to a multiple of 4.
    pub version_length: u32,
}

unsafe impl Pod for Header {}

/// Second part of the metadata root, following the version string.
#[repr(C)]
#[derive(Debug)]
pub struct HeaderPart2 {
    /// Reserved, always 0.
    pub flags: u16,
    /// Number of streams.
    pub streams: u16,
}

unsafe impl Pod for HeaderPart2 {}

/// A stream header, as specified in the ECMA-335 spec, II.24.2.2.
///
/// Does not contain the stream's name due to its variable length.
#[repr(C)]
#[derive(Debug)]
pub struct StreamHeader {
    /// Offset of the stream from the start of the metadata root.
    pub offset: u32,
    /// Size of this stream in bytes.
    pub size: u32,
}

unsafe impl Pod for StreamHeader {}

/// Header of the `#Pdb` stream.
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct PdbStreamHeader {
    /// 16 bytes GUID followed by a 4 byte stamp, matching the CodeView entry of the assembly.
    pub id: [u8; 20],
    pub entry_point: u32,
    /// Bit vector of type system tables whose row counts follow the header.
    pub referenced_tables: u64,
}

unsafe impl Pod for PdbStreamHeader {}

/// Header of the `#~` stream, as specified in the ECMA-335 spec, II.24.2.6.
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct MetadataStreamHeader {
    pub _reserved: u32,
    pub major_version: u8,
    pub minor_version: u8,
    pub heap_sizes: u8,
    pub _reserved2: u8,
    /// Bit vector of tables present in this stream.
    pub valid_tables: u64,
    pub sorted_tables: u64,
}

unsafe impl Pod for MetadataStreamHeader {}
