//! A wrapper type providing direct memory access to debug file contents.
//!
//! See the [`ByteView`] struct for more documentation.

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::cell::StableDeref;

/// The owner of data behind a ByteView.
#[derive(Debug)]
enum Backing<'a> {
    Buf(Cow<'a, [u8]>),
    Mmap(Mmap),
}

impl Deref for Backing<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match *self {
            Backing::Buf(ref buf) => buf,
            Backing::Mmap(ref mmap) => mmap,
        }
    }
}

/// A smart pointer for the bytes of a debug file.
///
/// Debug files found by the symbol store are memory mapped from disk, while tests and archive
/// extraction may hand in owned or borrowed buffers. A `ByteView` dereferences into `&[u8]` in
/// all cases and is cheap to clone.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use prodtrace_common::ByteView;
///
/// fn main() -> Result<(), std::io::Error> {
///     let mut file = tempfile::NamedTempFile::new()?;
///     file.write_all(b"BSJB")?;
///
///     let view = ByteView::open(file.path())?;
///     assert!(view.starts_with(b"BSJB"));
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ByteView<'a> {
    backing: Arc<Backing<'a>>,
}

impl<'a> ByteView<'a> {
    fn with_backing(backing: Backing<'a>) -> Self {
        ByteView {
            backing: Arc::new(backing),
        }
    }

    /// Constructs a `ByteView` from a `Cow`.
    pub fn from_cow(cow: Cow<'a, [u8]>) -> Self {
        ByteView::with_backing(Backing::Buf(cow))
    }

    /// Constructs a `ByteView` from a byte slice.
    pub fn from_slice(buffer: &'a [u8]) -> Self {
        ByteView::from_cow(Cow::Borrowed(buffer))
    }

    /// Constructs a `ByteView` from a vector of bytes.
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        ByteView::from_cow(Cow::Owned(buffer))
    }

    /// Memory maps an open file handle.
    ///
    /// Empty files cannot be mapped and produce an empty view instead of an error.
    pub fn map_file(file: File) -> Result<Self, io::Error> {
        let backing = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Backing::Mmap(mmap),
            // Windows reports error 1006 for files that were altered externally after opening.
            Err(err)
                if err.kind() == io::ErrorKind::InvalidInput
                    || (cfg!(windows) && err.raw_os_error() == Some(1006)) =>
            {
                Backing::Buf(Cow::Borrowed(b""))
            }
            Err(err) => return Err(err),
        };

        Ok(ByteView::with_backing(backing))
    }

    /// Opens and memory maps the file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        Self::map_file(file)
    }

    /// Returns a slice of the underlying data.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        self.backing.deref()
    }
}

impl AsRef<[u8]> for ByteView<'_> {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

unsafe impl StableDeref for ByteView<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use similar_asserts::assert_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_empty_file() -> Result<(), io::Error> {
        let tmp = NamedTempFile::new()?;

        let view = ByteView::open(tmp.path())?;
        assert_eq!(&*view, b"");

        Ok(())
    }

    #[test]
    fn test_open_file() -> Result<(), io::Error> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"Microsoft C/C++ MSF 7.00")?;

        let view = ByteView::open(tmp.path())?;
        assert_eq!(&view[..9], b"Microsoft");

        Ok(())
    }

    #[test]
    fn test_clone_shares_backing() {
        let view = ByteView::from_vec(b"BSJB".to_vec());
        let clone = view.clone();
        assert_eq!(view.as_ptr(), clone.as_ptr());
    }
}
