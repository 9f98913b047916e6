//! A wrapper type providing direct memory access to binary data.
//!
//! See the [`ByteView`] struct for more documentation.
//!
//! [`ByteView`]: struct.ByteView.html

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::cell::{AsSelf, StableDeref};

/// The owner of data behind a ByteView.
///
/// This can either be a memory-mapped file or an owned or borrowed buffer.
#[derive(Debug)]
enum ByteViewBacking<'a> {
    Buf(Cow<'a, [u8]>),
    Mmap(Mmap),
}

impl Deref for ByteViewBacking<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match *self {
            ByteViewBacking::Buf(ref buf) => buf,
            ByteViewBacking::Mmap(ref mmap) => mmap,
        }
    }
}

/// A smart pointer for byte data.
///
/// This type can be used to uniformly access bytes that were created either
/// from mmapping in a path, a vector or a borrowed slice. A `ByteView`
/// dereferences into a `&[u8]` and guarantees random access to the underlying
/// buffer or file.
///
/// Cloning is cheap: the backing storage is shared through an `Arc`, which
/// also guarantees a stable address of the data for the lifetime of all
/// clones. This makes `ByteView` suitable as the owner in a [`SelfCell`].
///
/// # Example
///
/// ```
/// use retrace_common::ByteView;
///
/// let view = ByteView::from_slice(b"1234");
/// assert_eq!(view.as_slice(), b"1234");
/// ```
///
/// [`SelfCell`]: struct.SelfCell.html
#[derive(Clone, Debug)]
pub struct ByteView<'a> {
    backing: Arc<ByteViewBacking<'a>>,
}

impl<'a> ByteView<'a> {
    fn with_backing(backing: ByteViewBacking<'a>) -> Self {
        ByteView {
            backing: Arc::new(backing),
        }
    }

    /// Constructs a `ByteView` from a byte slice.
    pub fn from_slice(buffer: &'a [u8]) -> Self {
        ByteView::with_backing(ByteViewBacking::Buf(Cow::Borrowed(buffer)))
    }

    /// Constructs a `ByteView` from a vector of bytes.
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        ByteView::with_backing(ByteViewBacking::Buf(Cow::Owned(buffer)))
    }

    /// Constructs a `ByteView` from an open file handle by memory mapping the
    /// file.
    pub fn map_file(file: File) -> Result<Self, io::Error> {
        // An empty file cannot be mmap'ed; fall back to an empty buffer.
        let backing = if file.metadata()?.len() == 0 {
            ByteViewBacking::Buf(Cow::Borrowed(b""))
        } else {
            ByteViewBacking::Mmap(unsafe { Mmap::map(&file)? })
        };

        Ok(ByteView::with_backing(backing))
    }

    /// Constructs a `ByteView` from a file path by memory mapping the file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use retrace_common::ByteView;
    ///
    /// let view = ByteView::open("/usr/lib/libc.so.6")?;
    /// # Ok::<_, std::io::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        Self::map_file(file)
    }

    /// Returns a slice of the underlying data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.backing.deref()
    }
}

impl AsRef<[u8]> for ByteView<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

// The data is shared through an `Arc` and is never mutated, so the referenced
// slice never moves while any clone of the view is alive.
unsafe impl StableDeref for ByteView<'_> {}

impl<'slf, 'd: 'slf> AsSelf<'slf> for ByteView<'d> {
    type Ref = ByteView<'slf>;

    fn as_self(&'slf self) -> &Self::Ref {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_from_vec() {
        let view = ByteView::from_vec(b"retrace".to_vec());
        assert_eq!(view.as_slice(), b"retrace");
    }

    #[test]
    fn test_map_file() -> Result<(), io::Error> {
        let path = std::env::temp_dir().join("retrace_byteview_test");
        let mut file = File::create(&path)?;
        file.write_all(b"1234")?;
        drop(file);

        let view = ByteView::open(&path)?;
        assert_eq!(view.as_slice(), b"1234");

        std::fs::remove_file(&path).ok();
        Ok(())
    }

    #[test]
    fn test_map_empty_file() -> Result<(), io::Error> {
        let path = std::env::temp_dir().join("retrace_byteview_empty_test");
        File::create(&path)?;

        let view = ByteView::open(&path)?;
        assert_eq!(view.len(), 0);

        std::fs::remove_file(&path).ok();
        Ok(())
    }
}
