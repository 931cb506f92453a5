//! Definition of positional I/O against the storage that backs a stream.

use crate::{Result, StreamError};
use std::{fs::File, io};

/// Positional, cursor independent reads.
///
/// Implementations provide the contract of a positional read on a complete file:
/// either the buffer is filled completely, or the end of data was reached and
/// [`StreamError::EndOfStream`] is returned with the number of bytes delivered.
///
/// Offsets are file positions, so offsets that do not fit into an `i64` are
/// rejected with [`StreamError::InvalidOffset`].
pub trait ReadAt {
    /// Read bytes starting at offset into buf.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to fill.
    /// * `offset` - Position of the first byte to read.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

/// Validate that an offset is a legal file position.
///
/// # Arguments
///
/// * `offset` - Offset to validate.
#[inline]
pub(crate) fn position(offset: u64) -> Result<u64> {
    match i64::try_from(offset) {
        Ok(_) => Ok(offset),
        Err(_) => Err(StreamError::InvalidOffset),
    }
}

/// A single positional read, might return fewer bytes than requested.
#[cfg(unix)]
pub(crate) fn read_once(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

/// A single positional read, might return fewer bytes than requested.
#[cfg(windows)]
pub(crate) fn read_once(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

/// A single positional write, might store fewer bytes than requested.
#[cfg(unix)]
fn write_once(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

/// A single positional write, might store fewer bytes than requested.
#[cfg(windows)]
fn write_once(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

/// Store all of buf at offset.
///
/// Returns the number of bytes stored, along with the error that stopped the
/// write early if any. Stored bytes are never rolled back.
///
/// # Arguments
///
/// * `file` - File to write into.
/// * `buf` - Bytes to store.
/// * `offset` - Position of the first byte to store.
pub(crate) fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> (usize, io::Result<()>) {
    let mut written = 0;
    while !buf.is_empty() {
        match write_once(file, buf, offset) {
            Ok(0) => return (written, Err(io::ErrorKind::WriteZero.into())),
            Ok(n) => {
                written += n;
                offset += n as u64;
                buf = &buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (written, Err(e)),
        }
    }

    (written, Ok(()))
}

impl ReadAt for File {
    fn read_at(&self, mut buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut offset = position(offset)?;

        // Fill buffer till full or the end of file.
        let mut read = 0;
        while !buf.is_empty() {
            match read_once(self, buf, offset) {
                Ok(0) => return Err(StreamError::EndOfStream { read }),
                Ok(n) => {
                    read += n;
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(read)
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let offset = position(offset)?;

        // Offsets past the end are never readable.
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let src = &self[start..];

        let read = src.len().min(buf.len());
        buf[..read].copy_from_slice(&src[..read]);

        if read < buf.len() {
            Err(StreamError::EndOfStream { read })
        } else {
            Ok(read)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;
    use rstest::rstest;

    fn file_with(bytes: &[u8]) -> File {
        let file = tempfile::tempfile().expect("Should create temp file");
        let (written, result) = write_all_at(&file, bytes, 0);
        result.expect("Should write bytes");
        assert_eq!(written, bytes.len());
        file
    }

    #[rstest]
    #[case(0, 4, Ok(4))]
    #[case(6, 4, Ok(4))]
    #[case(8, 4, Err(2))]
    #[case(10, 4, Err(0))]
    #[case(64, 4, Err(0))]
    #[case(0, 0, Ok(0))]
    fn read_at_file(
        #[case] offset: u64,
        #[case] len: usize,
        #[case] expected: std::result::Result<usize, usize>,
    ) {
        let bytes = b"0123456789";
        let file = file_with(bytes);

        let mut buf = vec![0; len];
        let result = file.read_at(&mut buf, offset);
        match (result, expected) {
            (Ok(read), Ok(want)) => assert_eq!(read, want),
            (Err(StreamError::EndOfStream { read }), Err(want)) => assert_eq!(read, want),
            (result, expected) => panic!("Unexpected result {result:?}, want {expected:?}"),
        }
    }

    #[test]
    fn invalid_offset() {
        let file = file_with(b"abc");
        let mut buf = [0; 1];

        let offset = (-1i64) as u64;
        assert!(matches!(
            file.read_at(&mut buf, offset),
            Err(StreamError::InvalidOffset)
        ));
        assert!(matches!(
            b"abc"[..].read_at(&mut buf, offset),
            Err(StreamError::InvalidOffset)
        ));
    }

    #[test]
    fn write_at_offset() {
        let file = file_with(b"hello");
        let (written, result) = write_all_at(&file, b"world", 5);
        assert!(result.is_ok());
        assert_eq!(written, 5);

        let mut buf = [0; 10];
        assert_eq!(file.read_at(&mut buf, 0).ok(), Some(10));
        assert_eq!(&buf, b"helloworld");
    }

    #[test]
    fn file_matches_slice() {
        check!()
            .with_type::<(Vec<u8>, u8, u8)>()
            .for_each(|(bytes, offset, len)| {
                let file = file_with(bytes);

                let mut from_file = vec![0; *len as usize];
                let mut from_slice = vec![0; *len as usize];

                // Both implementations must agree on outcome and content.
                let file_result = file.read_at(&mut from_file, *offset as u64);
                let slice_result = bytes[..].read_at(&mut from_slice, *offset as u64);
                match (file_result, slice_result) {
                    (Ok(a), Ok(b)) => assert_eq!(a, b),
                    (
                        Err(StreamError::EndOfStream { read: a }),
                        Err(StreamError::EndOfStream { read: b }),
                    ) => assert_eq!(a, b),
                    (a, b) => panic!("Mismatch between file: {a:?} and slice: {b:?}"),
                }

                assert_eq!(from_file, from_slice);
            });
    }
}
