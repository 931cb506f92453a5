//! Definition of errors returned by a [`StreamFile`](crate::StreamFile).

use std::{io, path::PathBuf};
use thiserror::Error;

/// Convenience alias for results of stream operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Different types of error that can happen when operating on a [`StreamFile`](crate::StreamFile).
#[derive(Debug, Error)]
pub enum StreamError {
    /// Backing storage failed, propagated verbatim.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Storage failed after some bytes were already committed.
    #[error("Storage failed after writing {written} bytes: {source}")]
    ShortWrite {
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("Stream is already done writing")]
    AlreadyFinalized,

    #[error("Stream is already closed")]
    AlreadyClosed,

    #[error("Invalid offset")]
    InvalidOffset,

    #[error("Invalid whence: {0}")]
    InvalidWhence(u8),

    /// No more data will ever arrive at or past the requested position.
    ///
    /// Not a true failure. `read` is the number of bytes delivered into the
    /// caller's buffer before the end was reached.
    #[error("End of stream after reading {read} bytes")]
    EndOfStream { read: usize },

    /// Copying from a reader stopped early, `copied` bytes made it into the stream.
    #[error("Copy failed after {copied} bytes: {source}")]
    Copy {
        copied: u64,
        #[source]
        source: Box<StreamError>,
    },

    /// Stream was closed but the backing file could not be renamed.
    #[error("Cannot move stream to {to:?}: {source}")]
    Move {
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    /// true if this is the end of stream sentinel, false otherwise.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }

    pub(crate) fn copy(copied: u64, source: StreamError) -> Self {
        Self::Copy {
            copied,
            source: Box::new(source),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(error: StreamError) -> Self {
        match error {
            StreamError::Io(e) => e,
            StreamError::ShortWrite { source, .. } => source,
            StreamError::Move { source, .. } => source,
            StreamError::Copy { source, .. } => (*source).into(),
            StreamError::EndOfStream { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, error),
            StreamError::InvalidOffset | StreamError::InvalidWhence(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, error)
            }
            StreamError::AlreadyFinalized => io::Error::new(io::ErrorKind::BrokenPipe, error),
            StreamError::AlreadyClosed => io::Error::other(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StreamError::InvalidOffset, io::ErrorKind::InvalidInput)]
    #[case(StreamError::InvalidWhence(7), io::ErrorKind::InvalidInput)]
    #[case(StreamError::AlreadyFinalized, io::ErrorKind::BrokenPipe)]
    #[case(StreamError::AlreadyClosed, io::ErrorKind::Other)]
    #[case(StreamError::EndOfStream { read: 3 }, io::ErrorKind::UnexpectedEof)]
    #[case(StreamError::Io(io::ErrorKind::NotFound.into()), io::ErrorKind::NotFound)]
    #[case(StreamError::copy(3, StreamError::AlreadyFinalized), io::ErrorKind::BrokenPipe)]
    fn io_error_kind(#[case] error: StreamError, #[case] kind: io::ErrorKind) {
        assert_eq!(io::Error::from(error).kind(), kind);
    }

    #[test]
    fn end_of_stream_sentinel() {
        assert!(StreamError::EndOfStream { read: 0 }.is_end_of_stream());
        assert!(!StreamError::AlreadyClosed.is_end_of_stream());
    }
}
