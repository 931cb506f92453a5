//! # Streamfile
//!
//! Streamfile lets one writer append bytes to a file on disk while any number of
//! readers treat it as a complete, randomly seekable file.
//!
//! ## StreamFile
//!
//! A [`StreamFile`] is backed by a uniquely named file. Reads that outrun the writer
//! block until more bytes are written, or until the writer is done, rather than
//! returning short data or an error. Once the writer is done the size of the stream
//! is frozen and reads past the end return [`StreamError::EndOfStream`].
//!
//! ## Capabilities
//!
//! A stream implements narrow capabilities so collaborators can depend on just what
//! they need.
//!
//! * [`std::io::Read`], [`std::io::Write`] and [`std::io::Seek`], both for
//!   [`StreamFile`] and `&StreamFile`.
//! * [`ReadAt`] - Positional, cursor independent reads.

pub(crate) mod buf;
pub(crate) mod error;
pub(crate) mod options;
pub(crate) mod storage;
pub(crate) mod stream;

// Externally exposed types.
pub use error::{Result, StreamError};
pub use memmap2::Mmap;
pub use options::Options;
pub use storage::ReadAt;
pub use stream::{StreamFile, Whence};
