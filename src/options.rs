//! Definition of options used to create a [`StreamFile`](crate::StreamFile).

use crate::buf::DEFAULT_BUF_SIZE;
use std::path::PathBuf;

/// Options used to create a new [`StreamFile`](crate::StreamFile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    dir: Option<PathBuf>,
    prefix: String,
    buf_size: usize,
    sync_on_close: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "stream_".to_owned(),
            buf_size: DEFAULT_BUF_SIZE,
            sync_on_close: false,
        }
    }
}

impl Options {
    /// Directory to create the backing file in.
    ///
    /// Defaults to the system temporary directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory that must exist and be writable.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Prefix of the randomly generated backing file name.
    ///
    /// # Arguments
    ///
    /// * `prefix` - File name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Size of the staging buffer used by [`StreamFile::read_from`](crate::StreamFile::read_from).
    ///
    /// Rounded up to a whole number of OS pages.
    ///
    /// # Arguments
    ///
    /// * `buf_size` - Minimum size of the staging buffer in bytes.
    pub fn buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size;
        self
    }

    /// Flush backing file to disk when the stream is closed.
    ///
    /// # Arguments
    ///
    /// * `sync_on_close` - true to fsync during close.
    pub fn sync_on_close(mut self, sync_on_close: bool) -> Self {
        self.sync_on_close = sync_on_close;
        self
    }

    pub(crate) fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub(crate) fn file_prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn staging_buf_size(&self) -> usize {
        self.buf_size
    }

    pub(crate) fn syncs_on_close(&self) -> bool {
        self.sync_on_close
    }
}
