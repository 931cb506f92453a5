//! Definition of a file that can be read while it is still being written.

use crate::{
    Options, Result, StreamError,
    buf::{StagingBuf, bounded},
    storage::{self, ReadAt},
};
use memmap2::Mmap;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::{
    fs::{self, File},
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

/// Origin of a seek on a [`StreamFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the beginning of the stream.
    Start,

    /// Relative to the current read cursor.
    Current,

    /// Relative to the final size of the stream, blocks until the stream is done.
    End,
}

impl TryFrom<u8> for Whence {
    type Error = StreamError;

    fn try_from(whence: u8) -> Result<Self> {
        match whence {
            0 => Ok(Self::Start),
            1 => Ok(Self::Current),
            2 => Ok(Self::End),
            _ => Err(StreamError::InvalidWhence(whence)),
        }
    }
}

impl Whence {
    /// Split a std seek position into an offset and it's origin.
    ///
    /// # Arguments
    ///
    /// * `pos` - Position to split.
    fn split(pos: SeekFrom) -> Result<(i64, Self)> {
        match pos {
            SeekFrom::Start(offset) => i64::try_from(offset)
                .map(|offset| (offset, Self::Start))
                .map_err(|_| StreamError::InvalidOffset),
            SeekFrom::Current(offset) => Ok((offset, Self::Current)),
            SeekFrom::End(offset) => Ok((offset, Self::End)),
        }
    }
}

/// State shared between the writer and readers, guarded by the monitor.
#[derive(Debug, Default)]
struct State {
    // Total number of bytes committed by the writer.
    written: u64,

    // Cursor for sequential reads, not shared with positional reads.
    cursor: u64,

    // No more bytes will ever be written.
    done: bool,

    // Backing file has been released.
    closed: bool,
}

/// A file that is read like a complete file while it is still being written.
///
/// There is exactly one writer, that appends bytes to the end of the stream,
/// and any number of readers. Reads that outrun the writer block until more
/// bytes are written or the writer is done, instead of returning short data.
///
/// * Writes never block on readers.
/// * Positional reads ([`ReadAt`]) fill the buffer completely, or stop at the end of stream.
/// * Sequential reads return whatever is available, blocking only if nothing is.
/// * Size of the stream is only known, and reported, once the writer is done.
///
/// Share between threads with a reference or an [`Arc`](std::sync::Arc), every
/// operation takes `&self`. Concurrent writes are not supported, their
/// interleaving is undefined.
#[derive(Debug)]
pub struct StreamFile {
    path: PathBuf,
    buf_size: usize,
    sync_on_close: bool,

    // Released on close, readers hold shared access for the duration of I/O.
    file: RwLock<Option<File>>,

    // Monitor coordinating the writer with readers.
    state: Mutex<State>,
    ready: Condvar,
}

impl StreamFile {
    /// Create a new stream backed by a file in the system temporary directory.
    pub fn new() -> Result<Self> {
        Self::with_options(&Options::default())
    }

    /// Create a new stream backed by a file in a specific directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory that must exist and be writable.
    pub fn new_in(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(&Options::default().dir(dir))
    }

    /// Create a new stream from options.
    ///
    /// Backing file is uniquely named and is not deleted automatically, use
    /// [`StreamFile::remove`] or [`StreamFile::move_to`] to dispose of it.
    ///
    /// # Arguments
    ///
    /// * `options` - Options to create stream with.
    pub fn with_options(options: &Options) -> Result<Self> {
        let (file, path) = tempfile::Builder::new()
            .prefix(options.file_prefix())
            .tempfile_in(options.resolved_dir())?
            .keep()
            .map_err(|e| e.error)?;

        debug!(path = %path.display(), "Created stream file");

        Ok(Self {
            path,
            buf_size: options.staging_buf_size(),
            sync_on_close: options.syncs_on_close(),
            file: RwLock::new(Some(file)),
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
        })
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written so far, never blocks.
    ///
    /// Unlike [`StreamFile::size`] this might not be the final size.
    pub fn written(&self) -> u64 {
        self.state.lock().written
    }

    /// Append bytes to the end of the stream and wake up all blocked readers.
    ///
    /// Bytes are stored before they are made visible to readers. If storage fails
    /// after some bytes were stored, those bytes stay visible and the error is
    /// reported as [`StreamError::ShortWrite`].
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to append.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        // Single writer, offset cannot move until this write exposes new bytes.
        let offset = self.writable()?;

        let file = self.file.read();
        let Some(file) = file.as_ref() else {
            return Err(StreamError::AlreadyClosed);
        };

        // Storage I/O happens outside the monitor.
        let (written, result) = storage::write_all_at(file, bytes, offset);

        let mut state = self.state.lock();
        if state.done {
            // Finalized while storing, size is frozen and these bytes must never be visible.
            drop(state);
            file.set_len(offset)?;
            return Err(self.writable().err().unwrap_or(StreamError::AlreadyFinalized));
        }

        // Expose stored bytes to readers.
        if written > 0 {
            state.written += written as u64;
            self.ready.notify_all();
        }

        trace!(written, offset = state.written, "Appended to stream");
        drop(state);

        match result {
            Ok(()) => Ok(written),
            Err(source) if written == 0 => Err(source.into()),
            Err(source) => Err(StreamError::ShortWrite { written, source }),
        }
    }

    /// Copy all bytes from a reader into the stream.
    ///
    /// Stream is not marked as done when the reader is exhausted. On error, bytes
    /// copied before the error remain in the stream and their count is reported
    /// with [`StreamError::Copy`].
    ///
    /// # Arguments
    ///
    /// * `source` - Reader to copy bytes from.
    pub fn read_from(&self, mut source: impl io::Read) -> Result<u64> {
        let mut buf = StagingBuf::new(self.buf_size);
        let mut copied = 0;

        loop {
            let read = match source.read(buf.as_mut_slice()) {
                Ok(0) => return Ok(copied),
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::copy(copied, e.into())),
            };

            match self.write(buf.filled(read)) {
                Ok(written) => copied += written as u64,
                Err(StreamError::ShortWrite { written, source }) => {
                    copied += written as u64;
                    return Err(StreamError::copy(copied, source.into()));
                }
                Err(e) => return Err(StreamError::copy(copied, e)),
            }
        }
    }

    /// Mark the stream as done writing, waking up all blocked readers.
    ///
    /// Size of the stream is frozen. Calling this more than once is a no-op.
    pub fn done_writing(&self) {
        self.finalize(false);
    }

    /// true if the stream is done writing, false otherwise. Never blocks.
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Block until the stream is done writing.
    pub fn wait(&self) {
        drop(self.wait_done());
    }

    /// Final size of the stream, blocks until the stream is done writing.
    pub fn size(&self) -> u64 {
        self.wait_done().written
    }

    /// Sequential read from the read cursor.
    ///
    /// * Blocks only if there are no bytes available at the cursor.
    /// * Returns bytes available without blocking again, might be fewer than buf.len().
    /// * Returns [`StreamError::EndOfStream`] if the cursor is at or past the final size.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to read bytes into.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        // Cursor is re-read after every wake up, seeks never wait on a parked read.
        let Some((cursor, written)) = self.wait_until(|state| state.cursor)? else {
            return Err(StreamError::EndOfStream { read: 0 });
        };

        let read = self.read_available(bounded(buf, written - cursor), cursor)?;

        // A concurrent seek wins over this read.
        let mut state = self.state.lock();
        if state.cursor == cursor {
            state.cursor += read as u64;
        }

        Ok(read)
    }

    /// Move the read cursor.
    ///
    /// Seeking from start or current position never blocks, cursor is allowed to
    /// move past bytes written so far. Subsequent reads block until bytes arrive.
    /// Seeking from the end blocks until the stream is done and it's size is known.
    ///
    /// Returns the new position of the cursor.
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset relative to whence.
    /// * `whence` - Origin of the offset.
    pub fn seek(&self, offset: i64, whence: Whence) -> Result<u64> {
        let mut state = match whence {
            Whence::End => self.wait_done(),
            Whence::Start | Whence::Current => self.state.lock(),
        };

        if state.closed {
            return Err(StreamError::AlreadyClosed);
        }

        let base = match whence {
            Whence::Start => 0,
            Whence::Current => state.cursor,
            Whence::End => state.written,
        };

        let position = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .filter(|position| *position >= 0)
            .ok_or(StreamError::InvalidOffset)?;

        state.cursor = position as u64;
        Ok(state.cursor)
    }

    /// Memory map the complete stream, blocks until the stream is done writing.
    ///
    /// Mapping remains valid after the stream is closed or removed.
    pub fn map(&self) -> Result<Mmap> {
        self.wait();

        let file = self.file.read();
        let Some(file) = file.as_ref() else {
            return Err(StreamError::AlreadyClosed);
        };

        // Safety: Stream is done writing, bytes in the file will never be modified
        // through this stream again. Like any file backed map, this assumes there
        // is no external modification to the file.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(mmap)
    }

    /// Mark the stream as done writing and release the backing file.
    ///
    /// Readers blocked on the stream wake up with [`StreamError::AlreadyClosed`].
    /// Calling this more than once is a no-op.
    pub fn close(&self) -> Result<()> {
        if !self.finalize(true) {
            return Ok(());
        }

        // Only waits for in-flight I/O, blocked readers were just woken up.
        let file = self.file.write().take();
        debug!(path = %self.path.display(), "Closed stream file");

        match file {
            Some(file) if self.sync_on_close => Ok(file.sync_all()?),
            _ => Ok(()),
        }
    }

    /// Close the stream and move the backing file to a new path.
    ///
    /// If the file cannot be moved, the stream stays closed and
    /// [`StreamError::Move`] is returned.
    ///
    /// # Arguments
    ///
    /// * `to` - New path of the backing file.
    pub fn move_to(&self, to: impl AsRef<Path>) -> Result<()> {
        self.close()?;

        let to = to.as_ref();
        fs::rename(&self.path, to).map_err(|source| StreamError::Move {
            to: to.to_owned(),
            source,
        })?;

        debug!(from = %self.path.display(), to = %to.display(), "Moved stream file");
        Ok(())
    }

    /// Close the stream and delete the backing file.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "Removed stream file");
        Ok(())
    }

    /// One way transition to done, and optionally closed, waking up all blocked readers.
    ///
    /// Returns true if this call closed the stream.
    ///
    /// # Arguments
    ///
    /// * `close` - true to also mark the stream as closed.
    fn finalize(&self, close: bool) -> bool {
        let mut state = self.state.lock();
        let finalized = !state.done;
        let closed = close && !state.closed;

        state.done = true;
        state.closed |= close;

        if finalized || closed {
            self.ready.notify_all();
        }

        if finalized {
            debug!(path = %self.path.display(), size = state.written, "Stream done writing");
        }

        closed
    }

    /// Offset of the next write, fails if the stream no longer accepts writes.
    fn writable(&self) -> Result<u64> {
        let state = self.state.lock();
        if state.closed {
            return Err(StreamError::AlreadyClosed);
        }

        if state.done {
            return Err(StreamError::AlreadyFinalized);
        }

        Ok(state.written)
    }

    /// Block until the stream is done writing.
    fn wait_done(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock();
        while !state.done {
            self.ready.wait(&mut state);
        }

        state
    }

    /// Block until there are bytes available at offset, or there never will be.
    ///
    /// Returns the offset along with bytes written so far if offset is readable,
    /// None if stream is done and offset is at or past the final size.
    ///
    /// # Arguments
    ///
    /// * `offset` - Position of the byte to wait for, evaluated after every wake up.
    fn wait_until(&self, offset: impl Fn(&State) -> u64) -> Result<Option<(u64, u64)>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StreamError::AlreadyClosed);
            }

            let offset = offset(&state);
            if offset < state.written {
                return Ok(Some((offset, state.written)));
            }

            if state.done {
                return Ok(None);
            }

            trace!(offset, written = state.written, "Waiting for writer");
            self.ready.wait(&mut state);
        }
    }

    /// Read bytes that are already committed, never blocks.
    ///
    /// # Invariants
    ///
    /// * offset + buf.len() <= bytes written.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to read bytes into.
    /// * `offset` - Position of the first byte to read.
    fn read_available(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let file = self.file.read();
        let Some(file) = file.as_ref() else {
            return Err(StreamError::AlreadyClosed);
        };

        loop {
            match storage::read_once(file, buf, offset) {
                // Committed bytes can only vanish if the file was truncated externally.
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(read) => return Ok(read),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl ReadAt for StreamFile {
    /// Positional read, blocks until buf is filled or the stream is done.
    ///
    /// Does not use or move the read cursor.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut offset = storage::position(offset)?;
        let mut read = 0;

        loop {
            let Some((_, written)) = self.wait_until(|_| offset)? else {
                return Err(StreamError::EndOfStream { read });
            };

            let view = bounded(&mut buf[read..], written - offset);
            let len = self.read_available(view, offset)?;
            read += len;
            offset += len as u64;

            if read == buf.len() {
                return Ok(read);
            }
        }
    }
}

impl io::Read for &StreamFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match StreamFile::read(*self, buf) {
            Ok(read) => Ok(read),
            Err(StreamError::EndOfStream { read }) => Ok(read),
            Err(e) => Err(e.into()),
        }
    }
}

impl io::Write for &StreamFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match StreamFile::write(*self, buf) {
            Ok(written) => Ok(written),
            // Report stored bytes now, next write surfaces the error.
            Err(StreamError::ShortWrite { written, .. }) => Ok(written),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for &StreamFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = Whence::split(pos)?;
        Ok(StreamFile::seek(*self, offset, whence)?)
    }
}

impl io::Read for StreamFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for StreamFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for StreamFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut &*self, pos)
    }
}
