//! Definition of buffer helpers used by reads and writes on a stream.

/// Default size of the staging buffer used to copy from a reader into a stream.
pub(crate) const DEFAULT_BUF_SIZE: usize = 1 << 15;

/// Clamp a buffer to the number of bytes actually available.
///
/// * If buf is shorter than available, buf is returned as is.
/// * Otherwise the first `available` bytes of buf are returned.
///
/// # Arguments
///
/// * `buf` - Buffer requested by the caller.
/// * `available` - Number of bytes that can be read without blocking.
#[inline]
pub(crate) fn bounded(buf: &mut [u8], available: u64) -> &mut [u8] {
    // Saturates, no buffer is longer than usize::MAX.
    let len = usize::try_from(available).unwrap_or(usize::MAX);
    if len < buf.len() {
        &mut buf[..len]
    } else {
        buf
    }
}

/// Size of a staging buffer, rounded up to a whole number of OS pages.
///
/// # Arguments
///
/// * `requested` - Minimum number of bytes in the buffer.
pub(crate) fn staging_size(requested: usize) -> usize {
    let page = page_size::get();
    requested.max(1).div_ceil(page) * page
}

/// A reusable buffer to stage bytes copied from a reader into a stream.
#[derive(Debug)]
pub(crate) struct StagingBuf(Vec<u8>);

impl StagingBuf {
    /// Create a new instance of [`StagingBuf`].
    ///
    /// # Arguments
    ///
    /// * `requested` - Minimum capacity of the buffer, see [`staging_size`].
    pub(crate) fn new(requested: usize) -> Self {
        Self(vec![0; staging_size(requested)])
    }

    /// Full capacity of the buffer, to be filled by a reader.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// First len bytes of the buffer, the ones filled by a reader.
    pub(crate) fn filled(&self, len: usize) -> &[u8] {
        &self.0[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(8, 0, 0)]
    #[case(8, 3, 3)]
    #[case(8, 8, 8)]
    #[case(8, 64, 8)]
    #[case(8, u64::MAX, 8)]
    #[case(0, 64, 0)]
    fn bounded_len(#[case] len: usize, #[case] available: u64, #[case] expected: usize) {
        let mut buf = vec![0; len];
        assert_eq!(bounded(&mut buf, available).len(), expected);
    }

    #[test]
    fn bounded_is_prefix() {
        check!()
            .with_type::<(Vec<u8>, u16)>()
            .for_each(|(buf, available)| {
                let mut copy = buf.clone();
                let view = bounded(&mut copy, *available as u64);

                // Always a prefix of the original, never longer than available.
                assert!(view.len() <= *available as usize);
                assert_eq!(view, &buf[..view.len()]);
            });
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(DEFAULT_BUF_SIZE)]
    #[case(DEFAULT_BUF_SIZE + 1)]
    fn staging_size_is_page_aligned(#[case] requested: usize) {
        let size = staging_size(requested);
        assert!(size >= requested.max(1));
        assert_eq!(size % page_size::get(), 0);
        assert_eq!(StagingBuf::new(requested).as_mut_slice().len(), size);
    }
}
