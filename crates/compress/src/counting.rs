use std::io::{self, IoSliceMut, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared view of how many raw bytes have been consumed from a file.
///
/// Clones observe the same counter, so a truncation checker running on
/// another task can compare it against the file's current size.
#[derive(Clone, Debug, Default)]
pub struct Offset(Arc<AtomicU64>);

impl Offset {
    /// Counter starting at `start`.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    /// Current raw offset.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn advance(&self, by: usize) {
        self.0.fetch_add(by as u64, Ordering::Relaxed);
    }
}

/// Reader that records the number of raw bytes read from the wrapped source.
pub struct CountingReader<R> {
    inner: R,
    offset: Offset,
}

impl<R> CountingReader<R> {
    /// Wraps `inner`, counting into `offset`.
    pub const fn new(inner: R, offset: Offset) -> Self {
        Self { inner, offset }
    }

    /// Returns the shared offset handle.
    #[must_use]
    pub fn offset(&self) -> Offset {
        self.offset.clone()
    }

    /// Returns an immutable reference to the wrapped reader.
    #[must_use]
    pub const fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R> Read for CountingReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.offset.advance(read);
        Ok(read)
    }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        let read = self.inner.read_vectored(bufs)?;
        self.offset.advance(read);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bytes_read_through_clones() {
        let offset = Offset::new(10);
        let mut reader = CountingReader::new(&b"abcdef"[..], offset.clone());
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(offset.get(), 14);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(reader.offset().get(), 16);
    }
}
