//! A bounded byte stream shared by one writer and one reader.
//!
//! The stream is the hand-off point between the application and the
//! transport: the sender drains one to build segments, the receiver fills one
//! as segments reassemble. A [`ByteStream`] has a single owner; mutation goes
//! through the two typed capabilities handed out by [`ByteStream::writer`]
//! and [`ByteStream::reader`], while the read-only observables are available
//! on the stream itself.

use std::collections::VecDeque;

/// A FIFO of bytes with a fixed capacity.
///
/// Pushed bytes come back out in order and exactly once. The writer may close
/// the stream (no further pushes); the reader observes `is_finished` once the
/// stream is closed and drained. The error flag is sticky and orthogonal to
/// closing; it marks the stream as unusable after a connection reset.
#[derive(Debug)]
pub struct ByteStream {
    capacity: usize,
    chunks: VecDeque<Vec<u8>>,
    // Prefix of the front chunk that has already been popped.
    front_offset: usize,
    closed: bool,
    error: bool,
    bytes_pushed: u64,
    bytes_popped: u64,
}

impl ByteStream {
    /// Create a stream that buffers at most `capacity` bytes at a time.
    pub fn new(capacity: usize) -> ByteStream {
        ByteStream {
            capacity,
            chunks: VecDeque::new(),
            front_offset: 0,
            closed: false,
            error: false,
            bytes_pushed: 0,
            bytes_popped: 0,
        }
    }

    /// The writing capability. Only one can be live at a time.
    pub fn writer(&mut self) -> Writer<'_> {
        Writer { stream: self }
    }

    /// The reading capability. Only one can be live at a time.
    pub fn reader(&mut self) -> Reader<'_> {
        Reader { stream: self }
    }

    /// Total number of bytes the stream can buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently buffered.
    pub fn bytes_buffered(&self) -> usize {
        (self.bytes_pushed - self.bytes_popped) as usize
    }

    /// Room left for further pushes.
    pub fn available_capacity(&self) -> usize {
        self.capacity - self.bytes_buffered()
    }

    /// Cumulative count of bytes accepted by `push`.
    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    /// Cumulative count of bytes consumed by `pop`.
    pub fn bytes_popped(&self) -> u64 {
        self.bytes_popped
    }

    /// Has the writer closed the stream?
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and fully drained?
    pub fn is_finished(&self) -> bool {
        self.closed && self.bytes_buffered() == 0
    }

    /// Mark the stream as having suffered an error. Sticky.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    /// Has the stream suffered an error?
    pub fn has_error(&self) -> bool {
        self.error
    }
}

/// Write end of a [`ByteStream`].
#[derive(Debug)]
pub struct Writer<'a> {
    stream: &'a mut ByteStream,
}

impl Writer<'_> {
    /// Append as much of `data` as fits in the available capacity.
    ///
    /// Returns the number of bytes accepted; the excess is dropped. Pushing
    /// to a closed stream is a no-op.
    pub fn push(&mut self, data: &[u8]) -> usize {
        if self.stream.closed || data.is_empty() {
            return 0;
        }
        let accepted = data.len().min(self.stream.available_capacity());
        if accepted == 0 {
            return 0;
        }
        self.stream.chunks.push_back(data[..accepted].to_vec());
        self.stream.bytes_pushed += accepted as u64;
        accepted
    }

    /// Signal that nothing more will be pushed. Idempotent.
    pub fn close(&mut self) {
        self.stream.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    pub fn available_capacity(&self) -> usize {
        self.stream.available_capacity()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.stream.bytes_pushed()
    }

    pub fn set_error(&mut self) {
        self.stream.set_error()
    }

    pub fn has_error(&self) -> bool {
        self.stream.has_error()
    }
}

/// Read end of a [`ByteStream`].
#[derive(Debug)]
pub struct Reader<'a> {
    stream: &'a mut ByteStream,
}

impl Reader<'_> {
    /// A contiguous view of some prefix of the buffered bytes.
    ///
    /// Non-empty whenever `bytes_buffered() > 0`; may be shorter than the
    /// total buffered amount since the stream holds bytes in chunks.
    pub fn peek(&self) -> &[u8] {
        match self.stream.chunks.front() {
            Some(chunk) => &chunk[self.stream.front_offset..],
            None => &[],
        }
    }

    /// Discard `len` bytes from the front of the stream.
    ///
    /// # Panics
    /// Panics if `len` exceeds `bytes_buffered()`; that is a caller bug, not
    /// a recoverable condition.
    pub fn pop(&mut self, mut len: usize) {
        assert!(
            len <= self.stream.bytes_buffered(),
            "pop past buffered size"
        );
        self.stream.bytes_popped += len as u64;
        while len > 0 {
            let front_len =
                self.stream.chunks.front().map_or(0, |chunk| chunk.len()) - self.stream.front_offset;
            if len < front_len {
                self.stream.front_offset += len;
                break;
            }
            self.stream.chunks.pop_front();
            self.stream.front_offset = 0;
            len -= front_len;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }

    pub fn bytes_buffered(&self) -> usize {
        self.stream.bytes_buffered()
    }

    pub fn bytes_popped(&self) -> u64 {
        self.stream.bytes_popped()
    }

    pub fn set_error(&mut self) {
        self.stream.set_error()
    }

    pub fn has_error(&self) -> bool {
        self.stream.has_error()
    }
}

/// Move up to `limit` bytes out of `reader` into `out`.
///
/// `out` is cleared first. Loops peek/pop until the limit is reached or the
/// stream runs dry.
pub fn read(reader: &mut Reader<'_>, limit: usize, out: &mut Vec<u8>) {
    out.clear();
    while reader.bytes_buffered() > 0 && out.len() < limit {
        let view = reader.peek();
        debug_assert!(!view.is_empty());
        let take = view.len().min(limit - out.len());
        out.extend_from_slice(&view[..take]);
        reader.pop(take);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_pop() {
        let mut stream = ByteStream::new(3);
        assert_eq!(stream.writer().push(b"cat"), 3);
        assert_eq!(stream.bytes_buffered(), 3);
        assert_eq!(stream.available_capacity(), 0);

        assert_eq!(stream.reader().peek(), b"cat");
        stream.reader().pop(3);
        assert_eq!(stream.bytes_buffered(), 0);
        assert_eq!(stream.bytes_popped(), 3);

        stream.writer().close();
        assert!(stream.is_closed());
        assert!(stream.is_finished());
    }

    #[test]
    fn overflow_is_dropped() {
        let mut stream = ByteStream::new(4);
        assert_eq!(stream.writer().push(b"flamingo"), 4);
        assert_eq!(stream.bytes_pushed(), 4);
        assert_eq!(stream.writer().push(b"x"), 0);

        let mut out = Vec::new();
        read(&mut stream.reader(), 8, &mut out);
        assert_eq!(out, b"flam");
    }

    #[test]
    fn capacity_accounting() {
        let mut stream = ByteStream::new(10);
        stream.writer().push(b"hello");
        assert_eq!(stream.bytes_buffered() + stream.available_capacity(), 10);
        stream.reader().pop(2);
        assert_eq!(stream.bytes_buffered() + stream.available_capacity(), 10);
        stream.writer().push(b"world");
        assert_eq!(stream.bytes_buffered(), 8);
        assert_eq!(stream.available_capacity(), 2);
    }

    #[test]
    fn peek_spans_partial_chunk() {
        let mut stream = ByteStream::new(16);
        stream.writer().push(b"abc");
        stream.writer().push(b"def");
        stream.reader().pop(1);
        assert_eq!(stream.reader().peek(), b"bc");
        stream.reader().pop(2);
        assert_eq!(stream.reader().peek(), b"def");
    }

    #[test]
    fn ordered_reads_across_chunks() {
        let mut stream = ByteStream::new(64);
        stream.writer().push(b"one ");
        stream.writer().push(b"two ");
        stream.writer().push(b"three");
        let mut out = Vec::new();
        read(&mut stream.reader(), 64, &mut out);
        assert_eq!(out, b"one two three");
    }

    #[test]
    fn push_after_close_is_ignored() {
        let mut stream = ByteStream::new(8);
        stream.writer().push(b"hi");
        stream.writer().close();
        assert_eq!(stream.writer().push(b"more"), 0);
        assert_eq!(stream.bytes_pushed(), 2);
        assert!(!stream.is_finished());
        stream.reader().pop(2);
        assert!(stream.is_finished());
    }

    #[test]
    fn error_is_sticky_and_orthogonal() {
        let mut stream = ByteStream::new(8);
        stream.writer().push(b"ab");
        stream.set_error();
        assert!(stream.has_error());
        assert!(!stream.is_closed());
        stream.writer().close();
        assert!(stream.has_error());
    }

    #[test]
    #[should_panic(expected = "pop past buffered size")]
    fn pop_past_end_panics() {
        let mut stream = ByteStream::new(8);
        stream.writer().push(b"ab");
        stream.reader().pop(3);
    }
}
