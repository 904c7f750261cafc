//! Reassembly of an ordered byte stream from out-of-order substrings.

use std::collections::BTreeMap;

use crate::stream::{ByteStream, Reader};

/// Accepts indexed substrings, possibly out of order and overlapping, and
/// writes them to a [`ByteStream`] in order and exactly once.
///
/// Bytes that land beyond the next needed index but within the stream's
/// available capacity are buffered until the gap before them fills. Bytes
/// past the capacity window are dropped; flow control keeps the peer from
/// sending them in the first place.
#[derive(Debug)]
pub struct Reassembler {
    output: ByteStream,
    // Buffered substrings keyed by begin index. Disjoint and non-adjacent:
    // overlapping or abutting inserts are merged on arrival.
    pending: BTreeMap<u64, Vec<u8>>,
    first_unassembled: u64,
    bytes_pending: u64,
    eof_index: Option<u64>,
}

impl Reassembler {
    /// Wrap an output stream. The reassembler becomes its only writer.
    pub fn new(output: ByteStream) -> Reassembler {
        Reassembler {
            output,
            pending: BTreeMap::new(),
            first_unassembled: 0,
            bytes_pending: 0,
            eof_index: None,
        }
    }

    /// Insert the substring `data` starting at stream index `first_index`.
    ///
    /// `is_last_substring` marks `data` as ending the stream; once its final
    /// byte is written, the output stream is closed.
    pub fn insert(&mut self, first_index: u64, data: &[u8], is_last_substring: bool) {
        if self.output.is_closed() {
            return;
        }
        if self.eof_index.is_some_and(|eof| first_index >= eof) {
            return;
        }
        let window_end = self.first_unassembled + self.output.available_capacity() as u64;
        if first_index >= window_end {
            net_trace!(
                "reassembler: dropping substring at {} outside window ending {}",
                first_index,
                window_end
            );
            return;
        }

        if is_last_substring && self.eof_index.is_none() {
            self.eof_index = Some(first_index + data.len() as u64);
        }

        let begin = first_index.max(self.first_unassembled);
        let end = (first_index + data.len() as u64).min(window_end);
        if end > begin {
            let clipped = &data[(begin - first_index) as usize..(end - first_index) as usize];
            self.store(begin, clipped.to_vec());
        }

        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.first_unassembled {
                break;
            }
            let bytes = entry.remove();
            self.bytes_pending -= bytes.len() as u64;
            self.first_unassembled += bytes.len() as u64;
            let accepted = self.output.writer().push(&bytes);
            debug_assert_eq!(accepted, bytes.len());
        }

        if self.eof_index.is_some_and(|eof| self.first_unassembled >= eof) {
            self.output.writer().close();
        }
    }

    /// Total number of buffered, not-yet-contiguous bytes.
    pub fn bytes_pending(&self) -> u64 {
        self.bytes_pending
    }

    /// The output stream.
    pub fn stream(&self) -> &ByteStream {
        &self.output
    }

    /// Mutable access to the output stream, for the owning receiver.
    pub fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    /// Read end of the output stream.
    pub fn reader(&mut self) -> Reader<'_> {
        self.output.reader()
    }

    // Insert `[begin, begin + bytes.len())` into the store, merging with any
    // interval it overlaps or abuts. Overlap bytes may survive from either
    // copy; a TCP peer sends consistent bytes in both.
    fn store(&mut self, mut begin: u64, mut bytes: Vec<u8>) {
        let mut end = begin + bytes.len() as u64;

        if let Some((&prev_begin, prev_data)) = self.pending.range(..=begin).next_back() {
            let prev_end = prev_begin + prev_data.len() as u64;
            if prev_end >= end {
                return;
            }
            if prev_end >= begin {
                let overlap = (prev_end - begin) as usize;
                let mut merged = self.pending.remove(&prev_begin).unwrap();
                self.bytes_pending -= merged.len() as u64;
                merged.extend_from_slice(&bytes[overlap..]);
                begin = prev_begin;
                bytes = merged;
                end = begin + bytes.len() as u64;
            }
        }

        while let Some((&next_begin, _)) = self.pending.range(begin..).next() {
            if next_begin > end {
                break;
            }
            let next_data = self.pending.remove(&next_begin).unwrap();
            self.bytes_pending -= next_data.len() as u64;
            let next_end = next_begin + next_data.len() as u64;
            if next_end > end {
                bytes.extend_from_slice(&next_data[(end - next_begin) as usize..]);
                end = next_end;
            }
        }

        self.bytes_pending += bytes.len() as u64;
        self.pending.insert(begin, bytes);
    }
}
