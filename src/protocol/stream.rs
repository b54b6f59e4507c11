//! Streaming byte accumulator
//!
//! Socket reads arrive as arbitrary chunks. [`StreamAccumulator`] keeps them
//! in arrival order and only merges chunks when a caller needs a contiguous
//! view that spans a chunk boundary, and then only the head chunks required.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use super::{WireError, WireResult};

/// Ordered queue of received byte chunks
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    chunks: VecDeque<Bytes>,
    /// Always equal to the sum of the chunk lengths
    length: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the tail. Empty chunks are ignored.
    pub fn add(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.length += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Total buffered bytes
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of chunks currently queued
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.length = 0;
    }

    /// View the first `n` bytes without consuming them
    pub fn peek(&mut self, n: usize) -> WireResult<&[u8]> {
        self.slice(0, n)
    }

    /// Contiguous view of `[start, end)` without consuming anything
    pub fn slice(&mut self, start: usize, end: usize) -> WireResult<&[u8]> {
        if end > self.length {
            return Err(WireError::insufficient(end, self.length));
        }
        if start > end {
            return Err(WireError::InvalidRange { start, end });
        }
        if end == 0 {
            return Ok(&[]);
        }

        self.merge_head(end);
        Ok(&self.chunks[0][start..end])
    }

    /// Remove and return the first `n` bytes
    pub fn consume(&mut self, n: usize) -> WireResult<Bytes> {
        if n > self.length {
            return Err(WireError::insufficient(n, self.length));
        }
        if n == 0 {
            return Ok(Bytes::new());
        }

        self.merge_head(n);
        self.length -= n;

        let head = &mut self.chunks[0];
        if head.len() == n {
            Ok(self.chunks.pop_front().unwrap_or_default())
        } else {
            Ok(head.split_to(n))
        }
    }

    /// Check the buffered tail against `suffix` without merging chunks
    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        if suffix.len() > self.length {
            return false;
        }

        let mut remaining = suffix;
        for chunk in self.chunks.iter().rev() {
            if remaining.is_empty() {
                break;
            }
            let take = remaining.len().min(chunk.len());
            let (rest, tail) = remaining.split_at(remaining.len() - take);
            if chunk[chunk.len() - take..] != *tail {
                return false;
            }
            remaining = rest;
        }

        true
    }

    /// Make the head chunk at least `n` bytes long. Caller guarantees
    /// `n <= self.length`.
    fn merge_head(&mut self, n: usize) {
        let head_len = self.chunks.front().map_or(0, Bytes::len);
        if head_len >= n {
            return;
        }

        let mut merged = BytesMut::with_capacity(n);
        while merged.len() < n {
            match self.chunks.pop_front() {
                Some(chunk) => merged.extend_from_slice(&chunk),
                None => break,
            }
        }

        self.chunks.push_front(merged.freeze());
    }
}
