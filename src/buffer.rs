// Copyright 2023 Divy Srivastava <dj.srivastava23@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Fixed-capacity scratch buffer, one per worker.
///
/// Holds the in-flight request or message payload. The backing storage
/// is allocated once and reused across read cycles via [`reset`];
/// running out of tail space is the request/message-too-large
/// condition, so the buffer never grows.
///
/// [`reset`]: ByteBuffer::reset
pub struct ByteBuffer {
  bytes: Box<[u8]>,
  len: usize,
}

impl ByteBuffer {
  pub fn new(capacity: usize) -> Self {
    Self {
      bytes: vec![0; capacity].into_boxed_slice(),
      len: 0,
    }
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.bytes.len()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.len == self.bytes.len()
  }

  /// Forgets the previous request. Capacity is retained.
  #[inline]
  pub fn reset(&mut self) {
    self.len = 0;
  }

  /// The filled prefix.
  #[inline]
  pub fn as_slice(&self) -> &[u8] {
    &self.bytes[..self.len]
  }

  #[inline]
  pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
    &mut self.bytes[..self.len]
  }

  /// The unfilled tail, to read into.
  #[inline]
  pub(crate) fn unfilled(&mut self) -> &mut [u8] {
    &mut self.bytes[self.len..]
  }

  /// Marks `n` more bytes as filled after a successful read.
  #[inline]
  pub(crate) fn advance(&mut self, n: usize) {
    debug_assert!(self.len + n <= self.bytes.len());
    self.len += n;
  }
}
