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

//! Incremental HTTP/1.1 request reading.
//!
//! Requests are parsed in place: the reader fills its scratch buffer
//! straight off the stream and exposes offset-based views over it, so
//! the hot path performs no allocation and no copies.

use std::collections::HashMap;

use tokio::io::AsyncRead;

use crate::buffer::ByteBuffer;
use crate::error::ServerError;
use crate::headers;
use crate::recv;
use crate::shutdown::Shutdown;

/// Cap on a single HTTP request, header block and body included.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 100_000;

// The shortest byte count a request line can be parsed out of.
const MIN_REQUEST_LEN: usize = 13;

const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Byte offsets over the request buffer.
///
/// After a successful parse,
/// `0 < method_len < uri_start <= uri_start + uri_len < body_start <= n`
/// holds, with `body_start` pointing one past the `CR LF CR LF`
/// terminator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestView {
  method_len: usize,
  uri_start: usize,
  uri_len: usize,
  body_start: Option<usize>,
}

/// Decides whether the full header block has arrived.
///
/// Returns the body offset (one past the terminator). The scan starts
/// four bytes before the previously known length so a terminator
/// spanning two reads is never missed, regardless of how the stream is
/// split across reads.
pub(crate) fn find_header_end(buf: &[u8], prev_len: usize) -> Option<usize> {
  if buf.len() < TERMINATOR.len() {
    return None;
  }
  if &buf[buf.len() - TERMINATOR.len()..] == TERMINATOR {
    return Some(buf.len());
  }
  let start = prev_len.saturating_sub(TERMINATOR.len());
  buf[start..]
    .windows(TERMINATOR.len())
    .position(|window| window == TERMINATOR)
    .map(|at| start + at + TERMINATOR.len())
}

fn parse_request_line(
  buf: &[u8],
) -> Result<(usize, usize, usize), ServerError> {
  if buf.len() < MIN_REQUEST_LEN {
    return Err(ServerError::RequestTooShort);
  }
  let method_len = buf
    .iter()
    .position(|&b| b == b' ')
    .ok_or(ServerError::MalformedRequestLine)?;
  if method_len == 0 {
    return Err(ServerError::MalformedRequestLine);
  }
  let uri_start = method_len + 1;
  let uri_len = buf[uri_start..]
    .iter()
    .position(|&b| b == b' ')
    .ok_or(ServerError::MalformedRequestLine)?;
  if uri_len == 0 {
    return Err(ServerError::MalformedRequestLine);
  }
  // The sole version check: `H` and the final `1` of `HTTP/1.1`.
  // Everything else is rejected by closing the socket.
  let version = uri_start + uri_len + 1;
  if version + 7 >= buf.len()
    || buf[version] != b'H'
    || buf[version + 7] != b'1'
  {
    return Err(ServerError::UnsupportedVersion);
  }
  Ok((method_len, uri_start, uri_len))
}

/// Reads HTTP/1.1 requests off a stream, one per call.
///
/// Owns the worker's scratch buffer; the buffer is reset at the start
/// of every read cycle and stays valid for the duration of the
/// application callback.
pub struct HttpReader {
  buffer: ByteBuffer,
  view: RequestView,
}

impl HttpReader {
  pub fn new() -> Self {
    Self::with_max_request_size(DEFAULT_MAX_REQUEST_SIZE)
  }

  /// A reader whose scratch buffer caps requests at `max` bytes.
  pub fn with_max_request_size(max: usize) -> Self {
    Self {
      buffer: ByteBuffer::new(max),
      view: RequestView::default(),
    }
  }

  /// Reads one complete request into the scratch buffer.
  ///
  /// Loops on the transport until the `CR LF CR LF` terminator arrives,
  /// parses the request line, then keeps reading until `Content-Length`
  /// body bytes are in. The returned view borrows the buffer; it stays
  /// valid until the next call.
  ///
  /// On a malformed request the caller must close the socket and must
  /// not invoke the application handler.
  pub async fn read_request<'a, S>(
    &'a mut self,
    stream: &mut S,
    shutdown: &Shutdown,
  ) -> Result<Request<'a>, ServerError>
  where
    S: AsyncRead + Unpin,
  {
    self.buffer.reset();
    self.view = RequestView::default();

    let body_start = loop {
      shutdown.check()?;
      if self.buffer.is_full() {
        return Err(ServerError::RequestTooLarge);
      }
      let prev_len = self.buffer.len();
      let nread = recv::read_some(stream, self.buffer.unfilled()).await?;
      self.buffer.advance(nread);
      shutdown.check()?;
      if let Some(body_start) =
        find_header_end(self.buffer.as_slice(), prev_len)
      {
        break body_start;
      }
    };

    let (method_len, uri_start, uri_len) =
      parse_request_line(self.buffer.as_slice())?;
    self.view = RequestView {
      method_len,
      uri_start,
      uri_len,
      body_start: Some(body_start),
    };

    let content_length =
      headers::content_length(&self.buffer.as_slice()[..body_start]);
    let expected = body_start + content_length;
    if expected > self.buffer.capacity() {
      return Err(ServerError::RequestTooLarge);
    }
    while self.buffer.len() < expected {
      shutdown.check()?;
      let need = expected - self.buffer.len();
      let nread =
        recv::read_some(stream, &mut self.buffer.unfilled()[..need]).await?;
      self.buffer.advance(nread);
    }
    shutdown.check()?;

    Ok(Request {
      buf: self.buffer.as_slice(),
      view: self.view,
    })
  }
}

impl Default for HttpReader {
  fn default() -> Self {
    Self::new()
  }
}

/// Zero-copy view over a parsed request.
///
/// All accessors return slices into the reader's scratch buffer.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
  buf: &'a [u8],
  view: RequestView,
}

impl<'a> Request<'a> {
  pub fn method(&self) -> &'a [u8] {
    &self.buf[..self.view.method_len]
  }

  pub fn uri(&self) -> &'a [u8] {
    &self.buf[self.view.uri_start..][..self.view.uri_len]
  }

  pub fn body(&self) -> &'a [u8] {
    match self.view.body_start {
      Some(body_start) => &self.buf[body_start..],
      None => &[],
    }
  }

  /// The header lines: everything after the request line, up to and
  /// including the terminator.
  pub fn header_block(&self) -> &'a [u8] {
    let Some(body_start) = self.view.body_start else {
      return &[];
    };
    // Request line is `METHOD SP URI SP HTTP/1.1 CR LF`; headers start
    // 11 bytes past the end of the URI.
    let start = (self.view.uri_start + self.view.uri_len + 11).min(body_start);
    &self.buf[start..body_start]
  }

  pub fn content_length(&self) -> usize {
    headers::content_length(self.header_block())
  }

  /// Fixed-field extraction over the header block. See
  /// [`headers::extract_fields`].
  pub fn header_values(&self, names: &[&str], slots: &mut [String]) {
    headers::extract_fields(self.header_block(), names, slots);
  }

  /// All headers, keyed by lowercased field name.
  pub fn headers(&self) -> HashMap<String, String> {
    let mut map = HashMap::new();
    headers::extract_all(self.header_block(), &mut map);
    map
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const S1: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";

  #[test]
  fn terminator_is_partition_invariant() {
    // Every split of the stream into reads reports the same body
    // offset: one past the terminator.
    let expected = S1.len();
    for split in 1..S1.len() {
      let mut reported = None;
      let mut prev_len = 0;
      for len in [split, S1.len()] {
        if let Some(at) = find_header_end(&S1[..len], prev_len) {
          reported = Some(at);
          break;
        }
        prev_len = len;
      }
      assert_eq!(reported, Some(expected), "split at {split}");
    }
  }

  #[test]
  fn terminator_absent() {
    assert_eq!(find_header_end(b"GET / HTTP/1.1\r\nHost", 0), None);
    assert_eq!(find_header_end(b"\r\n\r", 0), None);
  }

  #[test]
  fn terminator_mid_buffer() {
    let buf = b"a\r\n\r\nbody";
    assert_eq!(find_header_end(buf, 0), Some(5));
  }

  #[test]
  fn request_line_offsets() {
    let (method_len, uri_start, uri_len) = parse_request_line(S1).unwrap();
    assert_eq!(method_len, 3);
    assert_eq!(uri_start, 4);
    assert_eq!(uri_len, 1);
  }

  #[test]
  fn request_line_rejections() {
    assert!(matches!(
      parse_request_line(b"GET /\r\n\r\n"),
      Err(ServerError::RequestTooShort)
    ));
    assert!(matches!(
      parse_request_line(b"NO-SPACES-ANYWHERE-AT-ALL"),
      Err(ServerError::MalformedRequestLine)
    ));
    assert!(matches!(
      parse_request_line(b"GET / SPDY/3.0\r\n\r\n"),
      Err(ServerError::UnsupportedVersion)
    ));
    assert!(matches!(
      parse_request_line(b"GET / HTTP/1.0\r\n\r\n"),
      Err(ServerError::UnsupportedVersion)
    ));
  }

  #[tokio::test]
  async fn reads_a_minimal_get() {
    let shutdown = Shutdown::new();
    let mut http = HttpReader::new();
    let mut stream = S1;
    let request = http.read_request(&mut stream, &shutdown).await.unwrap();
    assert_eq!(request.method(), b"GET");
    assert_eq!(request.uri(), b"/");
    assert_eq!(request.body(), b"");
    assert_eq!(request.headers()["host"], "x");
  }

  #[tokio::test]
  async fn buffer_is_reused_across_requests() {
    let shutdown = Shutdown::new();
    let mut http = HttpReader::new();
    for uri in [&b"GET /a HTTP/1.1\r\n\r\n"[..], &b"GET /b HTTP/1.1\r\n\r\n"[..]]
    {
      let mut stream = uri;
      let request = http.read_request(&mut stream, &shutdown).await.unwrap();
      assert_eq!(request.uri(), &uri[4..6]);
    }
  }

  #[tokio::test]
  async fn oversized_header_block_is_rejected() {
    let shutdown = Shutdown::new();
    let mut http = HttpReader::with_max_request_size(32);
    let mut stream: &[u8] =
      b"GET /way-too-long-for-the-buffer HTTP/1.1\r\nHost: x\r\n\r\n";
    let err = http.read_request(&mut stream, &shutdown).await.unwrap_err();
    assert!(matches!(err, ServerError::RequestTooLarge));
  }

  #[tokio::test]
  async fn oversized_body_is_rejected() {
    let shutdown = Shutdown::new();
    let mut http = HttpReader::with_max_request_size(64);
    let mut stream: &[u8] =
      b"POST /s HTTP/1.1\r\nContent-Length: 4000\r\n\r\n";
    let err = http.read_request(&mut stream, &shutdown).await.unwrap_err();
    assert!(matches!(err, ServerError::RequestTooLarge));
  }

  #[tokio::test]
  async fn shutdown_abandons_the_read() {
    let shutdown = Shutdown::new();
    shutdown.trigger();
    let mut http = HttpReader::new();
    let mut stream = S1;
    let err = http.read_request(&mut stream, &shutdown).await.unwrap_err();
    assert!(matches!(err, ServerError::Shutdown));
  }
}
