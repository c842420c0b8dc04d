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

use bytes::BytesMut;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::error::ServerError;

pub fn reason_phrase(code: u16) -> &'static str {
  match code {
    100 => "Continue",
    101 => "Switching Protocols",
    200 => "OK",
    201 => "Created",
    202 => "Accepted",
    204 => "No Content",
    301 => "Moved Permanently",
    302 => "Found",
    303 => "See Other",
    304 => "Not Modified",
    400 => "Bad Request",
    401 => "Unauthorized",
    403 => "Forbidden",
    404 => "Not Found",
    405 => "Method Not Allowed",
    408 => "Request Timeout",
    411 => "Length Required",
    413 => "Payload Too Large",
    426 => "Upgrade Required",
    429 => "Too Many Requests",
    500 => "Internal Server Error",
    501 => "Not Implemented",
    502 => "Bad Gateway",
    503 => "Service Unavailable",
    _ => "Unknown",
  }
}

/// Formats and sends a full response: status line, the given header
/// lines, `Content-Length`, then the body.
///
/// `Content-Length` is always included (`0` when there is no body).
/// Short writes loop until the buffer is drained or the socket fails;
/// the caller applies [`ServerError::is_benign`] before diagnosing a
/// failure and closes the socket either way.
pub async fn reply<S>(
  stream: &mut S,
  code: u16,
  headers: &[(&str, &str)],
  body: &[u8],
) -> Result<(), ServerError>
where
  S: AsyncWrite + Unpin,
{
  let mut out = BytesMut::with_capacity(128 + body.len());
  push_status_line(&mut out, code);
  for (name, value) in headers {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
  }
  out.extend_from_slice(b"Content-Length: ");
  out.extend_from_slice(body.len().to_string().as_bytes());
  out.extend_from_slice(b"\r\n\r\n");
  out.extend_from_slice(body);
  stream.write_all(&out).await?;
  stream.flush().await?;
  Ok(())
}

/// Sends a bare status line plus `\r\n\r\n`. No headers, no
/// `Content-Length`.
pub async fn reply_code<S>(stream: &mut S, code: u16) -> Result<(), ServerError>
where
  S: AsyncWrite + Unpin,
{
  let mut out = BytesMut::with_capacity(64);
  push_status_line(&mut out, code);
  out.extend_from_slice(b"\r\n");
  stream.write_all(&out).await?;
  stream.flush().await?;
  Ok(())
}

fn push_status_line(out: &mut BytesMut, code: u16) {
  out.extend_from_slice(b"HTTP/1.1 ");
  out.extend_from_slice(code.to_string().as_bytes());
  out.extend_from_slice(b" ");
  out.extend_from_slice(reason_phrase(code).as_bytes());
  out.extend_from_slice(b"\r\n");
}
