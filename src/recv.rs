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

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

use crate::error::ServerError;

/// Reads at least one byte into `buf`. A read of 0 is the orderly peer
/// close.
#[inline]
pub(crate) async fn read_some<S>(
  stream: &mut S,
  buf: &mut [u8],
) -> Result<usize, ServerError>
where
  S: AsyncRead + Unpin,
{
  let nread = stream.read(buf).await?;
  if nread == 0 {
    return Err(ServerError::UnexpectedEOF);
  }
  Ok(nread)
}

/// Fills `buf` completely, looping on short reads.
pub(crate) async fn read_full<S>(
  stream: &mut S,
  buf: &mut [u8],
) -> Result<(), ServerError>
where
  S: AsyncRead + Unpin,
{
  let mut filled = 0;
  while filled < buf.len() {
    filled += read_some(stream, &mut buf[filled..]).await?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn read_full_loops_until_complete() {
    let mut stream: &[u8] = b"abcdef";
    let mut buf = [0u8; 4];
    read_full(&mut stream, &mut buf).await.unwrap();
    assert_eq!(&buf, b"abcd");
    assert_eq!(stream, b"ef");
  }

  #[tokio::test]
  async fn eof_is_reported() {
    let mut stream: &[u8] = b"ab";
    let mut buf = [0u8; 4];
    let err = read_full(&mut stream, &mut buf).await.unwrap_err();
    assert!(matches!(err, ServerError::UnexpectedEOF));
  }
}
