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

use thiserror::Error;

/// Errors surfaced while reading requests or frames.
///
/// None of these outlive the current read cycle: the caller closes the
/// socket where the policy requires it and returns the worker to the
/// pool.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
  /// A complete header block arrived with fewer bytes than the shortest
  /// possible request line.
  #[error("Request shorter than a minimal request line")]
  RequestTooShort,
  #[error("Malformed request line")]
  MalformedRequestLine,
  #[error("Expected an HTTP/1.1 request")]
  UnsupportedVersion,
  #[error("Request exceeds the maximum request size")]
  RequestTooLarge,
  #[error("Message exceeds the maximum message size")]
  MessageTooLarge,
  #[error("Invalid opcode: {0}")]
  InvalidOpCode(u8),
  #[error("Reserved bits are not zero")]
  ReservedBitsNotZero,
  #[error("Control frame must not be fragmented")]
  ControlFrameFragmented,
  #[error("Invalid UTF-8 in text message")]
  InvalidUTF8,
  #[error("Missing Sec-WebSocket-Key header")]
  MissingWebSocketKey,
  #[error("Upgrade rejected by the application")]
  UpgradeRejected,
  /// The peer closed the connection (a read returned 0).
  #[error("Unexpected EOF")]
  UnexpectedEOF,
  /// The cooperative shutdown flag was observed between reads.
  #[error("Shutdown in progress")]
  Shutdown,
  #[error(transparent)]
  IoError(#[from] std::io::Error),
}

// The socket is already being torn down elsewhere when send/recv fail
// with one of these: ENOENT, EBADF, EPIPE, ECONNRESET.
const BENIGN_ERRNOS: [i32; 4] = [2, 9, 32, 104];

impl ServerError {
  /// Whether the error should be absorbed without a diagnostic.
  ///
  /// Peer closes and cooperative shutdown are silent by policy;
  /// transport errors are silent only for the benign errno set.
  pub fn is_benign(&self) -> bool {
    match self {
      ServerError::UnexpectedEOF | ServerError::Shutdown => true,
      ServerError::IoError(err) => err
        .raw_os_error()
        .map_or(false, |errno| BENIGN_ERRNOS.contains(&errno)),
      _ => false,
    }
  }
}
