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

//! _fastserve_ is a minimal, fast HTTP/1.1 and WebSocket server core.
//!
//! It covers the byte-level hot path of a multi-threaded server
//! runtime: incremental request parsing over a reusable per-worker
//! buffer with zero-copy views, WebSocket frame reading with
//! continuation reassembly and unmasking, the opening handshake, and
//! response/frame encoding. The accept/poll loop, socket registry,
//! timers and TLS stay with the embedder: it hands the core a ready
//! stream plus the connection's [`ConnectionSlot`] and sends/closes
//! sockets on the core's behalf.
//!
//! # Example
//!
//! ```
//! use fastserve::{HttpReader, Shutdown, reply};
//! use tokio::net::TcpStream;
//! use anyhow::Result;
//!
//! async fn handle(socket: &mut TcpStream) -> Result<()> {
//!   let shutdown = Shutdown::new();
//!   let mut http = HttpReader::new();
//!
//!   let request = http.read_request(socket, &shutdown).await?;
//!   assert_eq!(request.method(), b"GET");
//!
//!   reply(socket, 200, &[], b"Hello world!").await?;
//!   Ok(())
//! }
//! ```
//!
//! ## WebSocket messages
//!
//! [`WsReader::read_message`] always returns whole messages: frames of
//! a fragmented message are reassembled into the reader's buffer and
//! unmasked frame by frame, each with its own key.
//!
//! ```
//! use fastserve::{OpCode, Shutdown, WsReader, WsWriter};
//! use tokio::net::TcpStream;
//! use anyhow::Result;
//!
//! async fn echo(socket: &mut TcpStream) -> Result<()> {
//!   let shutdown = Shutdown::new();
//!   let mut reader = WsReader::new();
//!   let mut writer = WsWriter::new();
//!
//!   loop {
//!     let message = reader.read_message(socket, &shutdown).await?;
//!     match message.opcode {
//!       OpCode::Close => break,
//!       OpCode::Text => {
//!         writer.write_text(socket, message.payload, &shutdown).await?;
//!       }
//!       OpCode::Binary => {
//!         writer.write_binary(socket, message.payload, &shutdown).await?;
//!       }
//!       _ => {}
//!     }
//!   }
//!   Ok(())
//! }
//! ```
//!
//! ## HTTP upgrades
//!
//! [`server_upgrade`] runs the opening handshake and re-tags the slot
//! so the event loop routes the next readable event to the message
//! reader.
//!
//! ```
//! use fastserve::{ConnectionSlot, HttpReader, Shutdown, server_upgrade};
//! use tokio::net::TcpStream;
//! use anyhow::Result;
//!
//! async fn upgrade(
//!   socket: &mut TcpStream,
//!   slot: &ConnectionSlot,
//! ) -> Result<()> {
//!   let shutdown = Shutdown::new();
//!   let mut http = HttpReader::new();
//!   server_upgrade(socket, &mut http, slot, &shutdown, |request| {
//!     request.uri() == b"/ws"
//!   })
//!   .await?;
//!   Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod buffer;
mod dispatch;
mod error;
mod frame;
/// Server-side opening handshake.
pub mod handshake;
/// Header-block extraction.
pub mod headers;
mod mask;
mod recv;
mod request;
mod response;
mod shutdown;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use bytes::BytesMut;
use tracing::warn;

pub use crate::buffer::ByteBuffer;
pub use crate::dispatch::ConnectionSlot;
pub use crate::dispatch::DispatchTable;
pub use crate::dispatch::HandlerKind;
pub use crate::error::ServerError;
pub use crate::frame::is_control;
pub use crate::frame::OpCode;
pub use crate::handshake::accept_key;
pub use crate::handshake::server_upgrade;
pub use crate::headers::DEFAULT_MAX_HEADER_SIZE;
pub use crate::mask::unmask;
pub use crate::request::HttpReader;
pub use crate::request::Request;
pub use crate::request::RequestView;
pub use crate::request::DEFAULT_MAX_REQUEST_SIZE;
pub use crate::response::reply;
pub use crate::response::reply_code;
pub use crate::shutdown::Shutdown;

use crate::frame::FrameHeader;

/// Cap on a single WebSocket message, summed across all of its frames.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100_000;

/// One logical message, reassembled from one or more frames.
///
/// `opcode` is the first frame's opcode; the payload borrows the
/// reader's buffer and stays valid for the duration of the application
/// callback.
#[derive(Debug)]
pub struct Message<'a> {
  pub opcode: OpCode,
  pub payload: &'a [u8],
}

/// Reads client frames off a stream and reassembles them into whole,
/// unmasked messages.
///
/// Owns the worker's payload accumulator; the buffer is reset at the
/// start of every read cycle and reused across messages.
pub struct WsReader {
  buffer: ByteBuffer,
}

impl WsReader {
  pub fn new() -> Self {
    Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
  }

  /// A reader whose buffer caps messages at `max` bytes.
  pub fn with_max_message_size(max: usize) -> Self {
    Self {
      buffer: ByteBuffer::new(max),
    }
  }

  /// Reads one logical message.
  ///
  /// Frames accumulate until one arrives with FIN set; each frame's
  /// payload is unmasked with that frame's key as soon as it is
  /// complete. A `Close` frame ends the message immediately: the
  /// caller must not read further, and is expected to close the socket
  /// and notify its connection-lost handler. Text payloads are
  /// validated as UTF-8 once assembled.
  pub async fn read_message<'a, S>(
    &'a mut self,
    stream: &mut S,
    shutdown: &Shutdown,
  ) -> Result<Message<'a>, ServerError>
  where
    S: AsyncRead + Unpin,
  {
    self.buffer.reset();
    let mut message_opcode: Option<OpCode> = None;

    loop {
      shutdown.check()?;
      let header = Self::read_frame_header(stream).await?;

      // A close discards any partial message collected so far.
      if header.opcode == OpCode::Close {
        self.buffer.reset();
      }
      if header.length > self.buffer.capacity() - self.buffer.len() {
        warn!(
          length = header.length,
          accumulated = self.buffer.len(),
          "websocket message over the maximum message size"
        );
        return Err(ServerError::MessageTooLarge);
      }

      let start = self.buffer.len();
      recv::read_full(stream, &mut self.buffer.unfilled()[..header.length])
        .await?;
      self.buffer.advance(header.length);
      shutdown.check()?;

      if let Some(mask) = header.mask {
        mask::unmask(&mut self.buffer.as_mut_slice()[start..], mask);
      }

      if header.opcode == OpCode::Close {
        message_opcode = Some(OpCode::Close);
        break;
      }
      if message_opcode.is_none() {
        message_opcode = Some(header.opcode);
      }
      if header.fin {
        break;
      }
    }

    let opcode = message_opcode.unwrap_or(OpCode::Close);
    if opcode == OpCode::Text && !utf8_valid(self.buffer.as_slice()) {
      return Err(ServerError::InvalidUTF8);
    }

    Ok(Message {
      opcode,
      payload: self.buffer.as_slice(),
    })
  }

  async fn read_frame_header<S>(
    stream: &mut S,
  ) -> Result<FrameHeader, ServerError>
  where
    S: AsyncRead + Unpin,
  {
    let mut head = [0u8; 2];
    recv::read_full(stream, &mut head).await?;

    let fin = head[0] & 0b10000000 != 0;
    if head[0] & 0b01110000 != 0 {
      return Err(ServerError::ReservedBitsNotZero);
    }
    let opcode = OpCode::try_from(head[0] & 0b00001111)?;
    if frame::is_control(opcode) && !fin {
      return Err(ServerError::ControlFrameFragmented);
    }
    let masked = head[1] & 0b10000000 != 0;

    let length_code = head[1] & 0x7F;
    let length: usize = match length_code {
      126 => {
        let mut extended = [0u8; 2];
        recv::read_full(stream, &mut extended).await?;
        u16::from_be_bytes(extended) as usize
      }
      127 => {
        let mut extended = [0u8; 8];
        recv::read_full(stream, &mut extended).await?;
        usize::try_from(u64::from_be_bytes(extended))
          .map_err(|_| ServerError::MessageTooLarge)?
      }
      _ => usize::from(length_code),
    };

    let mask = if masked {
      let mut key = [0u8; 4];
      recv::read_full(stream, &mut key).await?;
      Some(key)
    } else {
      None
    };

    Ok(FrameHeader {
      fin,
      opcode,
      mask,
      length,
    })
  }
}

impl Default for WsReader {
  fn default() -> Self {
    Self::new()
  }
}

/// Encodes and writes server-to-client frames.
///
/// Frames go out with FIN set and no mask, header first, then the
/// payload; short writes loop until drained.
pub struct WsWriter {
  buffer: BytesMut,
}

impl WsWriter {
  pub fn new() -> Self {
    Self {
      buffer: BytesMut::with_capacity(1024),
    }
  }

  /// Writes one text frame.
  pub async fn write_text<S>(
    &mut self,
    stream: &mut S,
    payload: &[u8],
    shutdown: &Shutdown,
  ) -> Result<(), ServerError>
  where
    S: AsyncWrite + Unpin,
  {
    self
      .write_frame(stream, OpCode::Text, payload, shutdown)
      .await
  }

  /// Writes one binary frame.
  pub async fn write_binary<S>(
    &mut self,
    stream: &mut S,
    payload: &[u8],
    shutdown: &Shutdown,
  ) -> Result<(), ServerError>
  where
    S: AsyncWrite + Unpin,
  {
    self
      .write_frame(stream, OpCode::Binary, payload, shutdown)
      .await
  }

  async fn write_frame<S>(
    &mut self,
    stream: &mut S,
    opcode: OpCode,
    payload: &[u8],
    shutdown: &Shutdown,
  ) -> Result<(), ServerError>
  where
    S: AsyncWrite + Unpin,
  {
    shutdown.check()?;
    self.buffer.clear();
    frame::encode_header(&mut self.buffer, opcode, payload.len());
    stream.write_all(&self.buffer).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    shutdown.check()?;
    Ok(())
  }
}

impl Default for WsWriter {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(feature = "simd")]
fn utf8_valid(payload: &[u8]) -> bool {
  simdutf8::basic::from_utf8(payload).is_ok()
}

#[cfg(not(feature = "simd"))]
fn utf8_valid(payload: &[u8]) -> bool {
  std::str::from_utf8(payload).is_ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  // The RFC 6455 section 5.7 single-frame masked "Hello".
  const HELLO_FRAME: &[u8] = &[
    0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
  ];

  #[tokio::test]
  async fn masked_text_frame() {
    let shutdown = Shutdown::new();
    let mut reader = WsReader::new();
    let mut stream = HELLO_FRAME;
    let message = reader.read_message(&mut stream, &shutdown).await.unwrap();
    assert_eq!(message.opcode, OpCode::Text);
    assert_eq!(message.payload, b"Hello");
  }

  #[tokio::test]
  async fn reserved_bits_fail() {
    let shutdown = Shutdown::new();
    let mut reader = WsReader::new();
    let mut stream: &[u8] = &[0xC1, 0x80, 0, 0, 0, 0];
    let err =
      reader.read_message(&mut stream, &shutdown).await.unwrap_err();
    assert!(matches!(err, ServerError::ReservedBitsNotZero));
  }

  #[tokio::test]
  async fn shutdown_abandons_the_read() {
    let shutdown = Shutdown::new();
    shutdown.trigger();
    let mut reader = WsReader::new();
    let mut stream = HELLO_FRAME;
    let err =
      reader.read_message(&mut stream, &shutdown).await.unwrap_err();
    assert!(matches!(err, ServerError::Shutdown));
  }
}
