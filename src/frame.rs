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

use crate::error::ServerError;

const PAYLOAD_LEN_U16: u8 = 126;
const PAYLOAD_LEN_U64: u8 = 127;

/// Frame opcodes as defined in RFC 6455.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
  Continuation = 0x0,
  Text = 0x1,
  Binary = 0x2,
  Close = 0x8,
  Ping = 0x9,
  Pong = 0xA,
}

impl TryFrom<u8> for OpCode {
  type Error = ServerError;

  #[inline]
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0x0 => Ok(OpCode::Continuation),
      0x1 => Ok(OpCode::Text),
      0x2 => Ok(OpCode::Binary),
      0x8 => Ok(OpCode::Close),
      0x9 => Ok(OpCode::Ping),
      0xA => Ok(OpCode::Pong),
      _ => Err(ServerError::InvalidOpCode(value)),
    }
  }
}

#[inline]
pub fn is_control(opcode: OpCode) -> bool {
  matches!(opcode, OpCode::Close | OpCode::Ping | OpCode::Pong)
}

/// Decoded fields of one frame header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
  pub fin: bool,
  pub opcode: OpCode,
  pub mask: Option<[u8; 4]>,
  pub length: usize,
}

/// Encodes a server-to-client frame header: FIN set, RSV clear, no
/// mask, 7/16/64-bit length field.
pub(crate) fn encode_header(
  out: &mut BytesMut,
  opcode: OpCode,
  length: usize,
) {
  out.extend_from_slice(&[0x80 | opcode as u8]);
  if length < PAYLOAD_LEN_U16 as usize {
    out.extend_from_slice(&[length as u8]);
  } else if length <= u16::MAX as usize {
    out.extend_from_slice(&[PAYLOAD_LEN_U16]);
    out.extend_from_slice(&(length as u16).to_be_bytes());
  } else {
    out.extend_from_slice(&[PAYLOAD_LEN_U64]);
    out.extend_from_slice(&(length as u64).to_be_bytes());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // Test-side decoder for the length field written by `encode_header`.
  fn decode_length(head: &[u8]) -> usize {
    match head[1] & 0x7F {
      126 => u16::from_be_bytes([head[2], head[3]]) as usize,
      127 => u64::from_be_bytes(head[2..10].try_into().unwrap()) as usize,
      n => n as usize,
    }
  }

  #[test]
  fn text_and_binary_first_bytes() {
    let mut out = BytesMut::new();
    encode_header(&mut out, OpCode::Text, 5);
    assert_eq!(&out[..], &[0x81, 0x05]);
    out.clear();
    encode_header(&mut out, OpCode::Binary, 5);
    assert_eq!(&out[..], &[0x82, 0x05]);
  }

  #[test]
  fn length_field_round_trips() {
    for length in [0, 1, 125, 126, 127, 0xFFFF, 0x10000, 20_000_000] {
      let mut out = BytesMut::new();
      encode_header(&mut out, OpCode::Binary, length);
      assert_eq!(decode_length(&out), length, "length {length}");
      // MASK bit is never set on server frames.
      assert_eq!(out[1] & 0x80, 0);
    }
  }

  #[test]
  fn invalid_opcodes_are_rejected() {
    for value in [0x3, 0x7, 0xB, 0xF] {
      assert!(OpCode::try_from(value).is_err());
    }
  }
}
