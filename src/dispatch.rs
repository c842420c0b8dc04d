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

use std::collections::HashMap;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

/// Which read entry point handles a readable event on a socket.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
  /// Route to the HTTP request reader.
  Http = 0,
  /// Route to the WebSocket opening handshake.
  WsUpgrade = 1,
  /// Route to the WebSocket message reader.
  WsMessage = 2,
}

impl HandlerKind {
  fn from_u8(value: u8) -> HandlerKind {
    match value {
      1 => HandlerKind::WsUpgrade,
      2 => HandlerKind::WsMessage,
      _ => HandlerKind::Http,
    }
  }
}

/// Per-connection routing state, owned by the event loop.
///
/// The core's only mutation is the handler-kind swap after a successful
/// handshake, which is why the tag is atomic: the accept exchange and
/// the first message read may land on different workers.
pub struct ConnectionSlot {
  socket: u64,
  port: u16,
  kind: AtomicU8,
}

impl ConnectionSlot {
  pub fn new(socket: u64, port: u16, kind: HandlerKind) -> Self {
    Self {
      socket,
      port,
      kind: AtomicU8::new(kind as u8),
    }
  }

  /// The event loop's opaque socket handle.
  pub fn socket(&self) -> u64 {
    self.socket
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn kind(&self) -> HandlerKind {
    HandlerKind::from_u8(self.kind.load(Ordering::Acquire))
  }

  pub fn set_kind(&self, kind: HandlerKind) {
    self.kind.store(kind as u8, Ordering::Release);
  }
}

/// Port-to-handler map, populated at server startup and consulted by
/// the event loop on every readable event.
#[derive(Default)]
pub struct DispatchTable {
  ports: HashMap<u16, HandlerKind>,
}

impl DispatchTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, port: u16, kind: HandlerKind) {
    self.ports.insert(port, kind);
  }

  pub fn kind_for_port(&self, port: u16) -> Option<HandlerKind> {
    self.ports.get(&port).copied()
  }

  /// Resolves the entry point for a readable event on `slot`.
  ///
  /// A slot re-tagged during the handshake takes precedence over its
  /// port's default; otherwise the port decides.
  pub fn resolve(&self, slot: &ConnectionSlot) -> Option<HandlerKind> {
    match slot.kind() {
      HandlerKind::WsMessage => Some(HandlerKind::WsMessage),
      _ => self.kind_for_port(slot.port()),
    }
  }
}
