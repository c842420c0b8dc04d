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

//! Server side of the WebSocket opening handshake.

use std::time::Duration;

use base64::prelude::*;
use sha1::Digest;
use sha1::Sha1;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::dispatch::ConnectionSlot;
use crate::dispatch::HandlerKind;
use crate::error::ServerError;
use crate::request::HttpReader;
use crate::request::Request;
use crate::response::reply_code;
use crate::shutdown::Shutdown;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

// Rejected upgrades answer 204 and hold the socket open briefly before
// the caller closes it, as crude rate limiting of repeated attempts.
const REJECT_LINGER: Duration = Duration::from_secs(3);

/// Computes the `Sec-WebSocket-Accept` value for a client key: the
/// base64 encoding of the 20 raw SHA-1 bytes of the key concatenated
/// with the protocol GUID.
pub fn accept_key(key: &str) -> String {
  let mut sha1 = Sha1::new();
  sha1.update(key.as_bytes());
  sha1.update(WS_GUID.as_bytes());
  BASE64_STANDARD.encode(sha1.finalize())
}

/// Runs the upgrade exchange on a socket routed to [`HandlerKind::WsUpgrade`].
///
/// Reads the HTTP request, looks up `Sec-WebSocket-Key`, asks the
/// application `predicate` whether to accept, and emits the
/// `101 Switching Protocols` response carrying the accept key. On
/// success the slot is re-tagged so the next readable event on this
/// socket routes to the message reader; the re-tag is the only slot
/// mutation the core performs.
///
/// A missing key or a rejecting predicate answers `204` and lingers
/// before returning the error; the caller closes the socket and must
/// not invoke the application handler.
pub async fn server_upgrade<S, F>(
  stream: &mut S,
  http: &mut HttpReader,
  slot: &ConnectionSlot,
  shutdown: &Shutdown,
  predicate: F,
) -> Result<(), ServerError>
where
  S: AsyncRead + AsyncWrite + Unpin,
  F: FnOnce(&Request<'_>) -> bool,
{
  let request = http.read_request(stream, shutdown).await?;

  let mut slots = [String::new()];
  request.header_values(&[SEC_WEBSOCKET_KEY], &mut slots);
  let [key] = slots;

  if key.is_empty() {
    debug!("rejecting websocket upgrade: missing Sec-WebSocket-Key");
    reject(stream).await?;
    return Err(ServerError::MissingWebSocketKey);
  }
  if !predicate(&request) {
    debug!("rejecting websocket upgrade: refused by the application");
    reject(stream).await?;
    return Err(ServerError::UpgradeRejected);
  }

  let response = format!(
    "HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: {}\r\nConnection: Upgrade\r\nUpgrade: webSocket\r\n\r\n",
    accept_key(&key)
  );
  stream.write_all(response.as_bytes()).await?;
  stream.flush().await?;

  slot.set_kind(HandlerKind::WsMessage);
  Ok(())
}

async fn reject<S>(stream: &mut S) -> Result<(), ServerError>
where
  S: AsyncWrite + Unpin,
{
  reply_code(stream, 204).await?;
  tokio::time::sleep(REJECT_LINGER).await;
  Ok(())
}
