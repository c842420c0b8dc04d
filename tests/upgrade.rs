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

use anyhow::Result;
use fastserve::server_upgrade;
use fastserve::ConnectionSlot;
use fastserve::HandlerKind;
use fastserve::HttpReader;
use fastserve::OpCode;
use fastserve::ServerError;
use fastserve::Shutdown;
use fastserve::WsReader;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;

const UPGRADE_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
Host: server.example.com\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n";

async fn read_response(
  client: &mut tokio::io::DuplexStream,
) -> Result<String> {
  let mut buf = vec![0u8; 512];
  let nread = client.read(&mut buf).await?;
  Ok(String::from_utf8(buf[..nread].to_vec())?)
}

// S4: the RFC 6455 sample nonce yields the documented accept key, and
// the 101 carries exactly the three upgrade headers.
#[tokio::test]
async fn switching_protocols_exchange() -> Result<()> {
  let (mut client, mut server) = tokio::io::duplex(1024);
  client.write_all(UPGRADE_REQUEST).await?;

  let shutdown = Shutdown::new();
  let slot = ConnectionSlot::new(7, 9001, HandlerKind::WsUpgrade);
  let mut http = HttpReader::new();
  server_upgrade(&mut server, &mut http, &slot, &shutdown, |request| {
    request.uri() == b"/chat"
  })
  .await?;

  assert_eq!(slot.kind(), HandlerKind::WsMessage);

  let response = read_response(&mut client).await?;
  assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
  assert!(response
    .contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
  assert!(response.contains("Connection: Upgrade\r\n"));
  assert!(response.contains("Upgrade: webSocket\r\n"));
  assert!(response.ends_with("\r\n\r\n"));
  // Status line, three headers, blank line: nothing else.
  assert_eq!(response.matches("\r\n").count(), 5);
  Ok(())
}

// After the exchange the socket carries frames; the re-tagged slot is
// what routes the next readable event to the message reader.
#[tokio::test]
async fn upgraded_socket_reads_frames() -> Result<()> {
  let (mut client, mut server) = tokio::io::duplex(1024);
  client.write_all(UPGRADE_REQUEST).await?;

  let shutdown = Shutdown::new();
  let slot = ConnectionSlot::new(7, 9001, HandlerKind::WsUpgrade);
  let mut http = HttpReader::new();
  server_upgrade(&mut server, &mut http, &slot, &shutdown, |_| true).await?;
  let _ = read_response(&mut client).await?;

  client
    .write_all(&[
      0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
    ])
    .await?;

  assert_eq!(slot.kind(), HandlerKind::WsMessage);
  let mut reader = WsReader::new();
  let message = reader.read_message(&mut server, &shutdown).await?;
  assert_eq!(message.opcode, OpCode::Text);
  assert_eq!(message.payload, b"Hello");
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_upgrade_gets_204_and_lingers() -> Result<()> {
  let (mut client, mut server) = tokio::io::duplex(1024);
  client.write_all(UPGRADE_REQUEST).await?;

  let shutdown = Shutdown::new();
  let slot = ConnectionSlot::new(7, 9001, HandlerKind::WsUpgrade);
  let mut http = HttpReader::new();
  let before = tokio::time::Instant::now();
  let err =
    server_upgrade(&mut server, &mut http, &slot, &shutdown, |_| false)
      .await
      .unwrap_err();

  assert!(matches!(err, ServerError::UpgradeRejected));
  // The linger ran before the error surfaced.
  assert!(before.elapsed() >= std::time::Duration::from_secs(3));
  // The slot was not re-tagged.
  assert_eq!(slot.kind(), HandlerKind::WsUpgrade);

  let response = read_response(&mut client).await?;
  assert_eq!(response, "HTTP/1.1 204 No Content\r\n\r\n");
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_key_gets_204() -> Result<()> {
  let (mut client, mut server) = tokio::io::duplex(1024);
  client
    .write_all(b"GET /chat HTTP/1.1\r\nHost: server.example.com\r\n\r\n")
    .await?;

  let shutdown = Shutdown::new();
  let slot = ConnectionSlot::new(7, 9001, HandlerKind::WsUpgrade);
  let mut http = HttpReader::new();
  let err = server_upgrade(&mut server, &mut http, &slot, &shutdown, |_| {
    panic!("the predicate must not run without a key")
  })
  .await
  .unwrap_err();

  assert!(matches!(err, ServerError::MissingWebSocketKey));
  let response = read_response(&mut client).await?;
  assert_eq!(response, "HTTP/1.1 204 No Content\r\n\r\n");
  Ok(())
}
