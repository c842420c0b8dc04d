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

//! Header-block extraction.
//!
//! One state-machine walk over the header block, two front ends: a
//! fixed field list filling preallocated slots, and a general map sink.
//! Field names are lowercased on ingest, so lookups are
//! case-insensitive.

use std::collections::HashMap;

/// Advisory cap for header-reading helpers. Not enforced by the core.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 10_000;

enum State {
  Name,
  Value,
}

/// Walks `block` and hands each completed `(name, value)` line to
/// `commit`. `commit` returns `false` to stop the walk early.
///
/// `block` is the bytes after the request line, up to and including the
/// `CR LF CR LF` terminator. A single leading space after the colon is
/// dropped; a stray `:` inside the value is preserved; an empty line
/// ends the block.
fn walk(block: &[u8], mut commit: impl FnMut(&str, &str) -> bool) {
  let mut state = State::Name;
  let mut name = String::new();
  let mut value = String::new();
  let mut skip_space = false;
  for &byte in block {
    match state {
      State::Name => match byte {
        b':' => {
          state = State::Value;
          skip_space = true;
        }
        b'\n' => {
          if name.is_empty() {
            return;
          }
          // Line without a colon. Skip it.
          name.clear();
        }
        b'\r' => {}
        _ => name.push(byte.to_ascii_lowercase() as char),
      },
      State::Value => match byte {
        b'\n' => {
          if !commit(&name, &value) {
            return;
          }
          name.clear();
          value.clear();
          state = State::Name;
        }
        b'\r' => {}
        b' ' if skip_space => skip_space = false,
        _ => {
          skip_space = false;
          value.push(byte as char);
        }
      },
    }
  }
}

/// Fills `slots` with the values of the given lowercase field `names`.
///
/// The lists are parallel and small; each line does a linear scan. A
/// repeated field overwrites its slot (last wins), and the walk stops
/// early once every slot has been filled at least once.
pub fn extract_fields(block: &[u8], names: &[&str], slots: &mut [String]) {
  debug_assert_eq!(names.len(), slots.len());
  for slot in slots.iter_mut() {
    slot.clear();
  }
  let mut filled = vec![false; names.len()];
  let mut unfilled = names.len();
  walk(block, |name, value| {
    if let Some(i) = names.iter().position(|&n| n == name) {
      if !filled[i] {
        filled[i] = true;
        unfilled -= 1;
      }
      slots[i].clear();
      slots[i].push_str(value);
    }
    unfilled > 0
  });
}

/// Inserts every header line into `headers`, keyed by the lowercased
/// field name.
pub fn extract_all(block: &[u8], headers: &mut HashMap<String, String>) {
  walk(block, |name, value| {
    headers.insert(name.to_owned(), value.to_owned());
    true
  });
}

/// Dedicated Content-Length fast path.
///
/// Scans `block` for `content-length: ` or `Content-Length: ` and
/// parses the ASCII decimal up to the following `CR`. Returns 0 if the
/// field is absent or unparseable. This decides how many body bytes
/// remain before any general header parse runs.
pub fn content_length(block: &[u8]) -> usize {
  let start = match find(block, b"content-length: ")
    .or_else(|| find(block, b"Content-Length: "))
  {
    Some(at) => at + b"content-length: ".len(),
    None => return 0,
  };
  let mut length: usize = 0;
  for &byte in &block[start..] {
    match byte {
      b'0'..=b'9' => {
        // Checked, since the digits come straight off the wire.
        length = match length
          .checked_mul(10)
          .and_then(|n| n.checked_add((byte - b'0') as usize))
        {
          Some(n) => n,
          None => return 0,
        };
      }
      b'\r' => return length,
      _ => return 0,
    }
  }
  0
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack.windows(needle.len()).position(|w| w == needle)
}
