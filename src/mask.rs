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

/// Unmasks a frame payload in place.
///
/// XORs each byte with `mask[i % 4]`, where `i` is the byte's position
/// within the frame. The mask cycle is frame-aligned, so each frame of a
/// fragmented message is unmasked with its own key.
pub fn unmask(payload: &mut [u8], mask: [u8; 4]) {
  let mut chunks = payload.chunks_exact_mut(4);
  for chunk in &mut chunks {
    for (byte, key) in chunk.iter_mut().zip(mask.iter()) {
      *byte ^= key;
    }
  }
  for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
    *byte ^= mask[i];
  }
}
