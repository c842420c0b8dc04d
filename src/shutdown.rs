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

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::ServerError;

/// Cooperative shutdown flag.
///
/// Cloned into every worker and polled before and after each recv/send
/// loop; when set, the in-flight operation is abandoned without a
/// diagnostic. Triggering is idempotent.
#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn trigger(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_triggered(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn check(&self) -> Result<(), ServerError> {
    if self.is_triggered() {
      Err(ServerError::Shutdown)
    } else {
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trigger_is_idempotent() {
    let shutdown = Shutdown::new();
    assert!(!shutdown.is_triggered());
    shutdown.trigger();
    shutdown.trigger();
    assert!(shutdown.is_triggered());
    assert!(shutdown.clone().is_triggered());
  }
}
