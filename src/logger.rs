// Copyright 2020 The Exonum Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging setup.
//!
//! The core itself only ever calls the `log` macros (`debug!`, `warn!`, `error!`)
//! directly at the call sites that need them — the queue processor and the pulse
//! handler are the two noisiest. This module just wires up a default subscriber
//! for binaries embedding this crate; library code never needs to call it.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes `env_logger` as the global log subscriber, once per process.
///
/// Safe to call multiple times (and from multiple threads/tests): only the
/// first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().format_timestamp_millis().try_init();
    });
}
