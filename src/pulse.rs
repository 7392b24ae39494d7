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

//! The externally supplied epoch counter that drives executor handoff.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonically non-decreasing 32-bit epoch counter.
///
/// `PulseNumber` does not enforce monotonicity itself — it is a dumb wrapper
/// around `u32` — the pulsar that produces these values is out of scope for
/// this crate (see spec §1); callers are expected to feed pulses in
/// non-decreasing order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PulseNumber(pub u32);

impl PulseNumber {
    /// The pulse before any real pulse has been observed.
    pub const ZERO: PulseNumber = PulseNumber(0);
}

impl fmt::Display for PulseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PulseNumber {
    fn from(n: u32) -> Self {
        PulseNumber(n)
    }
}
