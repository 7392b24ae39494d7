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

//! Jet coordinator client interface (§6).
//!
//! The coordinator answers "am I the executor for object O at pulse P?" and
//! identifies this node. Role membership, certificates and the underlying
//! consensus network are out of scope (§1) — only this thin query surface is.

use async_trait::async_trait;

use crate::error::CoordinatorError;
use crate::pulse::PulseNumber;
use crate::reference::Reference;

/// The dynamic role a node can be authorized for with respect to an object.
///
/// The core only ever queries [`Role::VirtualExecutor`] (§4.5), but the
/// interface is kept open-ended since a real coordinator answers the same
/// question for other roles used outside this crate's scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// The node that may execute contract methods against the object.
    VirtualExecutor,
    /// The node that re-validates a previously executed sequence.
    VirtualValidator,
}

/// Outbound interface to the jet coordinator (§6).
#[async_trait]
pub trait JetCoordinator: Send + Sync {
    /// Is this node authorized for `role` with respect to `object` at `pulse`?
    async fn is_authorized(
        &self,
        role: Role,
        object: Reference,
        pulse: PulseNumber,
        me: Reference,
    ) -> Result<bool, CoordinatorError>;

    /// This node's own reference.
    fn me(&self) -> Reference;
}
