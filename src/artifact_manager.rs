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

//! Artifact manager client interface (C3, §6).
//!
//! Ledger durability itself is out of scope (§1) — this module only defines
//! the thin outbound interface the core calls into, and the descriptor types
//! those calls exchange.

use async_trait::async_trait;

use crate::error::ArtifactManagerError;
use crate::executor::MachineType;
use crate::reference::Reference;

/// Descriptor of an object's current state as known to the ledger.
///
/// A prototype is itself just an object on the ledger, fetched through the
/// same `get_object` call as any instance — this descriptor's `code` field is
/// only meaningful when `head` names a prototype object, mirroring the
/// original's `ObjectDescriptor.Code()` accessor used on a descriptor fetched
/// by prototype reference (`getDescriptorsByPrototypeRef`).
#[derive(Clone, Debug)]
pub struct ObjectDescriptor {
    /// The object's own reference.
    pub head: Reference,
    /// The object's current serialized memory.
    pub memory: Vec<u8>,
    /// The object's prototype reference.
    pub prototype: Reference,
    /// The object's parent, if any.
    pub parent: Option<Reference>,
    /// The code reference this object backs, if `head` is itself a prototype.
    pub code: Reference,
}

/// Descriptor of a code artifact backing a prototype.
#[derive(Clone, Debug)]
pub struct CodeDescriptor {
    /// The code's own reference.
    pub reference: Reference,
    /// Which machine type this code must be executed on.
    pub machine_type: MachineType,
}

/// Outbound interface to the artifact manager (§6).
#[async_trait]
pub trait ArtifactManager: Send + Sync {
    /// Durably registers an inbound call as a request record, returning its reference.
    async fn register_request(
        &self,
        object: Reference,
        payload: Vec<u8>,
    ) -> Result<Reference, ArtifactManagerError>;

    /// Closes a request with its result, returning the result record's reference.
    async fn register_result(
        &self,
        object: Reference,
        request: Reference,
        result: Vec<u8>,
    ) -> Result<Reference, ArtifactManagerError>;

    /// Whether any other, still-unfinished request is registered against `object`.
    async fn has_pending_requests(&self, object: Reference) -> Result<bool, ArtifactManagerError>;

    /// Fetches the current descriptor for `object`.
    async fn get_object(&self, object: Reference) -> Result<ObjectDescriptor, ArtifactManagerError>;

    /// Fetches the code descriptor for `code`.
    async fn get_code(&self, code: Reference) -> Result<CodeDescriptor, ArtifactManagerError>;

    /// Applies a new memory image to `object` on behalf of `request`.
    ///
    /// On the sentinel [`ArtifactManagerError::InvalidStateRecord`] the caller
    /// must invalidate its cached [`ObjectDescriptor`] and refetch before retrying.
    async fn update_object(
        &self,
        object: ObjectDescriptor,
        request: Reference,
        new_memory: Vec<u8>,
    ) -> Result<ObjectDescriptor, ArtifactManagerError>;

    /// Marks `object` as deactivated (self-destructed) on behalf of `request`.
    async fn deactivate_object(
        &self,
        object: ObjectDescriptor,
        request: Reference,
    ) -> Result<Reference, ArtifactManagerError>;

    /// Activates a freshly constructed object as a child or delegate of `parent`.
    async fn activate_object(
        &self,
        request: Reference,
        parent: Reference,
        prototype: Reference,
        is_delegate: bool,
        memory: Vec<u8>,
    ) -> Result<Reference, ArtifactManagerError>;
}
