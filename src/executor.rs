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

//! Code-execution interface contract (C2, §4.6).
//!
//! Concrete executors (built-in vs plugin, any particular VM) are out of
//! scope (§1) — this module only defines the registry that maps a declared
//! machine-type tag to whichever executor implementation was registered for
//! it, and the trait that executor must implement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::behaviour::CallMode;
use crate::pulse::PulseNumber;
use crate::reference::Reference;

/// Identifies which kind of executor a piece of code is meant to run on.
///
/// An opaque tag by design: the set of concrete machine types (WASM, a
/// built-in Rust registry, a language-specific plugin host, ...) is a
/// deployment concern, not a core one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MachineType(pub u32);

/// Everything a [`CodeExecutor`] needs to know about the call it is making.
///
/// Mirrors the original's `core.LogicCallContext`.
#[derive(Clone, Debug)]
pub struct LogicContext {
    /// Whether this call is a first execution or a validation replay.
    pub mode: CallMode,
    /// The reference that initiated the call (may be empty for root calls).
    pub caller: Reference,
    /// The object the call executes against.
    pub callee: Reference,
    /// The request record this call is being executed for.
    pub request: Reference,
    /// Wall-clock time the call began.
    pub time: SystemTime,
    /// The pulse current when the call began.
    pub pulse: PulseNumber,
    /// Trace identifier used by loop detection (§4.2).
    pub trace_id: String,
    /// Prototype reference the caller believes the callee implements.
    pub caller_prototype: Option<Reference>,
    /// Prototype reference of the callee.
    pub prototype: Option<Reference>,
    /// Code reference backing the callee's prototype.
    pub code: Option<Reference>,
    /// The callee's parent object, if any.
    pub parent: Option<Reference>,
}

/// Result of a method call: the object's new memory image and the method's return value.
#[derive(Clone, Debug)]
pub struct MethodCallOutcome {
    /// The object's serialized state after the call.
    pub new_memory: Vec<u8>,
    /// The opaque result blob returned to the caller.
    pub result: Vec<u8>,
    /// Set by the executed contract body itself to request self-destruction
    /// (§3: "`deactivate: bool` — set by a contract that requested
    /// self-destruction"). This is an effect of running the method, not an
    /// input the caller can set — a caller has no business deciding whether
    /// someone else's object deactivates itself.
    pub deactivate: bool,
}

/// Errors a [`CodeExecutor`] may report. The core treats these as opaque
/// "Execution" errors (§7) and does not interpret their contents.
#[derive(Debug)]
pub struct ExecutorCallError(pub String);

impl std::fmt::Display for ExecutorCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pluggable code executor (§4.6).
///
/// From the executor's point of view both operations are pure: all effects on
/// the ledger happen through the artifact manager after the executor returns,
/// never as a side effect of the call itself.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Invokes `method` on an existing object's current memory image.
    async fn call_method(
        &self,
        context: LogicContext,
        code: Reference,
        memory: Vec<u8>,
        method: String,
        args: Vec<u8>,
    ) -> Result<MethodCallOutcome, ExecutorCallError>;

    /// Invokes the constructor named `name` and returns the new object's memory image.
    async fn call_constructor(
        &self,
        context: LogicContext,
        code: Reference,
        name: String,
        args: Vec<u8>,
    ) -> Result<Vec<u8>, ExecutorCallError>;

    /// Releases any resources held by this executor (subprocess, connection, ...).
    async fn stop(&self);
}

/// Maps a [`MachineType`] to the executor registered for it.
///
/// Stores `Arc` rather than `Box` so a caller can clone an executor handle out
/// and release the registry lock before making an RPC-bearing call on it — the
/// registry itself is looked up under a `RwLock` (see [`crate::runner::LogicRunner`])
/// and that lock must never be held across an `.await` (§5).
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<MachineType, Arc<dyn CodeExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registers `executor` as the handler for `machine_type`.
    ///
    /// Overwrites any previously registered executor for the same tag.
    pub fn register(&mut self, machine_type: MachineType, executor: Arc<dyn CodeExecutor>) {
        self.executors.insert(machine_type, executor);
    }

    /// Looks up the executor registered for `machine_type`, if any.
    pub fn get(&self, machine_type: MachineType) -> Option<Arc<dyn CodeExecutor>> {
        self.executors.get(&machine_type).cloned()
    }

    /// Stops every registered executor. Best-effort: failures are not reported
    /// individually, matching the original's "collect, don't short-circuit" stop loop.
    pub async fn stop_all(&self) {
        for executor in self.executors.values() {
            executor.stop().await;
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("machine_types", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
