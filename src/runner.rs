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

//! The `LogicRunner` itself: the shared state every handler, the queue
//! processor and the pulse handler operate on.

use std::sync::{Arc, RwLock};

use crate::artifact_manager::ArtifactManager;
use crate::config::LogicRunnerConfig;
use crate::coordinator::JetCoordinator;
use crate::executor::{CodeExecutor, ExecutorRegistry, MachineType};
use crate::message_bus::MessageBus;
use crate::pulse::PulseNumber;
use crate::state::ObjectStateStore;

/// The per-node component that executes smart-contract calls against
/// ledger-resident objects while the system advances through pulses.
///
/// Construct one behind an `Arc` — every entry point that may need to spawn
/// background work (the queue processor, outbound sends) takes `self: &Arc<Self>`.
pub struct LogicRunner {
    pub(crate) store: ObjectStateStore,
    pub(crate) executors: RwLock<ExecutorRegistry>,
    pub(crate) artifact_manager: Arc<dyn ArtifactManager>,
    pub(crate) coordinator: Arc<dyn JetCoordinator>,
    pub(crate) message_bus: MessageBus,
    current_pulse: RwLock<PulseNumber>,
    #[allow(dead_code)] // carried for completeness; no CLI/env surface reads it yet (spec §6)
    pub(crate) config: LogicRunnerConfig,
}

impl LogicRunner {
    /// Builds a fresh logic runner with no executors registered yet.
    pub fn new(
        config: LogicRunnerConfig,
        artifact_manager: Arc<dyn ArtifactManager>,
        coordinator: Arc<dyn JetCoordinator>,
        message_bus: MessageBus,
    ) -> Self {
        Self {
            store: ObjectStateStore::new(),
            executors: RwLock::new(ExecutorRegistry::new()),
            artifact_manager,
            coordinator,
            message_bus,
            current_pulse: RwLock::new(PulseNumber::ZERO),
            config,
        }
    }

    /// Registers `executor` as the handler for `machine_type`.
    ///
    /// Mirrors the original's `RegisterExecutor`/`Start`, which wires up the
    /// built-in and plugin executors named in [`LogicRunnerConfig`] before any
    /// message handler is allowed to run.
    pub fn register_executor(&self, machine_type: MachineType, executor: Arc<dyn CodeExecutor>) {
        self.executors
            .write()
            .expect("executor registry lock poisoned")
            .register(machine_type, executor);
    }

    /// Stops every registered executor. Call during node shutdown.
    pub async fn stop(&self) {
        self.executors
            .read()
            .expect("executor registry lock poisoned")
            .stop_all()
            .await;
    }

    /// The pulse this node currently believes is in effect.
    pub fn current_pulse(&self) -> PulseNumber {
        *self.current_pulse.read().expect("pulse lock poisoned")
    }

    pub(crate) fn set_current_pulse(&self, pulse: PulseNumber) {
        *self.current_pulse.write().expect("pulse lock poisoned") = pulse;
    }

    /// This node's own reference, as reported by the coordinator.
    pub fn me(&self) -> crate::reference::Reference {
        self.coordinator.me()
    }
}
