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

//! Message handlers (C8, §4.5) — entry points for inbound protocol messages.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::behaviour::{ExecutionRecording, ValidationReplaying};
use crate::coordinator::Role;
use crate::error::LogicRunnerError;
use crate::message_bus::{CallRequest, Parcel, ReturnMode, WireQueueElement};
use crate::queue_processor;
use crate::reference::Reference;
use crate::runner::LogicRunner;
use crate::state::execution::{ExecutionState, Pending, QueueElement};

fn object_ref_for(request: &CallRequest) -> Reference {
    match request {
        CallRequest::Method(m) => m.object,
        // A constructor call contends for serialization on the parent it
        // attaches the new object to — there is no pre-existing reference for
        // the object being constructed to key an `ExecutionState` on.
        CallRequest::Constructor(c) => c.parent,
    }
}

fn trace_and_return_mode(request: &CallRequest) -> (&str, ReturnMode) {
    match request {
        CallRequest::Method(m) => (&m.trace_id, m.return_mode),
        CallRequest::Constructor(c) => (&c.trace_id, ReturnMode::Result),
    }
}

impl LogicRunner {
    /// Dispatches an inbound `CallMethod` or `CallConstructor` (§4.5 `Execute`).
    ///
    /// Returns the reference the request was durably registered under, which
    /// is the caller's synchronous `RegisterRequest` reply.
    ///
    /// The `ExecutionState` lock is held continuously from the role check
    /// through the queue append — it is not released and re-acquired between
    /// them. The original's `executeActual` holds its own lock across exactly
    /// this span with an explicit comment: releasing it between `CheckOurRole`
    /// and the queue append would let a pulse boundary run `OnPulse` in
    /// between, clean up the queue, flip `Pending` back to `NotPending`, and
    /// hand the object to another node — after which this call would append
    /// to a queue nobody is going to drain, or find `execution` gone entirely.
    /// Holding the lock across these `.await`s is exactly why the store uses
    /// `tokio::sync::Mutex` rather than a synchronous one (see `state/store.rs`).
    pub async fn execute(self: &Arc<Self>, parcel: Parcel) -> Result<Reference, LogicRunnerError> {
        let object_ref = object_ref_for(&parcel.request);
        let state_arc = self.store.upsert(object_ref);

        let mut state = state_arc.lock().await;
        if state.execution.is_none() {
            state.execution = Some(ExecutionState::new(Arc::new(ExecutionRecording::new())));
        }

        let authorized = self
            .coordinator
            .is_authorized(Role::VirtualExecutor, object_ref, parcel.pulse, self.me())
            .await?;
        if !authorized {
            return Err(LogicRunnerError::NotAuthorized(object_ref));
        }

        // Loop detection happens before the request is ever registered, so a
        // rejected recursive call leaves no record behind (§4.2, §4.5).
        {
            let es = state.execution.as_ref().expect("inserted above, still under this lock");
            let (trace_id, return_mode) = trace_and_return_mode(&parcel.request);
            if es.detects_loop(trace_id, return_mode) {
                return Err(LogicRunnerError::LoopDetected);
            }
        }

        let payload = match &parcel.request {
            CallRequest::Method(m) => m.arguments.clone(),
            CallRequest::Constructor(c) => c.arguments.clone(),
        };
        let request_ref = self
            .artifact_manager
            .register_request(object_ref, payload)
            .await
            .map_err(LogicRunnerError::Registration)?;

        let es = state.execution.as_mut().expect("inserted above, still under this lock");
        es.enqueue(QueueElement {
            parcel: parcel.clone(),
            request_ref,
            pulse: parcel.pulse,
        });
        drop(state);

        queue_processor::start_if_needed(self, object_ref).await;

        Ok(request_ref)
    }

    /// `PendingFinished` (§4.5): the previous executor has finished draining
    /// a handed-off pending request.
    pub async fn handle_pending_finished(
        self: &Arc<Self>,
        reference: Reference,
    ) -> Result<(), LogicRunnerError> {
        let state_arc = self.store.upsert(reference);
        {
            let mut state = state_arc.lock().await;
            if let Some(es) = state.execution.as_mut() {
                es.pending = Pending::NotPending;
                es.pending_confirmed = false;
                if es.current.is_some() {
                    return Err(LogicRunnerError::Protocol(
                        "PendingFinished received while a current execution exists".into(),
                    ));
                }
            }
        }
        queue_processor::start_if_needed(self, reference).await;
        Ok(())
    }

    /// `StillExecuting` (§4.5): a best-effort heartbeat confirming a pending execution.
    pub async fn handle_still_executing(self: &Arc<Self>, reference: Reference) {
        let state_arc = self.store.upsert(reference);
        let mut state = state_arc.lock().await;
        match state.execution.as_mut() {
            None => {
                let mut es = ExecutionState::new(Arc::new(ExecutionRecording::new()));
                es.pending = Pending::InPending;
                es.pending_confirmed = true;
                state.execution = Some(es);
            }
            Some(es) => {
                if es.pending == Pending::NotPending {
                    log::warn!(
                        "StillExecuting received for {} while local state claims NotPending",
                        reference
                    );
                }
                es.pending_confirmed = true;
            }
        }
    }

    /// `ExecutorResults` (§4.5): a handoff from the previous executor, carrying
    /// the pending flag and its drained queue, which is prepended to ours.
    pub async fn handle_executor_results(
        self: &Arc<Self>,
        reference: Reference,
        pending: Pending,
        queue: Vec<WireQueueElement>,
    ) {
        let state_arc = self.store.upsert(reference);
        {
            let mut state = state_arc.lock().await;
            if state.execution.is_none() {
                state.execution = Some(ExecutionState::new(Arc::new(ExecutionRecording::new())));
            }
            let es = state.execution.as_mut().expect("just inserted");
            es.pending = pending;

            let mut merged: VecDeque<QueueElement> = queue
                .into_iter()
                .map(|w| QueueElement {
                    parcel: w.parcel,
                    request_ref: w.request,
                    pulse: w.pulse,
                })
                .collect();
            merged.append(&mut es.queue);
            es.queue = merged;
        }
        queue_processor::start_if_needed(self, reference).await;
    }

    /// `ValidateCaseBind` (§4.5): seeds the validation sub-state for a replay.
    ///
    /// Structural parity with the execution side only — actual case-bind
    /// comparison belongs to the surrounding agreement protocol (§4.5: "outside
    /// the core's tight contract").
    pub async fn handle_validate_case_bind(self: &Arc<Self>, reference: Reference) {
        let state_arc = self.store.upsert(reference);
        let mut state = state_arc.lock().await;
        if state.validation.is_none() {
            state.validation = Some(ExecutionState::new(Arc::new(ValidationReplaying)));
        }
    }

    /// `ValidationResults` (§4.5): closes out the validation sub-state.
    pub async fn handle_validation_results(self: &Arc<Self>, reference: Reference) {
        let state_arc = self.store.upsert(reference);
        let mut state = state_arc.lock().await;
        state.validation = None;
    }
}
