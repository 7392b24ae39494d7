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

//! Execution state machine (C5, §4.2) — the heart of the core.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::behaviour::ValidationBehaviour;
use crate::error::ExecutionError;
use crate::executor::MachineType;
use crate::message_bus::{Parcel, ReturnMode};
use crate::pulse::PulseNumber;
use crate::reference::Reference;

/// Pending sub-states (§4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pending {
    /// Freshly created; authoritative pending-ness not yet determined.
    Unknown,
    /// No prior node holds an unfinished execution for this object.
    NotPending,
    /// Another node (or this node, pre-pulse) has an execution still running.
    InPending,
}

/// One request waiting in an object's queue.
#[derive(Clone, Debug)]
pub struct QueueElement {
    /// The parcel that was enqueued.
    pub parcel: Parcel,
    /// The request this element was durably registered under (invariant 5, §3).
    pub request_ref: Reference,
    /// The pulse this element was enqueued at.
    pub pulse: PulseNumber,
}

/// The request currently being executed, if any.
#[derive(Clone, Debug)]
pub struct CurrentExecution {
    /// Trace identifier of the call, used by loop detection.
    pub trace_id: String,
    /// The request this execution is for.
    pub request_ref: Reference,
    /// Per-sender sequence number, echoed back in `ReturnResults`.
    pub sequence_no: u64,
    /// The node that should receive the result.
    pub requester_node: Reference,
    /// Whether a `ReturnResults` should be sent once this completes.
    pub return_mode: ReturnMode,
    /// Whether the result has already been sent (loop detection, §4.2).
    pub sent_result: bool,
}

/// Cached object descriptors, read-through and invalidated on handoff/deactivation/sentinel (§3).
#[derive(Clone, Debug)]
pub struct ObjectBody {
    /// The object's current serialized memory.
    pub memory: Vec<u8>,
    /// The object's prototype reference.
    pub prototype_ref: Reference,
    /// Which machine type the backing code must run on.
    pub machine_type: MachineType,
    /// The code reference backing the prototype.
    pub code_ref: Reference,
    /// The object's parent, if any.
    pub parent_ref: Option<Reference>,
}

/// Per-object execution state (§3).
pub struct ExecutionState {
    /// FIFO queue of requests waiting to run; appended tail-only, dequeued head-only (§4.2).
    pub queue: VecDeque<QueueElement>,
    /// The request currently executing, if any.
    pub current: Option<CurrentExecution>,
    /// `true` iff exactly one worker is draining this queue (invariant 1, §3).
    pub processor_active: bool,
    /// Cached descriptors, `None` when invalidated or not yet fetched.
    pub object_body: Option<ObjectBody>,
    /// Current pending sub-state.
    pub pending: Pending,
    /// Whether a `StillExecuting` heartbeat has confirmed the pending state.
    pub pending_confirmed: bool,
    /// Set by a contract body that requested self-destruction.
    pub deactivate: bool,
    /// The validation/recording hook for this execution.
    pub behaviour: Arc<dyn ValidationBehaviour>,
}

impl ExecutionState {
    /// A fresh, empty execution state with `pending = Unknown`.
    pub fn new(behaviour: Arc<dyn ValidationBehaviour>) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            processor_active: false,
            object_body: None,
            pending: Pending::Unknown,
            pending_confirmed: false,
            deactivate: false,
            behaviour,
        }
    }

    /// Appends `element` to the tail of the queue (invariant 5, §3 — the caller
    /// must have already durably registered the request before calling this).
    pub fn enqueue(&mut self, element: QueueElement) {
        self.queue.push_back(element);
    }

    /// Drains the whole queue, replacing it with an empty one (§4.3 step 5, §4.4).
    ///
    /// Must only be called while holding this state's lock.
    pub fn release_queue(&mut self) -> Vec<QueueElement> {
        self.queue.drain(..).collect()
    }

    /// Loop detection (§4.2).
    ///
    /// A recursive `CallMethod` sharing the in-flight call's trace id, while
    /// both sides expect a reply, indicates a call cycle through this object.
    pub fn detects_loop(&self, incoming_trace_id: &str, incoming_return_mode: ReturnMode) -> bool {
        let current = match &self.current {
            Some(current) => current,
            None => return false,
        };
        if current.sent_result {
            return false;
        }
        if current.return_mode == ReturnMode::NoWait {
            return false;
        }
        if incoming_return_mode == ReturnMode::NoWait {
            return false;
        }
        current.trace_id == incoming_trace_id
    }

    /// Attaches contract/request context to `err`, mirroring the original's
    /// `ExecutionState.WrapError` helper (§SPEC_FULL "SUPPLEMENTED FEATURES").
    pub fn wrap_error(&self, err: ExecutionError) -> ExecutionError {
        let err = match &self.object_body {
            Some(body) => err.with_contract(body.prototype_ref),
            None => err,
        };
        match &self.current {
            Some(current) => err.with_request(current.request_ref),
            None => err,
        }
    }
}

impl std::fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionState")
            .field("queue_len", &self.queue.len())
            .field("current", &self.current)
            .field("processor_active", &self.processor_active)
            .field("pending", &self.pending)
            .field("pending_confirmed", &self.pending_confirmed)
            .field("deactivate", &self.deactivate)
            .field("has_object_body", &self.object_body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::ExecutionRecording;

    fn reference(seed: u8) -> Reference {
        let mut record = [0u8; 32];
        record[0] = seed;
        Reference::new(record, [0u8; 32])
    }

    fn fresh_state() -> ExecutionState {
        ExecutionState::new(Arc::new(ExecutionRecording::new()))
    }

    #[test]
    fn queue_order_matches_enqueue_order() {
        let mut state = fresh_state();
        for i in 0..3u8 {
            state.enqueue(QueueElement {
                parcel: sample_parcel(i),
                request_ref: reference(i),
                pulse: PulseNumber(i as u32),
            });
        }
        let drained = state.release_queue();
        let refs: Vec<_> = drained.iter().map(|e| e.request_ref).collect();
        assert_eq!(refs, vec![reference(0), reference(1), reference(2)]);
        assert!(state.queue.is_empty());
    }

    fn sample_parcel(seed: u8) -> Parcel {
        use crate::message_bus::{CallMethod, CallRequest};
        Parcel {
            request: CallRequest::Method(CallMethod {
                object: reference(seed),
                method: "Get".into(),
                arguments: Vec::new(),
                proxy_prototype: Reference::empty(),
                caller: reference(seed),
                caller_prototype: None,
                return_mode: ReturnMode::Result,
                trace_id: format!("trace-{}", seed),
            }),
            sender: reference(seed),
            sequence: seed as u64,
            pulse: PulseNumber(seed as u32),
        }
    }

    #[test]
    fn no_loop_when_nothing_executing() {
        let state = fresh_state();
        assert!(!state.detects_loop("t", ReturnMode::Result));
    }

    #[test]
    fn loop_detected_on_matching_trace_id_both_waiting() {
        let mut state = fresh_state();
        state.current = Some(CurrentExecution {
            trace_id: "shared".into(),
            request_ref: reference(1),
            sequence_no: 0,
            requester_node: reference(1),
            return_mode: ReturnMode::Result,
            sent_result: false,
        });
        assert!(state.detects_loop("shared", ReturnMode::Result));
    }

    #[test]
    fn no_loop_when_result_already_sent() {
        let mut state = fresh_state();
        state.current = Some(CurrentExecution {
            trace_id: "shared".into(),
            request_ref: reference(1),
            sequence_no: 0,
            requester_node: reference(1),
            return_mode: ReturnMode::Result,
            sent_result: true,
        });
        assert!(!state.detects_loop("shared", ReturnMode::Result));
    }

    #[test]
    fn no_loop_when_either_side_is_no_wait() {
        let mut state = fresh_state();
        state.current = Some(CurrentExecution {
            trace_id: "shared".into(),
            request_ref: reference(1),
            sequence_no: 0,
            requester_node: reference(1),
            return_mode: ReturnMode::NoWait,
            sent_result: false,
        });
        assert!(!state.detects_loop("shared", ReturnMode::Result));

        let mut state = fresh_state();
        state.current = Some(CurrentExecution {
            trace_id: "shared".into(),
            request_ref: reference(1),
            sequence_no: 0,
            requester_node: reference(1),
            return_mode: ReturnMode::Result,
            sent_result: false,
        });
        assert!(!state.detects_loop("shared", ReturnMode::NoWait));
    }
}
