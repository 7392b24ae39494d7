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

//! Pulse handler (C7, §4.4) — transfers or continues execution at each pulse.

use std::sync::Arc;

use crate::coordinator::Role;
use crate::message_bus::{OutboundMessage, WireQueueElement};
use crate::pulse::PulseNumber;
use crate::reference::Reference;
use crate::runner::LogicRunner;
use crate::state::execution::Pending;
use crate::state::store::ObjectState;

/// Advances the node to `new_pulse`: for every object this node currently
/// tracks, either hands off the execution to the next authoritative executor
/// or continues holding it, per §4.4.
///
/// The outer store lock is held only for the `snapshot()` call (§5, §9); each
/// entry's own mutex is taken individually while messages to send are
/// collected, and every send happens after the scan, matching "the handler
/// returns as soon as [sends] are scheduled" (§4.4).
pub async fn on_pulse(runner: &Arc<LogicRunner>, new_pulse: PulseNumber) {
    runner.set_current_pulse(new_pulse);

    let snapshot = runner.store.snapshot();
    let mut restart: Vec<Reference> = Vec::new();
    let mut outbound: Vec<OutboundMessage> = Vec::new();

    for (object_ref, state_arc) in snapshot {
        let authorized = match runner
            .coordinator
            .is_authorized(Role::VirtualExecutor, object_ref, new_pulse, runner.me())
            .await
        {
            Ok(authorized) => authorized,
            Err(err) => {
                log::error!(
                    "authorization check failed for {} at pulse {}: {}",
                    object_ref,
                    new_pulse,
                    err
                );
                continue;
            }
        };

        let should_delete = {
            let mut state = state_arc.lock().await;
            // Refreshing the opaque consensus sub-record is the surrounding
            // agreement protocol's job (§1 out of scope) — this core only
            // re-checks the deletion condition below after the scan.
            if authorized {
                remain_executor(&mut state, &mut restart, object_ref);
            } else {
                hand_off(&mut state, &mut outbound, object_ref);
            }
            state.execution.is_none() && state.validation.is_none() && state.consensus.is_none()
        };

        if should_delete {
            runner.store.delete(object_ref);
        }
    }

    // §4.4: "messages are sent in parallel" — dispatched concurrently rather
    // than one at a time, though (unlike the original's goroutine-per-send
    // plus wait-group-for-observability-only shape) this still awaits every
    // send before returning, so a caller never races a handler that hasn't
    // finished emitting its handoff messages yet.
    let sends = outbound.into_iter().map(|message| runner.message_bus.send(message));
    futures::future::join_all(sends).await;

    for object_ref in restart {
        crate::queue_processor::start_if_needed(runner, object_ref).await;
    }
}

fn remain_executor(state: &mut ObjectState, restart: &mut Vec<Reference>, object_ref: Reference) {
    let es = match state.execution.as_mut() {
        Some(es) => es,
        None => return,
    };

    if es.current.is_some() && es.pending == Pending::InPending {
        log::warn!(
            "object {} has both a current execution and pending=InPending; normalizing to NotPending",
            object_ref
        );
        es.pending = Pending::NotPending;
    } else if es.pending == Pending::InPending && !es.pending_confirmed {
        log::debug!("prior executor for {} assumed dead; resuming as executor", object_ref);
        es.pending = Pending::NotPending;
        es.object_body = None;
        restart.push(object_ref);
    }
    es.pending_confirmed = false;
}

fn hand_off(state: &mut ObjectState, outbound: &mut Vec<OutboundMessage>, object_ref: Reference) {
    let es = match state.execution.as_mut() {
        Some(es) => es,
        None => return,
    };

    let mut send_results = false;
    let still_running = es.current.is_some();

    if still_running {
        es.pending = Pending::InPending;
        outbound.push(OutboundMessage::StillExecuting { reference: object_ref });
        send_results = true;
    } else if es.pending == Pending::InPending && !es.pending_confirmed {
        es.pending = Pending::NotPending;
        send_results = true;
    }

    let drained: Vec<WireQueueElement> = es
        .release_queue()
        .into_iter()
        .map(|qe| WireQueueElement {
            request: qe.request_ref,
            pulse: qe.pulse,
            parcel: qe.parcel,
        })
        .collect();

    if !drained.is_empty() || send_results {
        outbound.push(OutboundMessage::ExecutorResults {
            reference: object_ref,
            pending: es.pending,
            queue: drained,
        });
    }

    // Only drop the execution state when nothing is still running against it.
    // If `current` is set, a queue-processor task is mid-`execute()` for the
    // popped element with this state's lock released (§4.3 step 3); it will
    // reacquire the lock at steps 4-5 to send `ReturnResults` and run
    // `finish_pending_if_needed` itself. Nil-ing the state out from under it
    // here would make that task find `state.execution` gone and silently
    // return, dropping the in-flight result (§8 invariants 2-3). The original
    // only nils the state in the branch where no execution is in flight
    // (`logicrunner.go:926-950`).
    if !still_running {
        state.execution = None;
    }
}
