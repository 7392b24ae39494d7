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

//! Queue processor (C6, §4.3) — the single cooperative worker per object.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;

use crate::artifact_manager::ObjectDescriptor;
use crate::behaviour::CallMode;
use crate::error::ExecutionError;
use crate::executor::LogicContext;
use crate::message_bus::{CallRequest, OutboundMessage, ReturnMode, SaveAs};
use crate::reference::Reference;
use crate::runner::LogicRunner;
use crate::state::execution::{CurrentExecution, ObjectBody, QueueElement};
use crate::state::store::ObjectState;

/// Starts draining `object_ref`'s queue in the background, unless a processor
/// is already running, the queue is empty, or `pending = InPending`.
///
/// A fresh `Unknown` pending state is resolved first via `HasPendingRequests`;
/// that RPC — like every collaborator call in this module — happens with the
/// state lock released (§5: the queue processor never holds the
/// `ExecutionState` lock across such a call).
pub(crate) async fn start_if_needed(runner: &Arc<LogicRunner>, object_ref: Reference) {
    let state_arc = runner.store.upsert(object_ref);

    let needs_pending_check = {
        let mut state = state_arc.lock().await;
        match state.execution.as_mut() {
            Some(es) if es.queue.is_empty() || es.processor_active || es.pending == crate::state::execution::Pending::InPending => {
                return;
            }
            Some(es) => es.pending == crate::state::execution::Pending::Unknown,
            None => return,
        }
    };

    if needs_pending_check {
        let has_pending = match runner.artifact_manager.has_pending_requests(object_ref).await {
            Ok(has_pending) => has_pending,
            Err(err) => {
                log::error!("has_pending_requests failed for {}: {}", object_ref, err);
                return;
            }
        };
        let mut state = state_arc.lock().await;
        if let Some(es) = state.execution.as_mut() {
            if es.pending == crate::state::execution::Pending::Unknown {
                es.pending = if has_pending {
                    crate::state::execution::Pending::InPending
                } else {
                    crate::state::execution::Pending::NotPending
                };
            }
        }
    }

    let should_spawn = {
        let mut state = state_arc.lock().await;
        match state.execution.as_mut() {
            Some(es)
                if !es.queue.is_empty()
                    && !es.processor_active
                    && es.pending != crate::state::execution::Pending::InPending =>
            {
                es.processor_active = true;
                true
            }
            _ => false,
        }
    };

    if should_spawn {
        let runner = Arc::clone(runner);
        tokio::spawn(async move { run(runner, object_ref).await });
    }
}

async fn run(runner: Arc<LogicRunner>, object_ref: Reference) {
    loop {
        let state_arc = runner.store.upsert(object_ref);

        // Step 1-2: pop the head and build `current`, lock held only for the mutation.
        let element = {
            let mut state = state_arc.lock().await;
            let es = match state.execution.as_mut() {
                Some(es) => es,
                None => return,
            };
            match es.queue.pop_front() {
                None => {
                    es.processor_active = false;
                    es.current = None;
                    return;
                }
                Some(qe) => {
                    es.current = Some(current_execution_for(&qe));
                    qe
                }
            }
        };

        {
            let state = state_arc.lock().await;
            if let Some(es) = state.execution.as_ref() {
                es.behaviour.new_request(element.request_ref);
            }
        }

        // Step 3: released lock, executor/artifact-manager RPCs happen here.
        let (reply, error) = execute(&runner, object_ref, &state_arc, &element).await;

        {
            let state = state_arc.lock().await;
            if let Some(es) = state.execution.as_ref() {
                es.behaviour.result(reply.clone(), error.clone());
            }
        }

        // Step 4: re-acquire lock, mark sent, decide whether to reply.
        let send_plan = {
            let mut state = state_arc.lock().await;
            let es = match state.execution.as_mut() {
                Some(es) => es,
                None => return,
            };
            match es.current.as_mut() {
                Some(current) => {
                    current.sent_result = true;
                    if current.return_mode == ReturnMode::Result {
                        Some((current.requester_node, current.sequence_no))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some((target, sequence)) = send_plan {
            runner
                .message_bus
                .send(OutboundMessage::ReturnResults {
                    caller: runner.me(),
                    target,
                    sequence,
                    reply: reply.unwrap_or_default(),
                    error,
                })
                .await;
        }

        // Step 5.
        finish_pending_if_needed(&runner, object_ref, &state_arc).await;

        // Step 6: loop back to (1).
    }
}

fn current_execution_for(qe: &QueueElement) -> CurrentExecution {
    let (return_mode, trace_id) = match &qe.parcel.request {
        CallRequest::Method(m) => (m.return_mode, m.trace_id.clone()),
        CallRequest::Constructor(c) => (ReturnMode::Result, c.trace_id.clone()),
    };
    CurrentExecution {
        trace_id,
        request_ref: qe.request_ref,
        sequence_no: qe.parcel.sequence,
        requester_node: qe.parcel.sender,
        return_mode,
        sent_result: false,
    }
}

/// Runs one queued call end to end, returning `(reply, error string)` for `ReturnResults`.
///
/// Both arms follow §4.3 step 3 — resolve descriptors, dispatch to the
/// registered executor, apply the effect through the artifact manager, and
/// close the request with a result record. Any failure is turned into an
/// opaque error string rather than propagated, since a failed call still
/// needs its slot in the queue drained and its result (even if an error)
/// delivered.
async fn execute(
    runner: &Arc<LogicRunner>,
    object_ref: Reference,
    state_arc: &Arc<Mutex<ObjectState>>,
    element: &QueueElement,
) -> (Option<Vec<u8>>, Option<String>) {
    let outcome = match &element.parcel.request {
        CallRequest::Method(call) => {
            execute_method(runner, object_ref, state_arc, element, call).await
        }
        CallRequest::Constructor(call) => {
            execute_constructor(runner, object_ref, state_arc, element, call).await
        }
    };
    match outcome {
        Ok(reply) => (Some(reply), None),
        Err(err) => {
            let wrapped = {
                let state = state_arc.lock().await;
                match state.execution.as_ref() {
                    Some(es) => es.wrap_error(err),
                    None => err,
                }
            };
            log::warn!("execution failed for {}: {}", object_ref, wrapped);
            (None, Some(wrapped.to_string()))
        }
    }
}

async fn execute_method(
    runner: &Arc<LogicRunner>,
    object_ref: Reference,
    state_arc: &Arc<Mutex<ObjectState>>,
    element: &QueueElement,
    call: &crate::message_bus::CallMethod,
) -> Result<Vec<u8>, ExecutionError> {
    let cached = {
        let state = state_arc.lock().await;
        state
            .execution
            .as_ref()
            .and_then(|es| es.object_body.clone())
    };

    let body = match cached {
        Some(body) => body,
        None => {
            let body = fetch_object_body(runner, object_ref).await?;
            let mut state = state_arc.lock().await;
            if let Some(es) = state.execution.as_mut() {
                es.object_body = Some(body.clone());
            }
            body
        }
    };

    if !call.proxy_prototype.is_empty() && call.proxy_prototype != body.prototype_ref {
        return Err(ExecutionError::new("proxy call error").with_method(call.method.clone()));
    }

    let executor = {
        let registry = runner.executors.read().expect("executor registry lock poisoned");
        registry.get(body.machine_type)
    }
    .ok_or_else(|| ExecutionError::new(format!("no executor for machine type {:?}", body.machine_type)))?;

    let context = LogicContext {
        mode: CallMode::Execution,
        caller: call.caller,
        callee: object_ref,
        request: element.request_ref,
        time: SystemTime::now(),
        pulse: element.pulse,
        trace_id: call.trace_id.clone(),
        caller_prototype: call.caller_prototype,
        prototype: Some(body.prototype_ref),
        code: Some(body.code_ref),
        parent: body.parent_ref,
    };

    let outcome = executor
        .call_method(context, body.code_ref, body.memory.clone(), call.method.clone(), call.arguments.clone())
        .await
        .map_err(|err| ExecutionError::new(err.to_string()).with_method(call.method.clone()))?;

    if outcome.deactivate {
        let descriptor = object_descriptor(object_ref, &body);
        runner
            .artifact_manager
            .deactivate_object(descriptor, element.request_ref)
            .await
            .map_err(artifact_error)?;
        let mut state = state_arc.lock().await;
        if let Some(es) = state.execution.as_mut() {
            es.deactivate = true;
            es.object_body = None;
        }
    } else {
        let descriptor = object_descriptor(object_ref, &body);
        match runner
            .artifact_manager
            .update_object(descriptor, element.request_ref, outcome.new_memory.clone())
            .await
        {
            Ok(updated) => {
                let mut state = state_arc.lock().await;
                if let Some(es) = state.execution.as_mut() {
                    es.object_body = Some(ObjectBody {
                        memory: updated.memory,
                        ..body
                    });
                }
            }
            Err(crate::error::ArtifactManagerError::InvalidStateRecord) => {
                let mut state = state_arc.lock().await;
                if let Some(es) = state.execution.as_mut() {
                    es.object_body = None;
                }
                return Err(ExecutionError::new("invalid state record").with_method(call.method.clone()));
            }
            Err(other) => return Err(artifact_error(other)),
        }
    }

    runner
        .artifact_manager
        .register_result(object_ref, element.request_ref, outcome.result.clone())
        .await
        .map_err(artifact_error)?;

    Ok(outcome.result)
}

async fn execute_constructor(
    runner: &Arc<LogicRunner>,
    object_ref: Reference,
    _state_arc: &Arc<Mutex<ObjectState>>,
    element: &QueueElement,
    call: &crate::message_bus::CallConstructor,
) -> Result<Vec<u8>, ExecutionError> {
    if call.caller.is_empty() {
        return Err(ExecutionError::new("constructor call requires a non-empty caller"));
    }

    let (_proto, code) = resolve_prototype(runner, call.prototype).await?;

    let executor = {
        let registry = runner.executors.read().expect("executor registry lock poisoned");
        registry.get(code.machine_type)
    }
    .ok_or_else(|| ExecutionError::new(format!("no executor for machine type {:?}", code.machine_type)))?;

    let context = LogicContext {
        mode: CallMode::Execution,
        caller: call.caller,
        callee: Reference::empty(),
        request: element.request_ref,
        time: SystemTime::now(),
        pulse: element.pulse,
        trace_id: call.trace_id.clone(),
        caller_prototype: None,
        prototype: Some(call.prototype),
        code: Some(code.reference),
        parent: Some(call.parent),
    };

    let new_memory = executor
        .call_constructor(context, code.reference, call.name.clone(), call.arguments.clone())
        .await
        .map_err(|err| ExecutionError::new(err.to_string()))?;

    // ActivateObject's return value is discarded, matching the original's
    // `_, err = lr.ArtifactManager.ActivateObject(...)` — the constructed
    // object is identified by its request reference, not a manufactured one.
    let is_delegate = call.save_as == SaveAs::Delegate;
    let _ = runner
        .artifact_manager
        .activate_object(element.request_ref, call.parent, call.prototype, is_delegate, new_memory)
        .await
        .map_err(artifact_error)?;

    runner
        .artifact_manager
        .register_result(element.request_ref, element.request_ref, Vec::new())
        .await
        .map_err(artifact_error)?;

    let mut reply = Vec::with_capacity(32);
    reply.extend_from_slice(element.request_ref.record());
    reply.extend_from_slice(element.request_ref.domain());
    Ok(reply)
}

async fn fetch_object_body(
    runner: &Arc<LogicRunner>,
    object_ref: Reference,
) -> Result<ObjectBody, ExecutionError> {
    let descriptor = runner
        .artifact_manager
        .get_object(object_ref)
        .await
        .map_err(artifact_error)?;
    let (_proto, code) = resolve_prototype(runner, descriptor.prototype).await?;
    Ok(ObjectBody {
        memory: descriptor.memory,
        prototype_ref: descriptor.prototype,
        machine_type: code.machine_type,
        code_ref: code.reference,
        parent_ref: descriptor.parent,
    })
}

/// Resolves a prototype reference to its own object descriptor and the code
/// descriptor it backs — the three-hop object → prototype → code lookup
/// §4.3 step 3 calls for (mirrors the original's `getDescriptorsByPrototypeRef`,
/// which fetches the prototype *as an object* via `GetObject` before reading
/// its `Code()` pointer and only then calling `GetCode`).
async fn resolve_prototype(
    runner: &Arc<LogicRunner>,
    prototype_ref: Reference,
) -> Result<(ObjectDescriptor, crate::artifact_manager::CodeDescriptor), ExecutionError> {
    let proto_descriptor = runner
        .artifact_manager
        .get_object(prototype_ref)
        .await
        .map_err(artifact_error)?;
    let code_descriptor = runner
        .artifact_manager
        .get_code(proto_descriptor.code)
        .await
        .map_err(artifact_error)?;
    Ok((proto_descriptor, code_descriptor))
}

fn object_descriptor(object_ref: Reference, body: &ObjectBody) -> ObjectDescriptor {
    ObjectDescriptor {
        head: object_ref,
        memory: body.memory.clone(),
        prototype: body.prototype_ref,
        parent: body.parent_ref,
        // Not a prototype object itself, so it backs no code of its own.
        code: Reference::empty(),
    }
}

fn artifact_error(err: crate::error::ArtifactManagerError) -> ExecutionError {
    ExecutionError::new(err.to_string())
}

/// §4.3 step 5: flips a confirmed `InPending` back to `NotPending` once this
/// worker has drained a result, and hands off if this node has lost
/// authority over the object in the meantime.
async fn finish_pending_if_needed(
    runner: &Arc<LogicRunner>,
    object_ref: Reference,
    state_arc: &Arc<Mutex<ObjectState>>,
) {
    let was_in_pending = {
        let mut state = state_arc.lock().await;
        match state.execution.as_mut() {
            Some(es) if es.pending == crate::state::execution::Pending::InPending => {
                es.pending = crate::state::execution::Pending::NotPending;
                es.pending_confirmed = false;
                true
            }
            _ => false,
        }
    };

    if !was_in_pending {
        return;
    }

    let still_authoritative = match runner
        .coordinator
        .is_authorized(
            crate::coordinator::Role::VirtualExecutor,
            object_ref,
            runner.current_pulse(),
            runner.me(),
        )
        .await
    {
        Ok(authorized) => authorized,
        Err(err) => {
            log::error!("authorization check failed for {}: {}", object_ref, err);
            true
        }
    };

    if !still_authoritative {
        let mut state = state_arc.lock().await;
        if let Some(es) = state.execution.as_mut() {
            es.object_body = None;
        }
        drop(state);
        runner
            .message_bus
            .send(OutboundMessage::PendingFinished { reference: object_ref })
            .await;
    }
}
