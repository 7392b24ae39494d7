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

//! Message bus interface (§6).
//!
//! Wire-serialization and the transport itself are out of scope (§1) — this
//! module defines only the inbound message shapes the core's handlers (C8)
//! understand, the outbound variants it emits, and a channel-backed sender
//! for the fire-and-forget sends §5/§9 call for (modelled on the teacher
//! crate's `blockchain::ApiSender`, which is the same "wrap an mpsc sender,
//! fire-and-forget, `Clone`-able" shape).

use failure::Fail;
use tokio::sync::mpsc;

use crate::pulse::PulseNumber;
use crate::reference::Reference;
use crate::state::execution::Pending;

/// Whether the caller wants a `ReturnResults` message once the call completes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReturnMode {
    /// The caller is waiting and must be sent a `ReturnResults`.
    Result,
    /// Fire-and-forget: no `ReturnResults` will be sent.
    NoWait,
}

/// How a freshly constructed object should be attached to its parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveAs {
    /// A normal child object.
    Child,
    /// A delegate object (see `ActivateObject`'s `is_delegate` flag).
    Delegate,
}

/// A `CallMethod` request.
#[derive(Clone, Debug)]
pub struct CallMethod {
    /// The object the method is invoked against.
    pub object: Reference,
    /// Method name.
    pub method: String,
    /// Opaque, unvalidated argument payload (§1 Non-goals: no schema validation).
    pub arguments: Vec<u8>,
    /// Prototype the caller's proxy stub was generated against; empty if unchecked.
    pub proxy_prototype: Reference,
    /// The reference that initiated the call.
    pub caller: Reference,
    /// Prototype the caller believes it is calling through.
    pub caller_prototype: Option<Reference>,
    /// Whether the caller wants a reply.
    pub return_mode: ReturnMode,
    /// Trace identifier, used by loop detection (§4.2).
    pub trace_id: String,
}

/// A `CallConstructor` request.
#[derive(Clone, Debug)]
pub struct CallConstructor {
    /// Prototype to instantiate.
    pub prototype: Reference,
    /// Parent object the new instance is attached to.
    pub parent: Reference,
    /// Constructor name.
    pub name: String,
    /// Opaque, unvalidated argument payload.
    pub arguments: Vec<u8>,
    /// The reference that initiated the call; must be non-empty (§4.3).
    pub caller: Reference,
    /// How to attach the new object to `parent`.
    pub save_as: SaveAs,
    /// Trace identifier.
    pub trace_id: String,
}

/// The two request shapes the core's message handlers dispatch on (§4.5).
#[derive(Clone, Debug)]
pub enum CallRequest {
    /// See [`CallMethod`].
    Method(CallMethod),
    /// See [`CallConstructor`].
    Constructor(CallConstructor),
}

/// A signed, pulse-tagged envelope around a message (§GLOSSARY "Parcel").
#[derive(Clone, Debug)]
pub struct Parcel {
    /// The enclosed request.
    pub request: CallRequest,
    /// The node that sent this parcel.
    pub sender: Reference,
    /// Per-sender monotonic sequence number, echoed back in `ReturnResults`.
    pub sequence: u64,
    /// The pulse this parcel was produced at.
    pub pulse: PulseNumber,
}

/// A queue element as carried over the wire in `ExecutorResults.queue` (§4.4).
#[derive(Clone, Debug)]
pub struct WireQueueElement {
    /// The request this element was already durably registered under.
    pub request: Reference,
    /// The pulse this element was enqueued at.
    pub pulse: PulseNumber,
    /// The original parcel.
    pub parcel: Parcel,
}

/// Outbound message variants the core emits (§6).
#[derive(Clone, Debug)]
pub enum OutboundMessage {
    /// Delivers the outcome of a completed call back to the requester.
    ReturnResults {
        /// This node's reference.
        caller: Reference,
        /// The node the original call was made from.
        target: Reference,
        /// The sequence number echoed from the original parcel.
        sequence: u64,
        /// The opaque reply payload, if the call succeeded.
        reply: Vec<u8>,
        /// The error string, if the call failed.
        error: Option<String>,
    },
    /// Tells the new executor that the prior one is done executing a pending request.
    PendingFinished {
        /// The object this applies to.
        reference: Reference,
    },
    /// A best-effort heartbeat telling a waiting node this node is still executing.
    StillExecuting {
        /// The object this applies to.
        reference: Reference,
    },
    /// Transfers pending-ness and a drained queue to the next executor (§4.4).
    ExecutorResults {
        /// The object this applies to.
        reference: Reference,
        /// The pending state at handoff time.
        pending: Pending,
        /// The drained queue to replay on the new executor.
        queue: Vec<WireQueueElement>,
    },
}

/// Error returned when a send could not be delivered to the outbox (§7 "Transport").
#[derive(Debug, Fail)]
#[fail(display = "failed to send message: the logic runner is shutting down")]
pub struct SendError;

/// Outbound message sender.
///
/// All sends through this type are fire-and-forget from the caller's point of
/// view (§5, §9): the queue processor and pulse handler never await delivery,
/// only enqueueing onto the channel. Every failed send is logged by the
/// caller, never propagated further (§7 "Transport").
#[derive(Clone)]
pub struct MessageBus(mpsc::Sender<OutboundMessage>);

impl MessageBus {
    /// Wraps an existing channel sender.
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        MessageBus(sender)
    }

    /// Creates a bus paired with the receiver a transport would drain.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (MessageBus(tx), rx)
    }

    /// A sender that is not connected to anything and always fails to send.
    pub fn closed() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        MessageBus(tx)
    }

    /// Sends `message`, logging (not propagating) a failure.
    pub async fn send(&self, message: OutboundMessage) {
        if self.0.send(message).await.is_err() {
            log::error!("couldn't deliver outbound message: the logic runner is shutting down");
        }
    }
}
