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

//! Error module.

use failure::Fail;

use crate::reference::Reference;

/// Errors raised by the artifact manager client interface (§6, §7 "Ledger").
#[derive(Debug, Fail)]
pub enum ArtifactManagerError {
    /// The sentinel the original implementation matched by string ("invalid state record").
    ///
    /// Receiving this from `UpdateObject` invalidates the cached object body so the next
    /// call refetches descriptors from scratch.
    #[fail(display = "invalid state record")]
    InvalidStateRecord,
    /// Any other failure reported by the collaborator (network, serialization, etc).
    #[fail(display = "artifact manager error: {}", _0)]
    Other(String),
}

/// Errors raised by the jet coordinator client interface (§6).
#[derive(Debug, Fail)]
pub enum CoordinatorError {
    /// The coordinator RPC itself failed (as opposed to returning `false`).
    #[fail(display = "authorization check failed: {}", _0)]
    CheckFailed(String),
}

/// Metadata-carrying wrapper for an error that happened while executing a contract call.
///
/// Mirrors the original implementation's `Error{Err, Request, Contract, Method}`: the
/// underlying error message, plus the request/contract/method the error happened under,
/// so that `ReturnResults.error` carries enough context to debug without a stack trace.
/// `Fail` is derived from `Debug + Display + Send + Sync + 'static` via failure's blanket
/// impl, so a plain `Display` implementation below is all this type needs.
#[derive(Debug)]
pub struct ExecutionError {
    message: String,
    contract: Option<Reference>,
    method: Option<String>,
    request: Option<Reference>,
}

impl ExecutionError {
    /// Wraps a plain message with no context yet attached.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            contract: None,
            method: None,
            request: None,
        }
    }

    /// Attaches the contract (object) reference the error occurred against.
    pub fn with_contract(mut self, contract: Reference) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Attaches the method name the error occurred in.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Attaches the request reference the error occurred under.
    pub fn with_request(mut self, request: Reference) -> Self {
        self.request = Some(request);
        self
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(contract) = &self.contract {
            write!(f, " Contract={}", contract)?;
        }
        if let Some(method) = &self.method {
            write!(f, " Method={}", method)?;
        }
        if let Some(request) = &self.request {
            write!(f, " Request={}", request)?;
        }
        Ok(())
    }
}

/// Top-level error kinds raised synchronously by message handlers (§7).
#[derive(Debug, Fail)]
pub enum LogicRunnerError {
    /// Failed role check (§4.5, §7 "Authorization"). Never queued.
    #[fail(display = "not authorized to execute object {}", _0)]
    NotAuthorized(Reference),
    /// Loop detector tripped (§4.2, §7 "Loop").
    #[fail(display = "loop detected")]
    LoopDetected,
    /// Artifact-manager RPC failure while registering a request (§7 "Registration").
    #[fail(display = "failed to register request: {}", _0)]
    Registration(#[cause] ArtifactManagerError),
    /// Protocol violation such as `PendingFinished` arriving while `current` is set (§7 "Protocol").
    #[fail(display = "protocol violation: {}", _0)]
    Protocol(String),
    /// The coordinator RPC failed outright.
    #[fail(display = "{}", _0)]
    Coordinator(#[cause] CoordinatorError),
}

impl From<CoordinatorError> for LogicRunnerError {
    fn from(e: CoordinatorError) -> Self {
        LogicRunnerError::Coordinator(e)
    }
}
