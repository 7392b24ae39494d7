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

//! The validation/recording hook (§4.2's `behaviour` field, §9's design note).
//!
//! A recording behaviour captures the sequence of calls made during an
//! execution (the "case-bind") so that a surrounding agreement protocol can
//! later re-run the same sequence on another node for validation. A
//! replaying behaviour instead verifies that a re-run produces the same
//! results. Both are outside this crate's tight contract (§4.5 notes the
//! validation message handlers "mirror" execution structurally but are not
//! part of the core); what the core needs is just the two call points this
//! trait exposes.

use crate::reference::Reference;

/// Whether a call is a first execution or a re-validation replay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallMode {
    /// Recording a fresh execution.
    Execution,
    /// Replaying a previously recorded execution for agreement.
    Validation,
}

/// One call captured by a recording behaviour.
#[derive(Clone, Debug)]
pub struct CaseBindEntry {
    /// The request this call was made for.
    pub request: Reference,
    /// The opaque result recorded for the call, if it completed.
    pub result: Option<Vec<u8>>,
    /// The error string recorded for the call, if it failed.
    pub error: Option<String>,
}

/// The sequence of calls captured during a recording execution.
#[derive(Clone, Debug, Default)]
pub struct CaseBind {
    entries: Vec<CaseBindEntry>,
}

impl CaseBind {
    /// An empty case-bind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fresh, not-yet-completed entry for `request`.
    pub fn push_request(&mut self, request: Reference) {
        self.entries.push(CaseBindEntry {
            request,
            result: None,
            error: None,
        });
    }

    /// Records the outcome of the most recently pushed request.
    pub fn record_result(&mut self, result: Option<Vec<u8>>, error: Option<String>) {
        if let Some(last) = self.entries.last_mut() {
            last.result = result;
            last.error = error;
        }
    }

    /// The captured entries, in call order.
    pub fn entries(&self) -> &[CaseBindEntry] {
        &self.entries
    }
}

/// Pluggable hook invoked at request-record and result-record points (§9).
///
/// Tagged by the two variants a concrete implementation falls into:
/// `ExecutionRecording` captures calls as they happen; `ValidationReplaying`
/// checks a replay's results against a previously captured case-bind.
pub trait ValidationBehaviour: Send + Sync {
    /// Which mode this behaviour operates in.
    fn mode(&self) -> CallMode;

    /// Called when a new request begins executing under this behaviour.
    fn new_request(&self, request: Reference);

    /// Called when the request most recently started has produced a result or error.
    fn result(&self, result: Option<Vec<u8>>, error: Option<String>);
}

/// A behaviour that records every call into an in-memory [`CaseBind`].
pub struct ExecutionRecording {
    case_bind: std::sync::Mutex<CaseBind>,
}

impl ExecutionRecording {
    /// A fresh recorder with an empty case-bind.
    pub fn new() -> Self {
        Self {
            case_bind: std::sync::Mutex::new(CaseBind::new()),
        }
    }
}

impl Default for ExecutionRecording {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationBehaviour for ExecutionRecording {
    fn mode(&self) -> CallMode {
        CallMode::Execution
    }

    fn new_request(&self, request: Reference) {
        self.case_bind
            .lock()
            .expect("case bind lock poisoned")
            .push_request(request);
    }

    fn result(&self, result: Option<Vec<u8>>, error: Option<String>) {
        self.case_bind
            .lock()
            .expect("case bind lock poisoned")
            .record_result(result, error);
    }
}

/// A behaviour that replays a previously recorded case-bind for re-validation.
///
/// The core's tight contract (§4.5) doesn't specify how replay comparison is
/// performed; this type only tracks which mode it reports, leaving the
/// comparison itself to the surrounding agreement protocol (out of scope, §1).
pub struct ValidationReplaying;

impl ValidationBehaviour for ValidationReplaying {
    fn mode(&self) -> CallMode {
        CallMode::Validation
    }

    fn new_request(&self, _request: Reference) {}

    fn result(&self, _result: Option<Vec<u8>>, _error: Option<String>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(seed: u8) -> Reference {
        let mut record = [0u8; 32];
        record[0] = seed;
        Reference::new(record, [0u8; 32])
    }

    #[test]
    fn recording_behaviour_reports_execution_mode() {
        let recorder = ExecutionRecording::new();
        assert_eq!(recorder.mode(), CallMode::Execution);
        recorder.new_request(reference(1));
        recorder.result(Some(b"ok".to_vec()), None);
    }

    #[test]
    fn case_bind_tracks_request_then_result() {
        let mut bind = CaseBind::new();
        bind.push_request(reference(1));
        bind.record_result(Some(b"ok".to_vec()), None);

        assert_eq!(bind.entries().len(), 1);
        assert_eq!(bind.entries()[0].result, Some(b"ok".to_vec()));
        assert!(bind.entries()[0].error.is_none());
    }

    #[test]
    fn replaying_behaviour_is_inert() {
        let replaying = ValidationReplaying;
        assert_eq!(replaying.mode(), CallMode::Validation);
        replaying.new_request(reference(1));
        replaying.result(None, Some("boom".into()));
    }
}
