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

//! In-memory fakes for the four collaborator interfaces (§6), shared by the
//! end-to-end scenario tests (§8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use logic_runner::artifact_manager::{ArtifactManager, CodeDescriptor, ObjectDescriptor};
use logic_runner::coordinator::{JetCoordinator, Role};
use logic_runner::error::{ArtifactManagerError, CoordinatorError};
use logic_runner::executor::{CodeExecutor, ExecutorCallError, LogicContext, MachineType, MethodCallOutcome};
use logic_runner::pulse::PulseNumber;
use logic_runner::reference::Reference;

#[allow(dead_code)]
pub fn reference(seed: u8) -> Reference {
    let mut record = [0u8; 32];
    record[0] = seed;
    Reference::new(record, [0u8; 32])
}

struct FakeState {
    next_seed: u8,
    objects: HashMap<Reference, ObjectDescriptor>,
    codes: HashMap<Reference, CodeDescriptor>,
    has_pending: bool,
    registered_requests: Vec<(Reference, Vec<u8>)>,
    update_calls: u32,
    deactivate_calls: u32,
    register_result_calls: u32,
    activate_calls: u32,
    last_register_result_object: Option<Reference>,
}

/// An in-memory stand-in for the ledger-resident artifact manager (§6).
pub struct FakeArtifactManager {
    inner: Mutex<FakeState>,
}

impl FakeArtifactManager {
    pub fn new(object: Reference, prototype: Reference, code: Reference, machine_type: MachineType, memory: Vec<u8>) -> Self {
        let mut objects = HashMap::new();
        objects.insert(
            object,
            ObjectDescriptor {
                head: object,
                memory,
                prototype,
                parent: None,
                code: Reference::empty(),
            },
        );
        objects.insert(
            prototype,
            ObjectDescriptor {
                head: prototype,
                memory: Vec::new(),
                prototype: Reference::empty(),
                parent: None,
                code,
            },
        );
        let mut codes = HashMap::new();
        codes.insert(
            code,
            CodeDescriptor {
                reference: code,
                machine_type,
            },
        );
        Self {
            inner: Mutex::new(FakeState {
                next_seed: 100,
                objects,
                codes,
                has_pending: false,
                registered_requests: Vec::new(),
                update_calls: 0,
                deactivate_calls: 0,
                register_result_calls: 0,
                activate_calls: 0,
                last_register_result_object: None,
            }),
        }
    }

    fn fresh_reference(state: &mut FakeState) -> Reference {
        let seed = state.next_seed;
        state.next_seed = state.next_seed.wrapping_add(1);
        reference(seed)
    }

    pub fn set_has_pending(&self, value: bool) {
        self.inner.lock().expect("fake lock poisoned").has_pending = value;
    }

    pub fn update_calls(&self) -> u32 {
        self.inner.lock().expect("fake lock poisoned").update_calls
    }

    pub fn deactivate_calls(&self) -> u32 {
        self.inner.lock().expect("fake lock poisoned").deactivate_calls
    }

    pub fn register_result_calls(&self) -> u32 {
        self.inner.lock().expect("fake lock poisoned").register_result_calls
    }

    #[allow(dead_code)]
    pub fn activate_calls(&self) -> u32 {
        self.inner.lock().expect("fake lock poisoned").activate_calls
    }

    pub fn registered_request_count(&self) -> usize {
        self.inner.lock().expect("fake lock poisoned").registered_requests.len()
    }

    pub fn last_register_result_object(&self) -> Option<Reference> {
        self.inner.lock().expect("fake lock poisoned").last_register_result_object
    }
}

#[async_trait]
impl ArtifactManager for FakeArtifactManager {
    async fn register_request(&self, object: Reference, payload: Vec<u8>) -> Result<Reference, ArtifactManagerError> {
        let mut state = self.inner.lock().expect("fake lock poisoned");
        state.registered_requests.push((object, payload));
        Ok(Self::fresh_reference(&mut state))
    }

    async fn register_result(&self, object: Reference, _request: Reference, _result: Vec<u8>) -> Result<Reference, ArtifactManagerError> {
        let mut state = self.inner.lock().expect("fake lock poisoned");
        state.register_result_calls += 1;
        state.last_register_result_object = Some(object);
        Ok(Self::fresh_reference(&mut state))
    }

    async fn has_pending_requests(&self, _object: Reference) -> Result<bool, ArtifactManagerError> {
        Ok(self.inner.lock().expect("fake lock poisoned").has_pending)
    }

    async fn get_object(&self, object: Reference) -> Result<ObjectDescriptor, ArtifactManagerError> {
        self.inner
            .lock()
            .expect("fake lock poisoned")
            .objects
            .get(&object)
            .cloned()
            .ok_or_else(|| ArtifactManagerError::Other("no such object".into()))
    }

    async fn get_code(&self, code: Reference) -> Result<CodeDescriptor, ArtifactManagerError> {
        self.inner
            .lock()
            .expect("fake lock poisoned")
            .codes
            .get(&code)
            .cloned()
            .ok_or_else(|| ArtifactManagerError::Other("no such code".into()))
    }

    async fn update_object(&self, object: ObjectDescriptor, _request: Reference, new_memory: Vec<u8>) -> Result<ObjectDescriptor, ArtifactManagerError> {
        let mut state = self.inner.lock().expect("fake lock poisoned");
        state.update_calls += 1;
        let updated = ObjectDescriptor { memory: new_memory, ..object };
        state.objects.insert(updated.head, updated.clone());
        Ok(updated)
    }

    async fn deactivate_object(&self, object: ObjectDescriptor, _request: Reference) -> Result<Reference, ArtifactManagerError> {
        let mut state = self.inner.lock().expect("fake lock poisoned");
        state.deactivate_calls += 1;
        state.objects.remove(&object.head);
        Ok(Self::fresh_reference(&mut state))
    }

    async fn activate_object(&self, _request: Reference, _parent: Reference, _prototype: Reference, _is_delegate: bool, _memory: Vec<u8>) -> Result<Reference, ArtifactManagerError> {
        let mut state = self.inner.lock().expect("fake lock poisoned");
        state.activate_calls += 1;
        Ok(Self::fresh_reference(&mut state))
    }
}

/// A coordinator whose answer to `is_authorized` can be flipped mid-test to
/// simulate a pulse boundary reassigning the executor role.
pub struct FakeCoordinator {
    me: Reference,
    authorized: AtomicBool,
}

impl FakeCoordinator {
    pub fn new(me: Reference) -> Self {
        Self {
            me,
            authorized: AtomicBool::new(true),
        }
    }

    pub fn set_authorized(&self, value: bool) {
        self.authorized.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl JetCoordinator for FakeCoordinator {
    async fn is_authorized(&self, _role: Role, _object: Reference, _pulse: PulseNumber, _me: Reference) -> Result<bool, CoordinatorError> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    fn me(&self) -> Reference {
        self.me
    }
}

/// An executor that echoes its input memory/arguments back, optionally after
/// an artificial delay — long enough for a test to observe a call mid-flight.
pub struct EchoExecutor {
    calls: AtomicU32,
    delay: Duration,
}

impl EchoExecutor {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay: Duration::from_millis(0),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay,
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExecutor for EchoExecutor {
    async fn call_method(&self, _context: LogicContext, _code: Reference, memory: Vec<u8>, _method: String, args: Vec<u8>) -> Result<MethodCallOutcome, ExecutorCallError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MethodCallOutcome {
            new_memory: memory,
            result: args,
            deactivate: false,
        })
    }

    async fn call_constructor(&self, _context: LogicContext, _code: Reference, _name: String, args: Vec<u8>) -> Result<Vec<u8>, ExecutorCallError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(args)
    }

    async fn stop(&self) {}
}

/// An executor whose every method call requests self-destruction, exercising
/// the deactivation path (§4.3 step 3's `deactivate` branch) without a
/// caller being able to force it from the inbound message.
#[derive(Default)]
pub struct SelfDestructingExecutor;

impl SelfDestructingExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CodeExecutor for SelfDestructingExecutor {
    async fn call_method(&self, _context: LogicContext, _code: Reference, memory: Vec<u8>, _method: String, args: Vec<u8>) -> Result<MethodCallOutcome, ExecutorCallError> {
        Ok(MethodCallOutcome {
            new_memory: memory,
            result: args,
            deactivate: true,
        })
    }

    async fn call_constructor(&self, _context: LogicContext, _code: Reference, _name: String, args: Vec<u8>) -> Result<Vec<u8>, ExecutorCallError> {
        Ok(args)
    }

    async fn stop(&self) {}
}
