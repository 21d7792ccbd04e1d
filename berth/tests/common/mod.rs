//! Test helpers for berth integration tests.
//!
//! `FakeRuntime` keeps containers in memory, records every call and can be
//! told to fail, hang or block specific operations.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use berth::catalog::Catalog;
use berth::definition::{ContainerSpec, ResourceDefinition, VERSION_LABEL};
use berth::error::{Result, RuntimeError};
use berth::runtime::{ObservedState, RuntimeClient};
use berth::{Context, DefinitionProvider, Registry};
use tokio::sync::Semaphore;

/// A runtime call as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String),
    Create { name: String, version: String },
    Start(String),
    Stop(String),
    Remove { name: String, force: bool },
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    running: bool,
    version: String,
}

#[derive(Default)]
struct State {
    containers: HashMap<String, FakeContainer>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<RuntimeError>>,
    hangs: HashSet<&'static str>,
    holds: HashMap<&'static str, Arc<Semaphore>>,
    next_id: u32,
}

/// In-memory container engine.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose `inspect` waits for [`FakeRuntime::open_gate`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Let `n` more inspect calls through the gate.
    pub fn open_gate(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Seed an existing container.
    pub fn with_container(self, name: &str, version: &str, running: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("existing-{}", state.next_id);
            state.containers.insert(
                name.to_string(),
                FakeContainer {
                    id,
                    running,
                    version: version.to_string(),
                },
            );
        }
        self
    }

    /// Stop a container behind the supervisor's back.
    pub fn kill(&self, name: &str) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.running = false;
        }
    }

    /// Delete a container behind the supervisor's back.
    pub fn delete(&self, name: &str) {
        self.state.lock().unwrap().containers.remove(name);
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: RuntimeError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make the next call of `op` never complete.
    pub fn hang_next(&self, op: &'static str) {
        self.state.lock().unwrap().hangs.insert(op);
    }

    /// Make the next call of `op` wait until a permit is added to the
    /// returned semaphore, then proceed normally.
    pub fn block_next(&self, op: &'static str) -> Arc<Semaphore> {
        let release = Arc::new(Semaphore::new(0));
        self.state
            .lock()
            .unwrap()
            .holds
            .insert(op, Arc::clone(&release));
        release
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every call except inspect.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Inspect(_)))
            .collect()
    }

    pub fn inspect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Inspect(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// `(version, running)` of a container, if it exists.
    pub fn container(&self, name: &str) -> Option<(String, bool)> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| (c.version.clone(), c.running))
    }

    /// Record the call and take the injected behaviour for `op`.
    fn enter(&self, op: &'static str, call: Call) -> Injected {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.hangs.remove(op) {
            return Injected::Hang;
        }
        if let Some(release) = state.holds.remove(op) {
            return Injected::Hold(release);
        }
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Injected::Fail(error),
            None => Injected::Proceed,
        }
    }
}

enum Injected {
    Proceed,
    Fail(RuntimeError),
    Hang,
    Hold(Arc<Semaphore>),
}

async fn injected(outcome: Injected) -> Result<()> {
    match outcome {
        Injected::Proceed => Ok(()),
        Injected::Fail(error) => Err(error),
        Injected::Hang => std::future::pending().await,
        Injected::Hold(release) => {
            release.acquire().await.unwrap().forget();
            Ok(())
        }
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn inspect(&self, name: &str) -> Result<ObservedState> {
        let outcome = self.enter("inspect", Call::Inspect(name.to_string()));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        injected(outcome).await?;

        let state = self.state.lock().unwrap();
        let container = state
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        Ok(ObservedState {
            id: container.id.clone(),
            running: container.running,
            labels: HashMap::from([(VERSION_LABEL.to_string(), container.version.clone())]),
        })
    }

    async fn create(&self, name: &str, definition: &ResourceDefinition) -> Result<String> {
        let outcome = self.enter(
            "create",
            Call::Create {
                name: name.to_string(),
                version: definition.version.clone(),
            },
        );
        injected(outcome).await?;

        let mut state = self.state.lock().unwrap();
        if state.containers.contains_key(name) {
            return Err(RuntimeError::Engine {
                op: "create",
                message: format!("name {name} already in use"),
            });
        }
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                id: id.clone(),
                running: false,
                version: definition.version.clone(),
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let outcome = self.enter("start", Call::Start(id.to_string()));
        injected(outcome).await?;

        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .values_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        container.running = true;
        Ok(())
    }

    async fn stop(&self, name: &str, _timeout: Option<Duration>) -> Result<()> {
        let outcome = self.enter("stop", Call::Stop(name.to_string()));
        injected(outcome).await?;

        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.running = false;
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let outcome = self.enter(
            "remove",
            Call::Remove {
                name: name.to_string(),
                force,
            },
        );
        injected(outcome).await?;

        let mut state = self.state.lock().unwrap();
        match state.containers.get(name).map(|c| c.running) {
            None => Err(RuntimeError::NotFound(name.to_string())),
            Some(true) if !force => Err(RuntimeError::Engine {
                op: "remove",
                message: "container is running".to_string(),
            }),
            Some(_) => {
                state.containers.remove(name);
                Ok(())
            }
        }
    }
}

pub fn definition(name: &str, version: &str) -> ResourceDefinition {
    ResourceDefinition::with_version(
        name,
        version,
        ContainerSpec {
            image: format!("example/{name}:{version}"),
            ..Default::default()
        },
    )
}

pub fn transient(op: &'static str) -> RuntimeError {
    RuntimeError::Engine {
        op,
        message: "Cannot connect to the Docker daemon".to_string(),
    }
}

/// Everything a supervisor test needs.
pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub catalog: Arc<Catalog>,
    pub ctx: Arc<Context>,
    pub registry: Registry,
}

impl Harness {
    pub fn new(runtime: FakeRuntime) -> Self {
        Self::with_settings(runtime, Duration::from_secs(60), None)
    }

    pub fn with_settings(
        runtime: FakeRuntime,
        interval: Duration,
        call_timeout: Option<Duration>,
    ) -> Self {
        let runtime = Arc::new(runtime);
        let catalog = Arc::new(Catalog::new());
        let ctx = Arc::new(Context {
            runtime: Arc::clone(&runtime) as Arc<dyn RuntimeClient>,
            provider: Arc::clone(&catalog) as Arc<dyn DefinitionProvider>,
            interval,
            call_timeout,
        });
        let registry = Registry::new(Arc::clone(&ctx));
        Self {
            runtime,
            catalog,
            ctx,
            registry,
        }
    }
}

/// Let spawned tasks run until they are idle. Needs a paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Poll `cond` until it holds, failing the test after a few (virtual) seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
