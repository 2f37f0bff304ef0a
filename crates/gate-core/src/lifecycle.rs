//! Priority-ordered startup and shutdown of initializers and servers.
//!
//! Initializers come up before servers; within each group the lowest
//! priority starts first. Shutdown runs the exact reverse. A failing
//! `initialize`/`start` hook aborts the sequence; a failing `stop` hook is
//! logged and the remaining components are still stopped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::LifecycleError;

/// Priority used when a component does not pick one.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Handed to every hook.
#[derive(Clone, Debug)]
pub struct LifecycleContext {
    shutdown: CancellationToken,
}

impl LifecycleContext {
    /// Token cancelled when `stop` begins. Long-running work should watch it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// A subsystem that participates in startup and shutdown.
#[async_trait]
pub trait Initializer: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Lower runs earlier on the way up and later on the way down.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// One-time preparation.
    async fn initialize(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Begin work. Must not block for the lifetime of the component.
    async fn start(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources.
    async fn stop(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A network-facing component, started after all initializers.
#[async_trait]
pub trait Server: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Lower runs earlier on the way up and later on the way down.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Build routes, bind resources.
    async fn initialize(&self, ctx: &LifecycleContext) -> anyhow::Result<()>;

    /// Start accepting traffic. Must return once serving has begun.
    async fn start(&self, ctx: &LifecycleContext) -> anyhow::Result<()>;

    /// Stop accepting traffic and drain.
    async fn stop(&self, ctx: &LifecycleContext) -> anyhow::Result<()>;
}

/// Orchestrator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Nothing has run yet.
    Created,
    /// `initialize` in progress.
    Initializing,
    /// All `initialize` hooks succeeded.
    Initialized,
    /// `start` in progress.
    Starting,
    /// `start` returned (successfully or not); `stop` is allowed.
    Running,
    /// `stop` in progress.
    Stopping,
    /// Terminal.
    Stopped,
}

#[derive(Clone)]
enum Component {
    Initializer(Arc<dyn Initializer>),
    Server(Arc<dyn Server>),
}

impl Component {
    fn name(&self) -> &str {
        match self {
            Self::Initializer(c) => c.name(),
            Self::Server(c) => c.name(),
        }
    }

    async fn run(&self, phase: Phase, ctx: &LifecycleContext) -> anyhow::Result<()> {
        match (self, phase) {
            (Self::Initializer(c), Phase::Initialize) => c.initialize(ctx).await,
            (Self::Initializer(c), Phase::Start) => c.start(ctx).await,
            (Self::Initializer(c), Phase::Stop) => c.stop(ctx).await,
            (Self::Server(c), Phase::Initialize) => c.initialize(ctx).await,
            (Self::Server(c), Phase::Start) => c.start(ctx).await,
            (Self::Server(c), Phase::Stop) => c.stop(ctx).await,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Initialize,
    Start,
    Stop,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Drives registered components through `Created → Initialized → Running → Stopped`.
pub struct Orchestrator {
    initializers: RwLock<Vec<Arc<dyn Initializer>>>,
    servers: RwLock<Vec<Arc<dyn Server>>>,
    state: Mutex<State>,
    ctx: LifecycleContext,
}

impl Orchestrator {
    /// Create an empty orchestrator.
    pub fn new() -> Self {
        Self {
            initializers: RwLock::new(Vec::new()),
            servers: RwLock::new(Vec::new()),
            state: Mutex::new(State::Created),
            ctx: LifecycleContext {
                shutdown: CancellationToken::new(),
            },
        }
    }

    /// Add an initializer.
    pub fn register_initializer(&self, initializer: Arc<dyn Initializer>) {
        debug!(name = initializer.name(), priority = initializer.priority(), "initializer registered");
        self.initializers.write().push(initializer);
    }

    /// Add a server.
    pub fn register_server(&self, server: Arc<dyn Server>) {
        debug!(name = server.name(), priority = server.priority(), "server registered");
        self.servers.write().push(server);
    }

    /// Current state.
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Whether `start` has run and `stop` has not.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), State::Running)
    }

    /// Token cancelled when `stop` begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.ctx.shutdown.clone()
    }

    /// Run every `initialize` hook in ascending priority order.
    ///
    /// On failure the state returns to `Created` so the call can be retried.
    pub async fn initialize(&self) -> Result<(), LifecycleError> {
        self.transition(|state| match state {
            State::Created => Ok(State::Initializing),
            State::Initializing | State::Initialized => Err(LifecycleError::AlreadyInitialized),
            State::Starting | State::Running => Err(LifecycleError::AlreadyRunning),
            State::Stopping | State::Stopped => Err(LifecycleError::Stopped),
        })?;

        let result = self.run_forward(Phase::Initialize).await;
        self.set_state(if result.is_ok() {
            State::Initialized
        } else {
            State::Created
        });
        if result.is_ok() {
            info!("api initialized");
        }
        result
    }

    /// Run every `start` hook in ascending priority order.
    ///
    /// The state becomes `Running` even if a hook fails, so that `stop` can
    /// tear down whatever did come up.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.transition(|state| match state {
            State::Created | State::Initializing => Err(LifecycleError::NotInitialized),
            State::Initialized => Ok(State::Starting),
            State::Starting | State::Running => Err(LifecycleError::AlreadyRunning),
            State::Stopping | State::Stopped => Err(LifecycleError::Stopped),
        })?;

        let result = self.run_forward(Phase::Start).await;
        self.set_state(State::Running);
        if result.is_ok() {
            info!("api started");
        }
        result
    }

    /// Cancel the shared token, then run every `stop` hook in descending
    /// priority order. Hook failures are logged and do not stop the sweep.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.transition(|state| match state {
            State::Running => Ok(State::Stopping),
            _ => Err(LifecycleError::NotRunning),
        })?;

        self.ctx.shutdown.cancel();

        let mut failures = 0_usize;
        for component in self.ordered().into_iter().rev() {
            debug!(name = component.name(), "stopping");
            if let Err(source) = component.run(Phase::Stop, &self.ctx).await {
                failures += 1;
                error!(name = component.name(), error = %source, "failed to stop component");
            }
        }

        self.set_state(State::Stopped);
        info!(failures, "api stopped");
        Ok(())
    }

    async fn run_forward(&self, phase: Phase) -> Result<(), LifecycleError> {
        for component in self.ordered() {
            debug!(name = component.name(), phase = phase.as_str(), "running hook");
            component
                .run(phase, &self.ctx)
                .await
                .map_err(|source| LifecycleError::Component {
                    phase: phase.as_str(),
                    name: component.name().to_owned(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Initializers then servers, each group stable-sorted by priority.
    fn ordered(&self) -> Vec<Component> {
        let mut initializers = self.initializers.read().clone();
        initializers.sort_by_key(|c| c.priority());
        let mut servers = self.servers.read().clone();
        servers.sort_by_key(|c| c.priority());

        initializers
            .into_iter()
            .map(Component::Initializer)
            .chain(servers.into_iter().map(Component::Server))
            .collect()
    }

    fn transition(
        &self,
        f: impl FnOnce(State) -> Result<State, LifecycleError>,
    ) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        *state = f(*state)?;
        Ok(())
    }

    fn set_state(&self, next: State) {
        *self.state.lock() = next;
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("initializers", &self.initializers.read().len())
            .field("servers", &self.servers.read().len())
            .finish()
    }
}
