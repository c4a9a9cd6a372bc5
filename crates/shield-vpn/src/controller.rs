//! Tunnel Lifecycle Controller
//!
//! Owns the tunnel state machine and serializes every state-changing
//! request against a single engine session.
//!
//! The controller is an actor: one task owns the engine, the host, and
//! the state. User commands, engine callbacks, and reachability events
//! are queued into that task and handled one at a time, so they never
//! race on shared state.
//!
//! # Usage
//!
//! ```rust,ignore
//! let controller = TunnelController::spawn(engine, host, ControllerConfig::default())?;
//!
//! // Synchronous precondition errors come back from `start`,
//! // the negotiation outcome from the pending handle.
//! let pending = controller.start(config).await?;
//! pending.wait().await?;
//!
//! // Feed network path changes
//! monitor.register(controller.path_listener());
//!
//! controller.stop().await;
//! ```

use crate::config::{ConfigError, ControllerConfig, TunnelConfiguration};
use crate::deep_link::DeepLink;
use crate::engine::{
    EngineError, EngineEvent, EngineEvents, EngineReceivers, NetworkSettings, TunnelEngine,
};
use crate::host::{HostError, TunnelHost};
use crate::reachability::{NetworkPathStatus, PathListener};
use crate::state::{TunnelState, TunnelStatus};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Tunnel errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine requires credentials but none were provided")]
    MissingCredentials,

    #[error("Tunnel already active")]
    AlreadyActive,

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Host(String),

    #[error("Start cancelled")]
    Cancelled,

    #[error("Engine negotiation timed out")]
    Timeout,

    #[error("Tunnel controller is not running")]
    ControllerClosed,
}

impl From<ConfigError> for TunnelError {
    fn from(e: ConfigError) -> Self {
        TunnelError::Configuration(e.to_string())
    }
}

impl From<HostError> for TunnelError {
    fn from(e: HostError) -> Self {
        TunnelError::Host(e.to_string())
    }
}

type Completion = oneshot::Sender<Result<(), TunnelError>>;

/// Commands accepted by the controller task
enum Command {
    Start {
        config: TunnelConfiguration,
        reply: oneshot::Sender<Result<PendingStart, TunnelError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<TunnelStatus>,
    },
}

/// Outcome of a `start` whose negotiation is still running
///
/// Resolves exactly once: success when the tunnel comes up, otherwise
/// the engine error, `Cancelled` (stopped meanwhile) or `Timeout`.
#[derive(Debug)]
pub struct PendingStart {
    rx: oneshot::Receiver<Result<(), TunnelError>>,
}

impl PendingStart {
    /// Wait for the negotiation outcome
    pub async fn wait(self) -> Result<(), TunnelError> {
        self.rx.await.unwrap_or(Err(TunnelError::ControllerClosed))
    }
}

/// Handle to the tunnel lifecycle controller
///
/// Cheap to clone; every clone talks to the same controller task.
#[derive(Debug, Clone)]
pub struct TunnelController {
    command_tx: mpsc::Sender<Command>,
    path_tx: mpsc::UnboundedSender<NetworkPathStatus>,
    status_rx: watch::Receiver<TunnelStatus>,
}

impl TunnelController {
    /// Spawn the controller task on the current tokio runtime
    pub fn spawn<E, H>(mut engine: E, host: H, config: ControllerConfig) -> Result<Self, TunnelError>
    where
        E: TunnelEngine,
        H: TunnelHost,
    {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (path_tx, path_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(TunnelStatus::idle());
        let (events, receivers) = EngineEvents::channel();

        engine.attach(events);

        let actor = ControllerActor {
            engine,
            host,
            config,
            status_tx,
            state: TunnelState::Idle,
            active: None,
            pending: None,
            deadline: None,
            last_path: NetworkPathStatus::Unknown,
            connected_since: None,
        };
        tokio::spawn(actor.run(command_rx, receivers, path_rx));

        Ok(Self {
            command_tx,
            path_tx,
            status_rx,
        })
    }

    /// Start a session
    ///
    /// Precondition and configuration errors are returned immediately
    /// without touching the state. On success the tunnel is `Connecting`
    /// and the returned handle resolves with the negotiation outcome.
    pub async fn start(&self, config: TunnelConfiguration) -> Result<PendingStart, TunnelError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { config, reply }).await?;
        rx.await.map_err(|_| TunnelError::ControllerClosed)?
    }

    /// Start a session and wait until it is connected or has failed
    pub async fn start_and_wait(&self, config: TunnelConfiguration) -> Result<(), TunnelError> {
        self.start(config).await?.wait().await
    }

    /// Stop the session
    ///
    /// Valid from any state; a no-op while idle. Returns once the
    /// teardown has been requested, not when the engine confirms it.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Stop { reply }).await.is_err() || rx.await.is_err() {
            debug!("Stop ignored, controller not running");
        }
    }

    /// Handle a deep link opened by the OS
    ///
    /// Returns whether the link was recognised.
    pub async fn open_url(&self, url: &str) -> bool {
        match DeepLink::parse(url) {
            Some(DeepLink::Disconnect) => {
                info!("Disconnect requested via deep link");
                self.stop().await;
                true
            }
            None => {
                debug!("Ignoring unrecognised deep link: {}", url);
                false
            }
        }
    }

    /// Queue a network path change
    pub fn on_path_changed(&self, status: NetworkPathStatus) {
        if self.path_tx.send(status).is_err() {
            debug!("Path change dropped, controller not running");
        }
    }

    /// Listener to register with a reachability monitor
    pub fn path_listener(&self) -> PathListener {
        PathListener::new(self.path_tx.clone())
    }

    /// Latest published status
    pub fn status(&self) -> TunnelStatus {
        self.status_rx.borrow().clone()
    }

    /// Latest published state
    pub fn state(&self) -> TunnelState {
        self.status_rx.borrow().state.clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<TunnelStatus> {
        self.status_rx.clone()
    }

    /// Status after every event queued so far has been handled
    ///
    /// Engine log lines are not waited for; they never change state.
    pub async fn snapshot(&self) -> Result<TunnelStatus, TunnelError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| TunnelError::ControllerClosed)
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> Result<TunnelState, TunnelError>
    where
        F: FnMut(&TunnelState) -> bool,
    {
        let mut rx = self.status_rx.clone();
        let state = rx
            .wait_for(|status| predicate(&status.state))
            .await
            .map_err(|_| TunnelError::ControllerClosed)?
            .state
            .clone();
        Ok(state)
    }

    async fn send(&self, command: Command) -> Result<(), TunnelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TunnelError::ControllerClosed)
    }
}

/// State owned by the controller task
struct ControllerActor<E, H> {
    engine: E,
    host: H,
    config: ControllerConfig,
    status_tx: watch::Sender<TunnelStatus>,
    state: TunnelState,
    /// Configuration bound to the live or pending session
    active: Option<TunnelConfiguration>,
    /// Completion of the `start` currently negotiating
    pending: Option<Completion>,
    /// Negotiation or teardown deadline
    deadline: Option<Instant>,
    last_path: NetworkPathStatus,
    connected_since: Option<std::time::Instant>,
}

impl<E: TunnelEngine, H: TunnelHost> ControllerActor<E, H> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        receivers: EngineReceivers,
        mut paths: mpsc::UnboundedReceiver<NetworkPathStatus>,
    ) {
        let EngineReceivers {
            mut events,
            mut logs,
        } = receivers;
        debug!("Tunnel controller started");

        loop {
            let deadline = self.deadline;

            tokio::select! {
                biased;

                Some(event) = events.recv() => self.handle_event(event),
                Some(status) = paths.recv() => self.handle_path(status),
                _ = sleep_until(deadline) => self.handle_deadline(),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = logs.recv() => {
                    info!(target: "shield_vpn::engine", "{}", message);
                }
            }
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => {
                let _ = reply.send(self.handle_start(config));
            }
            Command::Stop { reply } => {
                self.handle_stop();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.status_tx.borrow().clone());
            }
        }
    }

    fn handle_start(&mut self, config: TunnelConfiguration) -> Result<PendingStart, TunnelError> {
        if !self.state.accepts_start() {
            warn!("Start rejected while {}", self.state);
            return Err(TunnelError::AlreadyActive);
        }

        let evaluation = self
            .engine
            .apply(&config)
            .map_err(|e| TunnelError::Configuration(e.to_string()))?;

        if evaluation.requires_credentials() {
            let credentials = config.credentials().ok_or(TunnelError::MissingCredentials)?;
            self.engine.provide_credentials(credentials)?;
        }

        if self.state.is_failed() {
            self.transition(TunnelState::Idle);
        }

        info!(
            "Starting tunnel ({})",
            config.label().unwrap_or("unlabelled configuration")
        );

        let (completion, rx) = oneshot::channel();
        self.pending = Some(completion);
        self.active = Some(config);
        self.deadline = Some(Instant::now() + self.config.negotiation_timeout());
        self.transition(TunnelState::Connecting);
        self.engine.connect();

        Ok(PendingStart { rx })
    }

    fn handle_stop(&mut self) {
        match self.state {
            TunnelState::Idle | TunnelState::Disconnecting => {
                debug!("Stop ignored while {}", self.state);
            }
            TunnelState::Failed(_) => {
                self.active = None;
                self.transition(TunnelState::Idle);
            }
            TunnelState::Connecting | TunnelState::Reconnecting => {
                info!("Cancelling negotiation");
                self.resolve_pending(Err(TunnelError::Cancelled));
                self.begin_teardown();
            }
            TunnelState::Connected => self.begin_teardown(),
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::NetworkSettings { settings, ack } => self.handle_settings(settings, ack),
            EngineEvent::Failed(e) => {
                if self.state.is_negotiating() || self.state.is_connected() {
                    self.fail(TunnelError::Engine(e), false);
                } else {
                    debug!("Ignoring engine failure while {}: {}", self.state, e);
                }
            }
            EngineEvent::Disconnected => match self.state {
                TunnelState::Disconnecting => self.finish_teardown(),
                TunnelState::Connecting | TunnelState::Reconnecting | TunnelState::Connected => {
                    self.fail(TunnelError::Engine(EngineError::ConnectionLost), false);
                }
                _ => debug!("Ignoring engine disconnect while {}", self.state),
            },
        }
    }

    fn handle_settings(&mut self, settings: NetworkSettings, ack: Completion) {
        if !self.state.is_negotiating() && !self.state.is_connected() {
            debug!("Refusing network settings while {}", self.state);
            let _ = ack.send(Err(TunnelError::Cancelled));
            return;
        }

        debug!(
            "Applying network settings (remote: {}, {} routes, {} DNS servers)",
            settings.remote_address,
            settings.included_routes.len(),
            settings.dns_servers.len()
        );

        if let Err(e) = self.host.set_network_settings(&settings) {
            let _ = ack.send(Err(e.clone().into()));
            self.fail(e.into(), true);
            return;
        }
        let _ = ack.send(Ok(()));

        if self.state.is_negotiating() {
            self.deadline = None;
            self.connected_since = Some(std::time::Instant::now());
            self.transition(TunnelState::Connected);
            self.resolve_pending(Ok(()));
        }
    }

    fn handle_path(&mut self, status: NetworkPathStatus) {
        let previous = std::mem::replace(&mut self.last_path, status);
        info!("Network path changed: {:?} -> {:?}", previous, status);

        let regained_wifi = status == NetworkPathStatus::WiFi
            && matches!(
                previous,
                NetworkPathStatus::Cellular | NetworkPathStatus::Unreachable
            );

        if regained_wifi && self.config.reconnect_on_wifi_regain && self.state.is_connected() {
            let delay = self.config.reconnect_delay();
            info!("Wi-Fi regained, reconnecting in {:?}", delay);

            self.deadline = Some(Instant::now() + delay + self.config.negotiation_timeout());
            self.transition(TunnelState::Reconnecting);
            self.engine.reconnect(delay);
        }
    }

    fn handle_deadline(&mut self) {
        self.deadline = None;

        match self.state {
            TunnelState::Connecting | TunnelState::Reconnecting => {
                warn!("Engine negotiation timed out");
                self.fail(TunnelError::Timeout, true);
            }
            TunnelState::Disconnecting => {
                warn!("Engine did not confirm teardown, forcing idle");
                self.finish_teardown();
            }
            _ => {}
        }
    }

    fn begin_teardown(&mut self) {
        self.deadline = Some(Instant::now() + self.config.teardown_timeout());
        self.transition(TunnelState::Disconnecting);
        self.engine.disconnect();
    }

    fn finish_teardown(&mut self) {
        self.deadline = None;
        self.host.clear_network_settings();
        self.active = None;
        self.connected_since = None;
        self.transition(TunnelState::Idle);
        info!("Tunnel stopped");
    }

    /// Move to `Failed`, releasing the session
    fn fail(&mut self, error: TunnelError, disconnect_engine: bool) {
        error!("Tunnel session failed: {}", error);

        if disconnect_engine {
            self.engine.disconnect();
        }
        if self.connected_since.is_some() {
            self.host.clear_network_settings();
        }

        self.deadline = None;
        self.active = None;
        self.connected_since = None;
        self.transition(TunnelState::Failed(error.to_string()));
        self.resolve_pending(Err(error));
    }

    fn resolve_pending(&mut self, result: Result<(), TunnelError>) {
        if let Some(completion) = self.pending.take() {
            let _ = completion.send(result);
        }
    }

    fn transition(&mut self, next: TunnelState) {
        if !self.state.can_transition_to(&next) {
            error!("Illegal tunnel transition {} -> {}", self.state, next);
            return;
        }

        info!("Tunnel state: {} -> {}", self.state, next);
        self.state = next;

        self.status_tx.send_replace(TunnelStatus {
            state: self.state.clone(),
            label: self.active.as_ref().and_then(|c| c.label()).map(str::to_owned),
            connected_since: self.connected_since,
        });
    }

    fn shutdown(&mut self) {
        if self.state.is_active() {
            warn!("Controller dropped while {}, disconnecting engine", self.state);
            self.engine.disconnect();
        }
        self.resolve_pending(Err(TunnelError::Cancelled));
        debug!("Tunnel controller stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
