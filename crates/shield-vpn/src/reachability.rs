//! Reachability Monitor
//!
//! Translates low-level network path notifications into
//! [`NetworkPathStatus`] events for a single registered listener.
//!
//! # Behavior
//!
//! - Consecutive identical observations are collapsed, so the listener
//!   sees at most one event per actual path change.
//! - `start`/`stop` are idempotent and may be called from any thread.
//! - Events are queued into the listener's channel in observation order;
//!   the tunnel controller drains that channel on its own task, which is
//!   the single context every event is handled on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Observed network path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NetworkPathStatus {
    /// No observation yet
    #[default]
    Unknown,
    /// Reachable via Wi-Fi
    WiFi,
    /// Reachable via cellular data
    Cellular,
    /// No route to the internet
    Unreachable,
}

impl NetworkPathStatus {
    /// Check if any network path is available
    pub fn is_reachable(&self) -> bool {
        matches!(self, NetworkPathStatus::WiFi | NetworkPathStatus::Cellular)
    }
}

/// Receiving end of path events
#[derive(Debug, Clone)]
pub struct PathListener {
    tx: mpsc::UnboundedSender<NetworkPathStatus>,
}

impl PathListener {
    pub(crate) fn new(tx: mpsc::UnboundedSender<NetworkPathStatus>) -> Self {
        Self { tx }
    }

    /// Create a standalone listener and the channel it feeds
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NetworkPathStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn deliver(&self, status: NetworkPathStatus) -> bool {
        self.tx.send(status).is_ok()
    }
}

/// Source of path observations for polling
pub trait PathProbe: Send + Sync + 'static {
    fn current(&self) -> NetworkPathStatus;
}

impl<F> PathProbe for F
where
    F: Fn() -> NetworkPathStatus + Send + Sync + 'static,
{
    fn current(&self) -> NetworkPathStatus {
        self()
    }
}

#[derive(Default)]
struct MonitorState {
    running: bool,
    last: NetworkPathStatus,
    listener: Option<PathListener>,
    poller: Option<JoinHandle<()>>,
}

/// Network path monitor
#[derive(Clone, Default)]
pub struct ReachabilityMonitor {
    inner: Arc<Mutex<MonitorState>>,
}

impl ReachabilityMonitor {
    /// Create a stopped monitor with no listener
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener, replacing any previous one
    pub fn register(&self, listener: PathListener) {
        self.lock().listener = Some(listener);
    }

    /// Start accepting observations
    ///
    /// Returns `false` if the monitor was already running.
    pub fn start(&self) -> bool {
        let mut state = self.lock();
        if state.running {
            return false;
        }

        state.running = true;
        state.last = NetworkPathStatus::Unknown;
        info!("Reachability monitor started");
        true
    }

    /// Stop accepting observations and cancel polling
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.running {
            return;
        }

        state.running = false;
        if let Some(poller) = state.poller.take() {
            poller.abort();
        }
        info!("Reachability monitor stopped");
    }

    /// Check if the monitor is running
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Last delivered path status
    pub fn current(&self) -> NetworkPathStatus {
        self.lock().last
    }

    /// Feed a low-level path observation
    ///
    /// Returns `true` if an event was delivered to the listener.
    pub fn notify(&self, status: NetworkPathStatus) -> bool {
        let mut state = self.lock();
        if !state.running || state.last == status {
            return false;
        }

        debug!("Network path: {:?} -> {:?}", state.last, status);
        state.last = status;

        match state.listener {
            Some(ref listener) => listener.deliver(status),
            None => false,
        }
    }

    /// Start the monitor and poll `probe` every `interval`
    ///
    /// Must be called from within a tokio runtime. Replaces any
    /// previous poller.
    pub fn start_polling<P: PathProbe>(&self, probe: P, interval: Duration) {
        self.start();

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                if !monitor.is_running() {
                    break;
                }
                monitor.notify(probe.current());
            }
        });

        if let Some(previous) = self.lock().poller.replace(handle) {
            previous.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    fn monitor_with_listener() -> (ReachabilityMonitor, mpsc::UnboundedReceiver<NetworkPathStatus>) {
        let monitor = ReachabilityMonitor::new();
        let (listener, rx) = PathListener::channel();
        monitor.register(listener);
        (monitor, rx)
    }

    #[test]
    fn test_reachable() {
        assert!(NetworkPathStatus::WiFi.is_reachable());
        assert!(NetworkPathStatus::Cellular.is_reachable());
        assert!(!NetworkPathStatus::Unreachable.is_reachable());
        assert!(!NetworkPathStatus::Unknown.is_reachable());
    }

    #[test]
    fn test_ignores_events_while_stopped() {
        let (monitor, mut rx) = monitor_with_listener();

        assert!(!monitor.notify(NetworkPathStatus::WiFi));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_collapses_duplicates() {
        let (monitor, mut rx) = monitor_with_listener();
        monitor.start();

        assert!(monitor.notify(NetworkPathStatus::WiFi));
        assert!(!monitor.notify(NetworkPathStatus::WiFi));
        assert!(monitor.notify(NetworkPathStatus::Cellular));
        assert!(monitor.notify(NetworkPathStatus::WiFi));

        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            received,
            vec![
                NetworkPathStatus::WiFi,
                NetworkPathStatus::Cellular,
                NetworkPathStatus::WiFi
            ]
        );
    }

    #[test]
    fn test_start_stop_idempotent() {
        let monitor = ReachabilityMonitor::new();

        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_restart_forgets_last_status() {
        let (monitor, mut rx) = monitor_with_listener();
        monitor.start();
        monitor.notify(NetworkPathStatus::WiFi);
        monitor.stop();
        monitor.start();

        assert_eq!(monitor.current(), NetworkPathStatus::Unknown);
        assert!(monitor.notify(NetworkPathStatus::WiFi));
        assert_eq!(rx.try_recv().ok(), Some(NetworkPathStatus::WiFi));
        assert_eq!(rx.try_recv().ok(), Some(NetworkPathStatus::WiFi));
    }

    #[test]
    fn test_register_replaces_listener() {
        let (monitor, mut first) = monitor_with_listener();
        let (listener, mut second) = PathListener::channel();
        monitor.register(listener);
        monitor.start();

        monitor.notify(NetworkPathStatus::Cellular);
        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().ok(), Some(NetworkPathStatus::Cellular));
    }

    #[test]
    fn test_notify_from_threads() {
        let (monitor, mut rx) = monitor_with_listener();
        monitor.start();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let monitor = monitor.clone();
                std::thread::spawn(move || monitor.notify(NetworkPathStatus::Unreachable))
            })
            .collect();
        let delivered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|d| *d)
            .count();

        assert_eq!(delivered, 1);
        assert_eq!(rx.try_recv().ok(), Some(NetworkPathStatus::Unreachable));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_probe() {
        let (monitor, mut rx) = monitor_with_listener();
        let step = Arc::new(AtomicU8::new(0));

        let probe_step = step.clone();
        monitor.start_polling(
            move || match probe_step.load(Ordering::SeqCst) {
                0 => NetworkPathStatus::Cellular,
                _ => NetworkPathStatus::WiFi,
            },
            Duration::from_secs(1),
        );

        assert_eq!(rx.recv().await, Some(NetworkPathStatus::Cellular));
        step.store(1, Ordering::SeqCst);
        assert_eq!(rx.recv().await, Some(NetworkPathStatus::WiFi));

        monitor.stop();
        assert!(!monitor.is_running());
    }
}
