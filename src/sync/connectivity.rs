//! Network reachability observation.
//!
//! A [`NetworkSource`] reports raw network changes. The
//! [`ConnectivityMonitor`] turns them into edge-triggered
//! [`ReachabilityEvent`]s: one event when the reachability verdict flips
//! from false to true, nothing for churn that leaves the verdict unchanged.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const CHANGE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

/// What the active network offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCapabilities {
    /// A route to the wider internet exists.
    pub internet: bool,
    pub transports: Vec<Transport>,
}

impl NetworkCapabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn internet() -> Self {
        Self {
            internet: true,
            transports: Vec::new(),
        }
    }

    /// A local link without an internet route.
    pub fn local(transport: Transport) -> Self {
        Self {
            internet: false,
            transports: vec![transport],
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        if !self.transports.contains(&transport) {
            self.transports.push(transport);
        }
        self
    }

    /// Internet capability, or a Wi-Fi/Ethernet link for servers on the LAN.
    pub fn is_reachable(&self) -> bool {
        self.internet
            || self
                .transports
                .iter()
                .any(|t| matches!(t, Transport::Wifi | Transport::Ethernet))
    }
}

/// Raw change reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkChange {
    Available(NetworkCapabilities),
    CapabilitiesChanged(NetworkCapabilities),
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityEvent {
    NetworkAvailable,
    BecameReachable,
}

/// Turns raw changes into false→true edges.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    reachable: bool,
}

impl EdgeDetector {
    pub fn new(initially_reachable: bool) -> Self {
        Self {
            reachable: initially_reachable,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn observe(&mut self, change: &NetworkChange) -> Option<ReachabilityEvent> {
        let was = self.reachable;
        let (now, event) = match change {
            NetworkChange::Available(caps) => {
                (caps.is_reachable(), ReachabilityEvent::NetworkAvailable)
            }
            NetworkChange::CapabilitiesChanged(caps) => {
                (caps.is_reachable(), ReachabilityEvent::BecameReachable)
            }
            NetworkChange::Lost => (false, ReachabilityEvent::BecameReachable),
        };
        self.reachable = now;
        (!was && now).then_some(event)
    }
}

#[derive(Debug)]
pub enum ConnectivityError {
    /// `start` was called twice.
    AlreadyRegistered,
    /// `stop` without a matching `start`.
    NotRegistered,
    /// The source could not be observed.
    Source(String),
}

impl std::fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityError::AlreadyRegistered => write!(f, "Already observing the network"),
            ConnectivityError::NotRegistered => write!(f, "Not observing the network"),
            ConnectivityError::Source(e) => write!(f, "Network source error: {}", e),
        }
    }
}

impl std::error::Error for ConnectivityError {}

/// Platform view of the device's networks.
pub trait NetworkSource: Send + Sync {
    /// Capabilities of the active network right now.
    fn snapshot(&self) -> NetworkCapabilities;

    /// Stream of raw changes from now on.
    fn subscribe(&self) -> Result<broadcast::Receiver<NetworkChange>, ConnectivityError>;
}

/// Source driven by hand, for embedding apps that get callbacks from their
/// platform and for tests.
pub struct ManualNetworkSource {
    current: Mutex<NetworkCapabilities>,
    tx: broadcast::Sender<NetworkChange>,
}

impl ManualNetworkSource {
    pub fn new(initial: NetworkCapabilities) -> Arc<Self> {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        Arc::new(Self {
            current: Mutex::new(initial),
            tx,
        })
    }

    /// Replaces the active network and reports the matching change.
    pub fn set(&self, capabilities: NetworkCapabilities) {
        let change = {
            let mut current = self.current.lock();
            let change = if capabilities == NetworkCapabilities::none() {
                NetworkChange::Lost
            } else if *current == NetworkCapabilities::none() {
                NetworkChange::Available(capabilities.clone())
            } else {
                NetworkChange::CapabilitiesChanged(capabilities.clone())
            };
            *current = capabilities;
            change
        };
        let _ = self.tx.send(change);
    }

    /// Reports a change without touching the snapshot.
    pub fn emit(&self, change: NetworkChange) {
        let _ = self.tx.send(change);
    }
}

impl NetworkSource for ManualNetworkSource {
    fn snapshot(&self) -> NetworkCapabilities {
        self.current.lock().clone()
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<NetworkChange>, ConnectivityError> {
        Ok(self.tx.subscribe())
    }
}

/// Linux source polling `/sys/class/net` and `/proc/net/route`.
pub struct SysfsNetworkSource {
    class_net: PathBuf,
    route_table: PathBuf,
    poll_interval: Duration,
    tx: broadcast::Sender<NetworkChange>,
    poller: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SysfsNetworkSource {
    pub fn new(poll_interval: Duration) -> Arc<Self> {
        Self::with_roots("/sys/class/net", "/proc/net/route", poll_interval)
    }

    pub fn with_roots(
        class_net: impl Into<PathBuf>,
        route_table: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        Arc::new(Self {
            class_net: class_net.into(),
            route_table: route_table.into(),
            poll_interval,
            tx,
            poller: Mutex::new(None),
        })
    }
}

impl NetworkSource for SysfsNetworkSource {
    fn snapshot(&self) -> NetworkCapabilities {
        read_capabilities(&self.class_net, &self.route_table)
    }

    /// Must be called inside a tokio runtime; the first call starts the poller.
    fn subscribe(&self) -> Result<broadcast::Receiver<NetworkChange>, ConnectivityError> {
        let rx = self.tx.subscribe();
        let mut poller = self.poller.lock();
        if poller.as_ref().map_or(true, |task| task.is_finished()) {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| ConnectivityError::Source(e.to_string()))?;
            let class_net = self.class_net.clone();
            let route_table = self.route_table.clone();
            let interval = self.poll_interval;
            let tx = self.tx.clone();
            *poller = Some(runtime.spawn(poll_sysfs(class_net, route_table, interval, tx)));
        }
        Ok(rx)
    }
}

async fn poll_sysfs(
    class_net: PathBuf,
    route_table: PathBuf,
    interval: Duration,
    tx: broadcast::Sender<NetworkChange>,
) {
    let mut previous = poll_once(&class_net, &route_table).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if tx.receiver_count() == 0 {
            tracing::debug!("No network observers left, stopping poller");
            return;
        }
        let current = poll_once(&class_net, &route_table).await;
        if current == previous {
            continue;
        }
        let change = if current == NetworkCapabilities::none() {
            NetworkChange::Lost
        } else if previous == NetworkCapabilities::none() {
            NetworkChange::Available(current.clone())
        } else {
            NetworkChange::CapabilitiesChanged(current.clone())
        };
        tracing::debug!("Network change: {:?}", change);
        let _ = tx.send(change);
        previous = current;
    }
}

/// Reads capabilities on the blocking pool so the poller never stalls a runtime worker.
async fn poll_once(class_net: &Path, route_table: &Path) -> NetworkCapabilities {
    let (class_net, route_table) = (class_net.to_path_buf(), route_table.to_path_buf());
    match tokio::task::spawn_blocking(move || read_capabilities(&class_net, &route_table)).await {
        Ok(capabilities) => capabilities,
        Err(e) => {
            tracing::warn!("Network poll failed: {}", e);
            NetworkCapabilities::internet()
        }
    }
}

/// Hosts without sysfs are assumed to be online.
fn read_capabilities(class_net: &Path, route_table: &Path) -> NetworkCapabilities {
    let entries = match std::fs::read_dir(class_net) {
        Ok(entries) => entries,
        Err(_) => return NetworkCapabilities::internet(),
    };

    let mut up = Vec::new();
    let mut capabilities = NetworkCapabilities::none();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lo" {
            continue;
        }
        let dir = entry.path();
        let state = std::fs::read_to_string(dir.join("operstate")).unwrap_or_default();
        if state.trim() != "up" {
            continue;
        }
        let transport = if dir.join("wireless").exists() {
            Transport::Wifi
        } else if name.starts_with("wwan") || name.starts_with("rmnet") {
            Transport::Cellular
        } else if dir.join("device").exists() {
            Transport::Ethernet
        } else {
            Transport::Other
        };
        capabilities = capabilities.with_transport(transport);
        up.push(name);
    }

    capabilities.internet = has_default_route(route_table, &up);
    capabilities
}

fn has_default_route(route_table: &Path, up_interfaces: &[String]) -> bool {
    let table = match std::fs::read_to_string(route_table) {
        Ok(table) => table,
        Err(_) => return false,
    };
    table.lines().skip(1).any(|line| {
        let mut columns = line.split_whitespace();
        match (columns.next(), columns.next()) {
            (Some(iface), Some("00000000")) => up_interfaces.iter().any(|up| up == iface),
            _ => false,
        }
    })
}

/// Edge events from one registration. Ends for good after `stop`.
pub struct ReachabilityEvents {
    changes: broadcast::Receiver<NetworkChange>,
    detector: EdgeDetector,
    source: Arc<dyn NetworkSource>,
    cancel: watch::Receiver<bool>,
    done: bool,
}

impl ReachabilityEvents {
    pub async fn next(&mut self) -> Option<ReachabilityEvent> {
        loop {
            if self.done || *self.cancel.borrow() {
                self.done = true;
                return None;
            }

            let change = tokio::select! {
                _ = self.cancel.changed() => {
                    self.done = true;
                    return None;
                }
                change = self.changes.recv() => change,
            };

            let change = match change {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    NetworkChange::CapabilitiesChanged(self.source.snapshot())
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            };

            if let Some(event) = self.detector.observe(&change) {
                return Some(event);
            }
        }
    }
}

/// Passive observer with one registration at a time.
pub struct ConnectivityMonitor {
    source: Arc<dyn NetworkSource>,
    registration: Mutex<Option<watch::Sender<bool>>>,
}

impl ConnectivityMonitor {
    pub fn new(source: Arc<dyn NetworkSource>) -> Self {
        Self {
            source,
            registration: Mutex::new(None),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.source.snapshot().is_reachable()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    pub fn start(&self) -> Result<ReachabilityEvents, ConnectivityError> {
        let mut registration = self.registration.lock();
        if registration.is_some() {
            return Err(ConnectivityError::AlreadyRegistered);
        }

        let changes = self.source.subscribe()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *registration = Some(cancel_tx);

        Ok(ReachabilityEvents {
            changes,
            detector: EdgeDetector::new(self.is_reachable()),
            source: self.source.clone(),
            cancel: cancel_rx,
            done: false,
        })
    }

    pub fn stop(&self) -> Result<(), ConnectivityError> {
        match self.registration.lock().take() {
            Some(cancel) => {
                let _ = cancel.send(true);
                Ok(())
            }
            None => Err(ConnectivityError::NotRegistered),
        }
    }
}
