//! StreamManager: viewer-counted fan-out of transcoder output
//!
//! One [`Relay`] exists per stream id while it has a running transcoder.
//! Its pump task reads the transcoder output, base64-encodes each chunk and
//! pushes a `stream-data` message into every viewer's queue with
//! `try_send`, so a stalled viewer only loses its own chunks.
//!
//! Relays are identified by a monotonically increasing `relay_id` so a pump
//! that outlives its relay (teardown raced with an exit) cannot remove a
//! newer relay registered under the same stream id.

use super::messages::ServerMessage;
use super::transcoder::{TranscodeOutput, Transcoder};
use super::RelayError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use watchdog_common::config::RelayConfig;
use watchdog_common::events::{EventBus, WatchdogEvent};

/// Identifies one WebSocket connection
pub type ViewerId = Uuid;

/// Queue feeding one WebSocket connection
pub type ViewerSender = mpsc::Sender<ServerMessage>;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Relay tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    /// Pending messages per viewer before chunks are dropped for it
    pub viewer_queue_capacity: usize,
    /// Bytes read from the transcoder per chunk
    pub chunk_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            viewer_queue_capacity: config.viewer_queue_capacity.max(1),
            chunk_size: config.chunk_size.max(1),
        }
    }
}

/// Snapshot of a running relay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayInfo {
    pub stream_id: String,
    pub url: String,
    pub viewers: usize,
    pub chunks_relayed: u64,
    pub started_at: DateTime<Utc>,
}

struct Relay {
    relay_id: u64,
    url: String,
    viewers: HashMap<ViewerId, ViewerSender>,
    task: JoinHandle<()>,
    chunks_relayed: u64,
    started_at: DateTime<Utc>,
}

/// Why a pump task stopped on its own
#[derive(Debug)]
enum RelayExit {
    /// Transcoder output reached EOF with a clean exit status
    Ended,
    /// Transcoder read failed or the process exited non-zero
    Failed(String),
    /// Every viewer's connection closed
    Abandoned,
}

struct ManagerInner {
    relays: Mutex<HashMap<String, Relay>>,
    transcoder: Arc<dyn Transcoder>,
    events: EventBus,
    settings: RelaySettings,
    next_relay_id: AtomicU64,
}

/// Reference-counted stream fan-out
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<ManagerInner>,
}

/// Handle that does not keep the manager (or its event bus sender) alive
#[derive(Clone)]
pub struct WeakStreamManager {
    inner: Weak<ManagerInner>,
}

impl WeakStreamManager {
    pub fn upgrade(&self) -> Option<StreamManager> {
        self.inner.upgrade().map(|inner| StreamManager { inner })
    }
}

impl StreamManager {
    pub fn new(transcoder: Arc<dyn Transcoder>, events: EventBus, settings: RelaySettings) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                relays: Mutex::new(HashMap::new()),
                transcoder,
                events,
                settings,
                next_relay_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakStreamManager {
        WeakStreamManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Ids of every stream with a running relay
    pub async fn running_ids(&self) -> Vec<String> {
        self.inner.relays.lock().await.keys().cloned().collect()
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.inner.settings
    }

    /// Create the queue for a new viewer connection
    pub fn viewer_channel(&self) -> (ViewerSender, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(self.inner.settings.viewer_queue_capacity)
    }

    /// Start a relay without attaching a viewer
    ///
    /// Returns false when the stream was already running.
    pub async fn connect(&self, stream_id: &str, url: &str) -> Result<bool, RelayError> {
        let mut relays = self.inner.relays.lock().await;
        if relays.contains_key(stream_id) {
            return Ok(false);
        }

        let relay = self.start_relay(stream_id, url)?;
        relays.insert(stream_id.to_string(), relay);
        self.emit_started(stream_id, url);
        Ok(true)
    }

    /// Attach a viewer, starting the transcoder for the first one
    ///
    /// Returns the number of viewers now attached to the stream.
    pub async fn add_viewer(
        &self,
        stream_id: &str,
        url: &str,
        viewer: ViewerId,
        tx: ViewerSender,
    ) -> Result<usize, RelayError> {
        let mut relays = self.inner.relays.lock().await;

        let count = match relays.get_mut(stream_id) {
            Some(relay) => {
                relay.viewers.insert(viewer, tx);
                relay.viewers.len()
            }
            None => {
                let mut relay = self.start_relay(stream_id, url)?;
                relay.viewers.insert(viewer, tx);
                relays.insert(stream_id.to_string(), relay);
                self.emit_started(stream_id, url);
                1
            }
        };

        debug!("Viewer {} joined {} ({} viewers)", viewer, stream_id, count);
        self.emit_viewer_count(stream_id, count);
        Ok(count)
    }

    /// Detach a viewer from one stream; tears the relay down when it was the last
    ///
    /// Returns false when the viewer was not attached to that stream.
    pub async fn remove_viewer_from(&self, stream_id: &str, viewer: ViewerId) -> bool {
        let mut relays = self.inner.relays.lock().await;

        let Some(relay) = relays.get_mut(stream_id) else {
            return false;
        };
        if relay.viewers.remove(&viewer).is_none() {
            return false;
        }

        let remaining = relay.viewers.len();
        self.emit_viewer_count(stream_id, remaining);
        if remaining == 0 {
            if let Some(relay) = relays.remove(stream_id) {
                self.teardown(stream_id, relay, "no viewers");
            }
        }
        true
    }

    /// Detach a viewer from every stream (socket closed)
    ///
    /// Returns the ids of the streams that were torn down as a result.
    pub async fn remove_viewer(&self, viewer: ViewerId) -> Vec<String> {
        let mut relays = self.inner.relays.lock().await;

        let mut emptied = Vec::new();
        for (stream_id, relay) in relays.iter_mut() {
            if relay.viewers.remove(&viewer).is_some() {
                self.emit_viewer_count(stream_id, relay.viewers.len());
                if relay.viewers.is_empty() {
                    emptied.push(stream_id.clone());
                }
            }
        }

        for stream_id in &emptied {
            if let Some(relay) = relays.remove(stream_id) {
                self.teardown(stream_id, relay, "no viewers");
            }
        }

        emptied
    }

    /// Kill the transcoder and forget the stream's viewers
    ///
    /// Returns false when no relay was running.
    pub async fn remove_stream(&self, stream_id: &str) -> bool {
        let mut relays = self.inner.relays.lock().await;
        match relays.remove(stream_id) {
            Some(relay) => {
                self.teardown(stream_id, relay, "stream closed");
                true
            }
            None => false,
        }
    }

    /// Tear down every relay (server shutdown)
    pub async fn shutdown(&self) {
        let mut relays = self.inner.relays.lock().await;
        let count = relays.len();
        for (stream_id, relay) in relays.drain() {
            self.teardown(&stream_id, relay, "server shutdown");
        }
        if count > 0 {
            info!("Stopped {} relays", count);
        }
    }

    pub async fn is_running(&self, stream_id: &str) -> bool {
        self.inner.relays.lock().await.contains_key(stream_id)
    }

    pub async fn viewer_count(&self, stream_id: &str) -> usize {
        self.inner
            .relays
            .lock()
            .await
            .get(stream_id)
            .map(|relay| relay.viewers.len())
            .unwrap_or(0)
    }

    /// Snapshot of all running relays, ordered by stream id
    pub async fn relays(&self) -> Vec<RelayInfo> {
        let relays = self.inner.relays.lock().await;
        let mut infos: Vec<RelayInfo> = relays
            .iter()
            .map(|(stream_id, relay)| RelayInfo {
                stream_id: stream_id.clone(),
                url: relay.url.clone(),
                viewers: relay.viewers.len(),
                chunks_relayed: relay.chunks_relayed,
                started_at: relay.started_at,
            })
            .collect();
        infos.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        infos
    }

    /// Spawn the transcoder and its pump task
    ///
    /// A spawn failure is published as `RelayFailed` before it is returned.
    ///
    /// Called with the relay table locked; the pump blocks on the same lock
    /// before its first delivery, so the caller can finish registering.
    fn start_relay(&self, stream_id: &str, url: &str) -> Result<Relay, RelayError> {
        let output = match self.inner.transcoder.spawn(url) {
            Ok(output) => output,
            Err(e) => {
                warn!("Relay for {} could not start: {}", stream_id, e);
                self.inner.events.emit_lossy(WatchdogEvent::RelayFailed {
                    stream_id: stream_id.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };
        let relay_id = self.inner.next_relay_id.fetch_add(1, Ordering::Relaxed);

        let task = tokio::spawn(pump(
            self.clone(),
            stream_id.to_string(),
            relay_id,
            output,
            self.inner.settings.chunk_size,
        ));

        info!("Relay {} started for {} ({})", relay_id, stream_id, url);

        Ok(Relay {
            relay_id,
            url: url.to_string(),
            viewers: HashMap::new(),
            task,
            chunks_relayed: 0,
            started_at: Utc::now(),
        })
    }

    /// Stop a relay that has already been removed from the table
    fn teardown(&self, stream_id: &str, relay: Relay, reason: &str) {
        // Dropping the pump future drops the child, which is kill_on_drop
        relay.task.abort();
        notify_viewers(&relay, stream_id, reason);

        info!("Relay {} for {} stopped: {}", relay.relay_id, stream_id, reason);
        self.inner.events.emit_lossy(WatchdogEvent::RelayStopped {
            stream_id: stream_id.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Push one chunk to every viewer of the relay
    ///
    /// Returns false when the pump should stop: the relay is gone or every
    /// viewer it had has disconnected.
    async fn fan_out(&self, stream_id: &str, relay_id: u64, data: String) -> bool {
        let mut relays = self.inner.relays.lock().await;
        let Some(relay) = relays.get_mut(stream_id) else {
            return false;
        };
        if relay.relay_id != relay_id {
            return false;
        }

        relay.chunks_relayed += 1;
        if relay.viewers.is_empty() {
            return true;
        }

        let message = ServerMessage::StreamData {
            stream_id: stream_id.to_string(),
            data,
        };

        let mut closed = Vec::new();
        for (viewer, tx) in &relay.viewers {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Viewer {} on {} is behind, dropping chunk", viewer, stream_id);
                }
                Err(TrySendError::Closed(_)) => closed.push(*viewer),
            }
        }

        if closed.is_empty() {
            return true;
        }

        for viewer in &closed {
            relay.viewers.remove(viewer);
        }
        self.emit_viewer_count(stream_id, relay.viewers.len());
        !relay.viewers.is_empty()
    }

    /// Unregister a relay whose pump stopped on its own
    async fn relay_exited(&self, stream_id: &str, relay_id: u64, exit: RelayExit) {
        let mut relays = self.inner.relays.lock().await;
        let current = relays
            .get(stream_id)
            .map(|relay| relay.relay_id == relay_id)
            .unwrap_or(false);
        if !current {
            return;
        }
        let Some(relay) = relays.remove(stream_id) else {
            return;
        };
        drop(relays);

        let timestamp = Utc::now();
        match exit {
            RelayExit::Ended => {
                info!("Relay {} for {}: upstream ended", relay_id, stream_id);
                notify_viewers(&relay, stream_id, "stream ended");
                self.inner.events.emit_lossy(WatchdogEvent::RelayStopped {
                    stream_id: stream_id.to_string(),
                    reason: "upstream ended".to_string(),
                    timestamp,
                });
            }
            RelayExit::Failed(error) => {
                warn!("Relay {} for {} failed: {}", relay_id, stream_id, error);
                notify_viewers(&relay, stream_id, &error);
                self.inner.events.emit_lossy(WatchdogEvent::RelayFailed {
                    stream_id: stream_id.to_string(),
                    error,
                    timestamp,
                });
            }
            RelayExit::Abandoned => {
                info!("Relay {} for {}: all viewers disconnected", relay_id, stream_id);
                self.inner.events.emit_lossy(WatchdogEvent::RelayStopped {
                    stream_id: stream_id.to_string(),
                    reason: "no viewers".to_string(),
                    timestamp,
                });
            }
        }
    }

    fn emit_started(&self, stream_id: &str, url: &str) {
        self.inner.events.emit_lossy(WatchdogEvent::RelayStarted {
            stream_id: stream_id.to_string(),
            url: url.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit_viewer_count(&self, stream_id: &str, viewers: usize) {
        self.inner.events.emit_lossy(WatchdogEvent::ViewerCountChanged {
            stream_id: stream_id.to_string(),
            viewers,
            timestamp: Utc::now(),
        });
    }
}

fn notify_viewers(relay: &Relay, stream_id: &str, message: &str) {
    for tx in relay.viewers.values() {
        let _ = tx.try_send(ServerMessage::StreamError {
            stream_id: stream_id.to_string(),
            message: message.to_string(),
        });
    }
}

/// Read transcoder output until EOF, error, or abandonment
async fn pump(
    manager: StreamManager,
    stream_id: String,
    relay_id: u64,
    mut output: TranscodeOutput,
    chunk_size: usize,
) {
    let mut buf = vec![0u8; chunk_size];

    let mut exit = loop {
        match output.reader.read(&mut buf).await {
            Ok(0) => break RelayExit::Ended,
            Ok(n) => {
                let data = STANDARD.encode(&buf[..n]);
                if !manager.fan_out(&stream_id, relay_id, data).await {
                    break RelayExit::Abandoned;
                }
            }
            Err(e) => break RelayExit::Failed(format!("transcoder read error: {}", e)),
        }
    };

    if let Some(child) = output.child.as_mut() {
        if matches!(exit, RelayExit::Ended) {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    exit = RelayExit::Failed(format!("transcoder exited with {}", status));
                }
                Ok(_) => {}
                Err(e) => exit = RelayExit::Failed(format!("transcoder wait failed: {}", e)),
            }
        } else if let Err(e) = child.start_kill() {
            debug!("Transcoder for {} already gone: {}", stream_id, e);
        }
    }

    manager.relay_exited(&stream_id, relay_id, exit).await;
}

/// Id for an ad-hoc relay: `stream_<epoch ms>_<9 base36 chars>`
pub fn generate_stream_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("stream_{}_{}", Utc::now().timestamp_millis(), suffix)
}
