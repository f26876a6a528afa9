// Log tail monitor: one polling task per server, fanning parsed lines out to
// observers (`on_log_line`) and to per-server broadcast channels that back
// `wait_for_line` / `collect_lines`.

mod parse;
mod tail;

pub use parse::parse_line;
pub use tail::LogTail;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use tracing::{debug, info, warn};

use crate::error::LogMonitorError;
use crate::models::{LogEvent, LogLine};
use crate::observers::{ObserverList, Subscription};

/// Lines buffered per server for slow waiters.
const LINE_CHANNEL_CAPACITY: usize = 1024;

struct MonitorHandle {
    path: PathBuf,
    lines_tx: broadcast::Sender<LogLine>,
    /// Held by the poll task for the whole delivery of one line.
    active: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

fn lock_gate(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(|e| e.into_inner())
}

impl MonitorHandle {
    /// After this returns no further line from this monitor reaches anyone. Waits for
    /// a delivery already in progress to finish.
    fn stop(self) {
        *lock_gate(&self.active) = false;
        self.task.abort();
    }
}

pub struct LogTailMonitor {
    poll_interval: Duration,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    observers: Arc<ObserverList<LogEvent>>,
}

impl LogTailMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            monitors: Mutex::new(HashMap::new()),
            observers: ObserverList::new("log_line"),
        }
    }

    fn lock_monitors(&self) -> MutexGuard<'_, HashMap<String, MonitorHandle>> {
        self.monitors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts tailing `path` from its current end. Replaces an existing monitor for the server.
    pub async fn start_monitoring(
        &self,
        server_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), LogMonitorError> {
        let tail = LogTail::open(path).await?;
        let path = tail.path().to_path_buf();
        let (lines_tx, _) = broadcast::channel(LINE_CHANNEL_CAPACITY);
        let active = Arc::new(Mutex::new(true));
        let task = tokio::spawn(run(
            server_id.to_string(),
            tail,
            self.poll_interval,
            lines_tx.clone(),
            self.observers.clone(),
            active.clone(),
        ));
        let previous = self.lock_monitors().insert(
            server_id.to_string(),
            MonitorHandle {
                path: path.clone(),
                lines_tx,
                active,
                task,
            },
        );
        if let Some(previous) = previous {
            debug!(server_id, old_path = %previous.path.display(), "replacing log monitor");
            previous.stop();
        }
        info!(server_id, path = %path.display(), "log monitoring started");
        Ok(())
    }

    /// Stops polling and releases the file. Idempotent.
    pub fn stop_monitoring(&self, server_id: &str) {
        if let Some(handle) = self.lock_monitors().remove(server_id) {
            handle.stop();
            info!(server_id, "log monitoring stopped");
        }
    }

    pub fn stop_all(&self) {
        let handles: Vec<MonitorHandle> = self.lock_monitors().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop();
        }
    }

    pub fn is_monitoring(&self, server_id: &str) -> bool {
        self.lock_monitors().contains_key(server_id)
    }

    pub fn monitored_path(&self, server_id: &str) -> Option<PathBuf> {
        self.lock_monitors().get(server_id).map(|h| h.path.clone())
    }

    /// Every parsed line from every monitored server, in file order per server.
    /// A callback must not stop the monitor that is delivering to it.
    pub fn on_log_line<F>(&self, callback: F) -> Subscription<LogEvent>
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn off_log_line(&self, subscription: Subscription<LogEvent>) {
        subscription.unsubscribe();
    }

    /// Subscribes to future lines of one server. Lines appended after this call are
    /// seen even if the caller only starts waiting later.
    pub fn subscribe(&self, server_id: &str) -> Option<LineSubscription> {
        self.lock_monitors()
            .get(server_id)
            .map(|h| LineSubscription {
                rx: h.lines_tx.subscribe(),
            })
    }

    /// First future line matching `predicate`, or `None` after `timeout`
    /// (immediately if the server is not monitored).
    pub async fn wait_for_line<P>(
        &self,
        server_id: &str,
        predicate: P,
        timeout: Duration,
    ) -> Option<LogLine>
    where
        P: Fn(&LogLine) -> bool,
    {
        match self.subscribe(server_id) {
            Some(sub) => sub.wait_for(predicate, timeout).await,
            None => {
                debug!(server_id, "wait_for_line on unmonitored server");
                None
            }
        }
    }

    /// Lines from the first `start` match through the first `end` match (both inclusive);
    /// on timeout, whatever was buffered.
    pub async fn collect_lines<S, E>(
        &self,
        server_id: &str,
        start: S,
        end: E,
        timeout: Duration,
    ) -> Vec<LogLine>
    where
        S: Fn(&LogLine) -> bool,
        E: Fn(&LogLine) -> bool,
    {
        match self.subscribe(server_id) {
            Some(sub) => sub.collect(start, end, timeout).await,
            None => Vec::new(),
        }
    }
}

impl Drop for LogTailMonitor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Receiver side of one server's line stream.
pub struct LineSubscription {
    rx: broadcast::Receiver<LogLine>,
}

impl LineSubscription {
    async fn next_before(&mut self, deadline: Instant) -> Option<LogLine> {
        loop {
            match timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return None,
                Ok(Ok(line)) => return Some(line),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "log line subscriber lagged");
                }
                Ok(Err(RecvError::Closed)) => return None,
            }
        }
    }

    pub async fn wait_for<P>(mut self, predicate: P, timeout: Duration) -> Option<LogLine>
    where
        P: Fn(&LogLine) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while let Some(line) = self.next_before(deadline).await {
            if predicate(&line) {
                return Some(line);
            }
        }
        None
    }

    pub async fn collect<S, E>(mut self, start: S, end: E, timeout: Duration) -> Vec<LogLine>
    where
        S: Fn(&LogLine) -> bool,
        E: Fn(&LogLine) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut buffered = Vec::new();
        while let Some(line) = self.next_before(deadline).await {
            if buffered.is_empty() && !start(&line) {
                continue;
            }
            let done = end(&line);
            buffered.push(line);
            if done {
                break;
            }
        }
        buffered
    }
}

async fn run(
    server_id: String,
    mut tail: LogTail,
    poll_interval: Duration,
    lines_tx: broadcast::Sender<LogLine>,
    observers: Arc<ObserverList<LogEvent>>,
    active: Arc<Mutex<bool>>,
) {
    let mut tick = interval(poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        if !*lock_gate(&active) {
            break;
        }
        let lines = match tail.poll().await {
            Ok(lines) => lines,
            Err(e) => {
                debug!(server_id = %server_id, error = %e, "log poll failed");
                continue;
            }
        };
        for line in lines {
            let gate = lock_gate(&active);
            if !*gate {
                return;
            }
            let _ = lines_tx.send(line.clone());
            observers.notify(&LogEvent {
                server_id: server_id.clone(),
                line,
            });
        }
    }
}
