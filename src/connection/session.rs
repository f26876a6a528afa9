// Per-server session actor. One task owns the Session (transport, state,
// reconnect timer) and processes commands strictly in arrival order, which
// is what keeps commands on one server in send order.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::transport::{Connector, RconTransport};
use crate::config::ServerConfig;
use crate::error::{ConnectionError, TransportError};
use crate::models::{CommandResult, ConnectionStatus, StatusEvent};
use crate::observers::ObserverList;
use crate::sanitize::sanitize;

/// Upper bound for best-effort transport shutdown.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const COMMAND_QUEUE: usize = 32;

pub(crate) enum SessionCommand {
    Connect {
        config: ServerConfig,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Send {
        command: String,
        reply: oneshot::Sender<CommandResult>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Manager-side handle to a running session actor.
pub(crate) struct SessionHandle {
    pub(crate) tx: mpsc::Sender<SessionCommand>,
    pub(crate) status_rx: watch::Receiver<ConnectionStatus>,
    pub(crate) closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Silences the actor first so no status (in particular a reconnect) can be
    /// emitted after this call, then closes the transport best-effort and stops the task.
    pub(crate) async fn shutdown(self) {
        self.closed.store(true, Ordering::SeqCst);
        let (reply, done) = oneshot::channel();
        let graceful = async {
            if self.tx.send(SessionCommand::Close { reply }).await.is_ok() {
                let _ = done.await;
            }
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, graceful).await.is_err() {
            debug!("session close timed out; aborting task");
        }
        self.task.abort();
    }
}

struct Session {
    server_id: String,
    transport: Option<Box<dyn RconTransport>>,
    state: ConnectionStatus,
    last_activity: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
}

struct StatusEmitter {
    observers: Arc<ObserverList<StatusEvent>>,
    status_tx: watch::Sender<ConnectionStatus>,
    closed: Arc<AtomicBool>,
}

impl StatusEmitter {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit(&self, server_id: &str, status: ConnectionStatus, reason: Option<String>) {
        if self.is_closed() {
            return;
        }
        self.status_tx.send_replace(status);
        match &reason {
            Some(r) => info!(server_id, %status, reason = %r, "status changed"),
            None => info!(server_id, %status, "status changed"),
        }
        self.observers
            .notify(&StatusEvent::new(server_id, status, reason));
    }
}

struct SessionActor {
    session: Session,
    config: ServerConfig,
    policy: RetryPolicy,
    connector: Arc<dyn Connector>,
    rx: mpsc::Receiver<SessionCommand>,
    emitter: StatusEmitter,
}

pub(crate) fn spawn(
    config: ServerConfig,
    connector: Arc<dyn Connector>,
    observers: Arc<ObserverList<StatusEvent>>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let closed = Arc::new(AtomicBool::new(false));
    let actor = SessionActor {
        session: Session {
            server_id: config.id.clone(),
            transport: None,
            state: ConnectionStatus::Disconnected,
            last_activity: None,
            reconnect_attempts: 0,
            reconnect_at: None,
        },
        policy: RetryPolicy::from_config(&config),
        config,
        connector,
        rx,
        emitter: StatusEmitter {
            observers,
            status_tx,
            closed: closed.clone(),
        },
    };
    let task = tokio::spawn(actor.run());
    SessionHandle {
        tx,
        status_rx,
        closed,
        task,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let reconnect_at = self.session.reconnect_at;
            tokio::select! {
                biased;
                cmd = self.rx.recv() => match cmd {
                    Some(SessionCommand::Connect { config, reply }) => {
                        let result = self.connect(config).await;
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Send { command, reply }) => {
                        let result = self.send(&command).await;
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Close { reply }) => {
                        self.close().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.close().await;
                        break;
                    }
                },
                _ = sleep_until_opt(reconnect_at) => {
                    self.session.reconnect_at = None;
                    self.reconnect().await;
                }
            }
        }
        debug!(server_id = %self.session.server_id, "session task finished");
    }

    fn set_state(&mut self, state: ConnectionStatus, reason: Option<String>) {
        self.session.state = state;
        self.emitter.emit(&self.session.server_id, state, reason);
    }

    /// Explicit connect. No-op when already connected.
    async fn connect(&mut self, config: ServerConfig) -> Result<(), ConnectionError> {
        if self.session.state == ConnectionStatus::Connected && self.session.transport.is_some() {
            return Ok(());
        }
        self.session.reconnect_at = None;
        self.policy = RetryPolicy::from_config(&config);
        self.config = config;
        match self.handshake().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(ConnectionStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Dials the connector, bounded by `timeout_ms`.
    async fn open_transport(&self) -> Result<Box<dyn RconTransport>, ConnectionError> {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, self.connector.connect(&self.config)).await {
            Ok(r) => r,
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        }
    }

    /// Opens a transport within `timeout_ms`. Leaves the state at `connecting` on failure;
    /// callers decide which status and reason to emit.
    async fn handshake(&mut self) -> Result<(), ConnectionError> {
        self.config
            .check()
            .map_err(ConnectionError::InvalidConfig)?;
        self.set_state(ConnectionStatus::Connecting, None);

        let opened = self.open_transport().await;
        match opened {
            Ok(transport) => {
                self.session.transport = Some(transport);
                self.session.reconnect_attempts = 0;
                self.session.last_activity = Some(Utc::now());
                self.set_state(ConnectionStatus::Connected, None);
                Ok(())
            }
            Err(e) => {
                self.session.transport = None;
                Err(e)
            }
        }
    }

    /// Schedules the next reconnect if policy allows; returns whether one was scheduled.
    fn schedule_reconnect(&mut self) -> bool {
        if !self.config.auto_reconnect
            || !self.policy.allows_reconnect(self.session.reconnect_attempts)
        {
            return false;
        }
        self.session.reconnect_attempts += 1;
        let delay = self.policy.reconnect_delay(self.session.reconnect_attempts);
        self.session.reconnect_at = Some(Instant::now() + delay);
        debug!(
            server_id = %self.session.server_id,
            attempt = self.session.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        true
    }

    async fn reconnect(&mut self) {
        if self.emitter.is_closed() {
            return;
        }
        let attempt = self.session.reconnect_attempts;
        let max = self.policy.max_attempts;
        match self.handshake().await {
            Ok(()) => info!(server_id = %self.session.server_id, attempt, "reconnected"),
            Err(e) if e.is_terminal() => {
                self.set_state(
                    ConnectionStatus::Error,
                    Some(format!("reconnect failed: {e}")),
                );
            }
            Err(e) => {
                let reason = format!("reconnect attempt {attempt}/{max} failed: {e}");
                if self.schedule_reconnect() {
                    self.set_state(ConnectionStatus::Error, Some(reason));
                } else {
                    self.set_state(
                        ConnectionStatus::Error,
                        Some(format!("{reason}; giving up until the next explicit connect")),
                    );
                }
            }
        }
    }

    /// The transport broke: drop it and either schedule a reconnect or settle.
    fn handle_drop(&mut self, reason: String) {
        self.session.transport = None;
        if self.schedule_reconnect() {
            let delay = self.policy.reconnect_delay(self.session.reconnect_attempts);
            self.set_state(
                ConnectionStatus::Disconnected,
                Some(format!("{reason}; reconnecting in {}ms", delay.as_millis())),
            );
        } else if self.config.auto_reconnect {
            self.set_state(
                ConnectionStatus::Error,
                Some(format!("{reason}; reconnect attempts exhausted")),
            );
        } else {
            self.set_state(ConnectionStatus::Disconnected, Some(reason));
        }
    }

    async fn send(&mut self, command: &str) -> CommandResult {
        let issued_at = Utc::now();
        let started = Instant::now();
        if self.session.state != ConnectionStatus::Connected {
            return CommandResult::failure(
                format!(
                    "server '{}' is not connected (status: {})",
                    self.session.server_id, self.session.state
                ),
                issued_at,
                0,
            );
        }

        let attempts = self.policy.send_attempts();
        let timeout = self.config.timeout();
        let mut last_error: Option<String> = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.send_delay()).await;
            }

            // A stream whose command failed may still carry that command's reply,
            // so every retry runs on a freshly authenticated transport.
            if self.session.transport.is_none() {
                let reopened = self.open_transport().await;
                match reopened {
                    Ok(transport) => {
                        debug!(server_id = %self.session.server_id, attempt, "transport reopened");
                        self.session.transport = Some(transport);
                    }
                    Err(e) if e.is_terminal() => {
                        let reason = format!("reopening transport failed: {e}");
                        self.set_state(ConnectionStatus::Error, Some(reason.clone()));
                        return CommandResult::failure(reason, issued_at, elapsed_ms(started));
                    }
                    Err(e) => {
                        warn!(
                            server_id = %self.session.server_id,
                            attempt,
                            attempts,
                            error = %e,
                            "reopening transport failed"
                        );
                        last_error = Some(e.to_string());
                        continue;
                    }
                }
            }
            let Some(transport) = self.session.transport.as_mut() else {
                continue;
            };

            let outcome = match tokio::time::timeout(timeout, transport.execute(command)).await {
                Ok(r) => r,
                Err(_) => Err(TransportError::Timeout(timeout)),
            };
            match outcome {
                Ok(raw) => {
                    self.session.last_activity = Some(Utc::now());
                    return CommandResult::success(sanitize(&raw), issued_at, elapsed_ms(started));
                }
                Err(e) if !e.is_retryable() => {
                    self.session.last_activity = Some(Utc::now());
                    return CommandResult::failure(e.to_string(), issued_at, elapsed_ms(started));
                }
                Err(e) => {
                    warn!(
                        server_id = %self.session.server_id,
                        attempt,
                        attempts,
                        error = %e,
                        "command send failed"
                    );
                    self.session.transport = None;
                    last_error = Some(e.to_string());
                }
            }
        }

        let reason = format!(
            "send failed after {attempts} attempt(s): {}",
            last_error.unwrap_or_else(|| "unknown error".into())
        );
        self.handle_drop(reason.clone());
        CommandResult::failure(reason, issued_at, elapsed_ms(started))
    }

    async fn close(&mut self) {
        self.session.reconnect_at = None;
        if let Some(mut transport) = self.session.transport.take()
            && tokio::time::timeout(CLOSE_TIMEOUT, transport.close())
                .await
                .is_err()
        {
            debug!(server_id = %self.session.server_id, "transport close timed out");
        }
        self.session.state = ConnectionStatus::Disconnected;
        if let Some(at) = self.session.last_activity {
            debug!(server_id = %self.session.server_id, last_activity = %at, "session closed");
        }
    }
}
