// Shared test helpers: scripted RCON connector, config builders, status recorder

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use rconwatch::config::{ServerConfig, StaticConfigProvider};
use rconwatch::connection::{ConnectionManager, Connector, RconTransport};
use rconwatch::error::{ConnectionError, TransportError};
use rconwatch::models::{ConnectionStatus, StatusEvent};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the next connection attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    Accept,
    RejectAuth,
    Refuse,
    /// Never completes; exercises the handshake timeout.
    Hang,
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MockState {
    responses: HashMap<String, String>,
    hooks: HashMap<String, Hook>,
    connect_plan: VecDeque<ConnectStep>,
    connect_attempts: u32,
    send_failures_remaining: u32,
    sent: Vec<String>,
}

/// Connector whose transports answer from a command → response table.
/// Unscripted commands get an empty response; unscripted connects are accepted.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn respond(&self, command: &str, response: &str) -> &Self {
        self.state()
            .responses
            .insert(command.to_string(), response.to_string());
        self
    }

    /// Runs `hook` each time `command` is executed, before the response is returned.
    pub fn on_command(&self, command: &str, hook: impl Fn() + Send + Sync + 'static) -> &Self {
        self.state()
            .hooks
            .insert(command.to_string(), Arc::new(hook));
        self
    }

    pub fn plan_connects(&self, steps: impl IntoIterator<Item = ConnectStep>) -> &Self {
        self.state().connect_plan.extend(steps);
        self
    }

    /// The next `n` command executions fail with a broken pipe.
    pub fn fail_next_sends(&self, n: u32) -> &Self {
        self.state().send_failures_remaining = n;
        self
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }

    pub fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    pub fn sent_count(&self, command: &str) -> usize {
        self.state().sent.iter().filter(|c| *c == command).count()
    }
}

impl Connector for MockConnector {
    fn connect<'a>(
        &'a self,
        _config: &'a ServerConfig,
    ) -> BoxFuture<'a, Result<Box<dyn RconTransport>, ConnectionError>> {
        Box::pin(async move {
            let step = {
                let mut state = self.state();
                state.connect_attempts += 1;
                state.connect_plan.pop_front().unwrap_or(ConnectStep::Accept)
            };
            match step {
                ConnectStep::Accept => Ok(Box::new(MockTransport {
                    state: self.state.clone(),
                }) as Box<dyn RconTransport>),
                ConnectStep::RejectAuth => Err(ConnectionError::Authentication),
                ConnectStep::Refuse => Err(ConnectionError::Transport(TransportError::Io(
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
                ))),
                ConnectStep::Hang => std::future::pending().await,
            }
        })
    }
}

struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl RconTransport for MockTransport {
    fn execute<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move {
            let (response, hook) = {
                let mut state = self.state.lock().unwrap();
                state.sent.push(command.to_string());
                if state.send_failures_remaining > 0 {
                    state.send_failures_remaining -= 1;
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "broken pipe",
                    )));
                }
                (
                    state.responses.get(command).cloned().unwrap_or_default(),
                    state.hooks.get(command).cloned(),
                )
            };
            if let Some(hook) = hook {
                hook();
            }
            Ok(response)
        })
    }
}

pub fn server_config(id: &str) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        host: "127.0.0.1".into(),
        port: 25575,
        password: "secret".into(),
        timeout_ms: 5_000,
        retry_attempts: 3,
        retry_delay_ms: 2_000,
        log_path: None,
        auto_connect: true,
        auto_reconnect: true,
    }
}

pub fn manager(servers: Vec<ServerConfig>, connector: &MockConnector) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        Arc::new(StaticConfigProvider::new(servers)),
        Arc::new(connector.clone()),
    ))
}

/// Records every status event the manager emits.
#[derive(Clone, Default)]
pub struct StatusRecorder {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl StatusRecorder {
    pub fn attach(manager: &ConnectionManager) -> Self {
        let recorder = Self::default();
        let events = recorder.events.clone();
        let _ = manager.on_status_change(move |event| {
            events.lock().unwrap().push(event.clone());
        });
        recorder
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.events().into_iter().map(|e| e.status).collect()
    }

    pub fn last(&self) -> Option<StatusEvent> {
        self.events().last().cloned()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

pub fn log_line(time: &str, message: &str) -> String {
    format!("[{time}] [Server thread/INFO]: {message}\n")
}

pub fn append(path: &Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
}

/// Polls `check` every 10ms until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
