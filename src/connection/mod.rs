// Connection manager: one authenticated session per logical server.
// Sessions are owned by per-server actor tasks; this struct only holds their handles.

mod retry;
mod session;
mod transport;

pub use retry::RetryPolicy;
pub use transport::{Connector, RconConnector, RconTransport};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::ConfigProvider;
use crate::error::{ConnectionError, TransportError};
use crate::models::{CommandResult, ConnectionStatus, StatusEvent};
use crate::observers::{ObserverList, Subscription};
use session::{SessionCommand, SessionHandle};

pub struct ConnectionManager {
    configs: Arc<dyn ConfigProvider>,
    connector: Arc<dyn Connector>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    observers: Arc<ObserverList<StatusEvent>>,
}

impl ConnectionManager {
    pub fn new(configs: Arc<dyn ConfigProvider>, connector: Arc<dyn Connector>) -> Self {
        Self {
            configs,
            connector,
            sessions: Mutex::new(HashMap::new()),
            observers: ObserverList::new("status"),
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a status observer. Observers run synchronously, in registration order.
    pub fn on_status_change<F>(&self, callback: F) -> Subscription<StatusEvent>
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Opens (or resumes) the session for `server_id`. No-op when already connected.
    /// On failure the session is discarded: nothing is retained and no reconnect runs.
    pub async fn connect(&self, server_id: &str) -> Result<(), ConnectionError> {
        let config = self
            .configs
            .get_config(server_id)
            .ok_or_else(|| ConnectionError::UnknownServer(server_id.to_string()))?;
        if let Err(reason) = config.check() {
            self.observers.notify(&StatusEvent::new(
                server_id,
                ConnectionStatus::Error,
                Some(reason.clone()),
            ));
            return Err(ConnectionError::InvalidConfig(reason));
        }

        let (tx, closed) = {
            let mut sessions = self.lock_sessions();
            let handle = sessions.entry(server_id.to_string()).or_insert_with(|| {
                session::spawn(config.clone(), self.connector.clone(), self.observers.clone())
            });
            (handle.tx.clone(), handle.closed.clone())
        };

        let (reply, rx) = oneshot::channel();
        let result = match tx.send(SessionCommand::Connect { config, reply }).await {
            Ok(()) => rx
                .await
                .unwrap_or(Err(ConnectionError::Transport(TransportError::Closed))),
            Err(_) => Err(ConnectionError::Transport(TransportError::Closed)),
        };

        if let Err(e) = &result {
            warn!(server_id, error = %e, "connect failed");
            let stale = {
                let mut sessions = self.lock_sessions();
                let same = sessions
                    .get(server_id)
                    .is_some_and(|h| Arc::ptr_eq(&h.closed, &closed));
                if same { sessions.remove(server_id) } else { None }
            };
            if let Some(handle) = stale {
                handle.shutdown().await;
            }
        }
        result
    }

    /// Sends one command. Never fails: problems come back as `success: false`.
    pub async fn send(&self, server_id: &str, command: &str) -> CommandResult {
        let tx = self.lock_sessions().get(server_id).map(|h| h.tx.clone());
        let Some(tx) = tx else {
            return CommandResult::rejected(format!("server '{server_id}' is not connected"));
        };
        let (reply, rx) = oneshot::channel();
        let msg = SessionCommand::Send {
            command: command.to_string(),
            reply,
        };
        if tx.send(msg).await.is_err() {
            return CommandResult::rejected(format!("session for '{server_id}' is closed"));
        }
        rx.await.unwrap_or_else(|_| {
            CommandResult::rejected(format!("session for '{server_id}' closed before replying"))
        })
    }

    /// Tears the session down. Any pending reconnect is cancelled before this returns.
    pub async fn disconnect(&self, server_id: &str) {
        let handle = self.lock_sessions().remove(server_id);
        let Some(handle) = handle else {
            return;
        };
        handle.shutdown().await;
        info!(server_id, "disconnected by request");
        self.observers.notify(&StatusEvent::new(
            server_id,
            ConnectionStatus::Disconnected,
            None,
        ));
    }

    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.lock_sessions().keys().cloned().collect();
        for id in ids {
            self.disconnect(&id).await;
        }
    }

    /// Current status; servers without a session are `disconnected`.
    pub fn status(&self, server_id: &str) -> ConnectionStatus {
        self.lock_sessions()
            .get(server_id)
            .map(|h| h.status())
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    pub fn connected_servers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock_sessions()
            .iter()
            .filter(|(_, h)| h.status() == ConnectionStatus::Connected)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn configs(&self) -> &Arc<dyn ConfigProvider> {
        &self.configs
    }
}
