// Transport seam: the session actor only sees these traits, so tests inject
// scripted transports and production uses the `rcon` crate over TCP.

use futures_util::future::BoxFuture;
use rcon::Connection;
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::error::{ConnectionError, TransportError};

/// An authenticated, ordered command channel to one server.
pub trait RconTransport: Send + Sync {
    /// Sends one command and returns the raw response text.
    fn execute<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, Result<String, TransportError>>;

    /// Best-effort shutdown. Dropping the transport must also release it.
    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Opens authenticated transports.
pub trait Connector: Send + Sync {
    fn connect<'a>(
        &'a self,
        config: &'a ServerConfig,
    ) -> BoxFuture<'a, Result<Box<dyn RconTransport>, ConnectionError>>;
}

/// Source RCON over TCP, with the Minecraft packet quirks enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct RconConnector;

impl Connector for RconConnector {
    fn connect<'a>(
        &'a self,
        config: &'a ServerConfig,
    ) -> BoxFuture<'a, Result<Box<dyn RconTransport>, ConnectionError>> {
        Box::pin(async move {
            let conn = <Connection<TcpStream>>::builder()
                .enable_minecraft_quirks(true)
                .connect(config.address(), &config.password)
                .await
                .map_err(connection_error)?;
            Ok(Box::new(TcpRcon { conn }) as Box<dyn RconTransport>)
        })
    }
}

struct TcpRcon {
    conn: Connection<TcpStream>,
}

impl RconTransport for TcpRcon {
    fn execute<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move { self.conn.cmd(command).await.map_err(transport_error) })
    }
}

fn connection_error(e: rcon::Error) -> ConnectionError {
    match e {
        rcon::Error::Auth => ConnectionError::Authentication,
        other => ConnectionError::Transport(transport_error(other)),
    }
}

fn transport_error(e: rcon::Error) -> TransportError {
    match e {
        rcon::Error::Io(io) => TransportError::Io(io),
        rcon::Error::Auth => TransportError::Closed,
        other => TransportError::Rejected(other.to_string()),
    }
}
