use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::messages::{ClientMessage, ServerMessage, SetupMessage};
use crate::error::BridgeResult;

/// How long connection tasks get to flush a close before being aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Events delivered by an open connection
///
/// `Message` corresponds to the service's message callback; `Closed` and
/// `Error` end the connection.
#[derive(Debug)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// A frame arrived that could not be parsed; the connection stays up
    Undecodable(String),
    Closed { reason: Option<String> },
    Error(String),
}

/// A connection that completed setup
pub struct LiveChannel {
    /// Outbound messages; dropping every sender closes the connection
    pub outbound: mpsc::Sender<ClientMessage>,
    /// Inbound events, in arrival order
    pub events: mpsc::Receiver<TransportEvent>,
    /// Background I/O tasks owned by this connection
    pub tasks: ConnectionTasks,
}

/// Background tasks behind a [`LiveChannel`]
#[derive(Default)]
pub struct ConnectionTasks(Vec<JoinHandle<()>>);

impl ConnectionTasks {
    pub fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self(tasks)
    }

    /// Wait briefly for the tasks to finish on their own, then abort them
    pub async fn shutdown(self) {
        for mut task in self.0 {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Connection task did not stop in time, aborting");
                task.abort();
            }
        }
    }

    /// Abort without waiting
    pub fn abort(&self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Opens connections to the live service
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect, send `setup` and wait for the service to acknowledge it
    async fn open(&self, api_key: &str, setup: SetupMessage) -> BridgeResult<LiveChannel>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
