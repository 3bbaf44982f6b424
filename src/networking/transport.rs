//! Real-time transport seam
//!
//! A [`Connector`] opens one socket per [`ConnectionId`] and reports its
//! lifecycle back through the [`Scheduler`] as [`ClientEvent::Transport`].
//! The returned [`Link`] is the only way to write to that socket. Dropping it
//! aborts the socket, unless [`Link::close`] was called first, in which case
//! the socket finishes its close handshake on its own. Events that still
//! arrive for an old id are filtered by the connection manager.
//!
//! [`WebSocketConnector`] is the production implementation on top of
//! `tokio-websockets`.

use crate::core::events::ClientEvent;
use crate::core::scheduler::{ScheduledTask, Scheduler};
use futures::{SinkExt, StreamExt};
use http::Uri;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use websocket::{ClientBuilder, Message};

/// Upper bound on a detached socket finishing its close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of one opened socket; a reconnect always gets a fresh id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle and data reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    Error(String),
    Closed,
}

/// Write half of an opened socket
pub trait Link: Send {
    /// Queue a text frame. Returns `false` if the socket is gone.
    fn send(&mut self, text: String) -> bool;

    /// Start a close handshake; no further events are expected
    fn close(&mut self);
}

/// Opens sockets
pub trait Connector: Send {
    fn open(&mut self, id: ConnectionId, url: &str, scheduler: &Scheduler) -> Box<dyn Link>;
}

/// [`Connector`] backed by `tokio-websockets`
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

enum Outgoing {
    Text(String),
    Close,
}

struct WebSocketLink {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    // Aborts the socket task when the link is dropped without a close
    task: Option<ScheduledTask>,
}

impl Link for WebSocketLink {
    fn send(&mut self, text: String) -> bool {
        self.outgoing.send(Outgoing::Text(text)).is_ok()
    }

    fn close(&mut self) {
        if self.outgoing.send(Outgoing::Close).is_ok() {
            // The socket task finishes the close handshake on its own
            if let Some(task) = self.task.take() {
                task.detach();
            }
        }
    }
}

impl Connector for WebSocketConnector {
    fn open(&mut self, id: ConnectionId, url: &str, scheduler: &Scheduler) -> Box<dyn Link> {
        let (outgoing, commands) = mpsc::unbounded_channel();
        let events = scheduler.clone();
        let url = url.to_owned();

        let task = scheduler.spawn(async move {
            run_socket(id, &url, &events, commands).await;
            ClientEvent::Transport {
                connection: id,
                event: TransportEvent::Closed,
            }
        });

        Box::new(WebSocketLink {
            outgoing,
            task: Some(task),
        })
    }
}

async fn run_socket(
    id: ConnectionId,
    url: &str,
    events: &Scheduler,
    mut commands: mpsc::UnboundedReceiver<Outgoing>,
) {
    let report = |event: TransportEvent| {
        events.post(ClientEvent::Transport {
            connection: id,
            event,
        });
    };

    let uri: Uri = match url.parse() {
        Ok(uri) => uri,
        Err(e) => {
            report(TransportEvent::Error(format!("invalid socket URL {url}: {e}")));
            return;
        }
    };

    info!("[NETWORK] Connecting {} to {}", id, url);
    let mut stream = match ClientBuilder::from_uri(uri).connect().await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("[NETWORK] Connection {} failed: {}", id, e);
            report(TransportEvent::Error(e.to_string()));
            return;
        }
    };
    report(TransportEvent::Opened);

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(message)) => {
                    if let Some(text) = message.as_text() {
                        report(TransportEvent::Text(text.to_owned()));
                    } else if message.is_close() {
                        debug!("[NETWORK] Server closed {}", id);
                        break;
                    }
                }
                Some(Err(e)) => {
                    report(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
            command = commands.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = stream.send(Message::text(text)).await {
                        report(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    if tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await.is_err() {
                        debug!("[NETWORK] Close handshake for {} timed out", id);
                    }
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Link whose socket task only stands in for the close handshake
    fn link_with_slow_close(scheduler: &Scheduler) -> WebSocketLink {
        let (outgoing, mut commands) = mpsc::unbounded_channel();
        let task = scheduler.spawn(async move {
            while let Some(command) = commands.recv().await {
                if matches!(command, Outgoing::Close) {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    break;
                }
            }
            ClientEvent::Transport {
                connection: ConnectionId(7),
                event: TransportEvent::Closed,
            }
        });
        WebSocketLink {
            outgoing,
            task: Some(task),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_link_finishes_handshake_after_drop() {
        let (scheduler, mut events) = Scheduler::channel();
        let mut link = link_with_slow_close(&scheduler);

        link.close();
        drop(link);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            matches!(
                events.try_recv(),
                Ok(ClientEvent::Transport {
                    connection: ConnectionId(7),
                    event: TransportEvent::Closed
                })
            ),
            "socket task must outlive the dropped link"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_link_without_close_aborts_task() {
        let (scheduler, mut events) = Scheduler::channel();
        let link = link_with_slow_close(&scheduler);

        drop(link);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(events.try_recv().is_err(), "aborted task stays silent");
    }
}
