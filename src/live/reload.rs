//! WebSocket side channel telling open browser tabs what changed.
//!
//! Two plain threads: one accepts connections, the other broadcasts each
//! notification to every connected client. Clients that went away are
//! dropped on the next broadcast, and only the newest [`MAX_CLIENTS`] are
//! kept.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tungstenite::WebSocket;

use crate::error::WatchError;

const PREFERRED_PORT: u16 = 1337;
const MAX_CLIENTS: usize = 10;

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// What the browser should refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Swap stylesheets in place.
    Css,
    /// Swap scripts in place.
    Js,
    /// Reload the whole page.
    Page,
}

impl ReloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadKind::Css => "css",
            ReloadKind::Js => "js",
            ReloadKind::Page => "page",
        }
    }
}

/// Handle to the running broadcast threads.
#[derive(Clone)]
pub struct ReloadHub {
    port: u16,
    clients: Clients,
    tx: Sender<ReloadKind>,
}

impl ReloadHub {
    /// Binds port 1337, or any free port when that one is taken.
    pub fn start() -> Result<Self, WatchError> {
        let listener = match TcpListener::bind(("127.0.0.1", PREFERRED_PORT)) {
            Ok(listener) => listener,
            Err(_) => bind(SocketAddr::from(([127, 0, 0, 1], 0)))?,
        };
        Self::with_listener(listener)
    }

    pub fn with_listener(listener: TcpListener) -> Result<Self, WatchError> {
        let port = listener.local_addr()?.port();
        let clients = Clients::default();

        spawn_incoming(listener, clients.clone());
        let tx = spawn_broadcast(clients.clone());

        tracing::debug!(port, "live reload socket ready");
        Ok(Self { port, clients, tx })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of connected clients.
    pub fn clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify(&self, kind: ReloadKind) {
        tracing::info!(kind = kind.as_str(), "reloading browsers");
        if self.tx.send(kind).is_err() {
            tracing::warn!("live reload thread is gone");
        }
    }
}

fn bind(address: SocketAddr) -> Result<TcpListener, WatchError> {
    TcpListener::bind(address).map_err(|e| WatchError::Bind(address.to_string(), e))
}

fn spawn_incoming(listener: TcpListener, clients: Clients) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let socket = match stream.map(tungstenite::accept) {
                Ok(Ok(socket)) => socket,
                Ok(Err(e)) => {
                    tracing::warn!("websocket handshake failed: {e}");
                    continue;
                }
                Err(e) => {
                    tracing::warn!("websocket connection failed: {e}");
                    continue;
                }
            };

            clients
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(socket);
        }
    });
}

fn spawn_broadcast(clients: Clients) -> Sender<ReloadKind> {
    let (tx, rx) = mpsc::channel::<ReloadKind>();

    thread::spawn(move || {
        while let Ok(kind) = rx.recv() {
            let mut clients = clients.lock().unwrap_or_else(PoisonError::into_inner);
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(kind.as_str().into()) {
                    Ok(()) => {}
                    Err(tungstenite::Error::Io(e))
                        if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) =>
                    {
                        broken.push(i);
                    }
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        broken.push(i);
                    }
                    Err(e) => tracing::error!("live reload send failed: {e}"),
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_for_clients(hub: &ReloadHub, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while hub.clients() < n {
            assert!(Instant::now() < deadline, "client never registered");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_broadcast_reaches_client() {
        let hub = ReloadHub::with_listener(TcpListener::bind("127.0.0.1:0").unwrap()).unwrap();
        let (mut client, _) =
            tungstenite::connect(format!("ws://127.0.0.1:{}", hub.port())).unwrap();
        wait_for_clients(&hub, 1);

        hub.notify(ReloadKind::Css);
        assert_eq!(client.read().unwrap().to_text().unwrap(), "css");

        hub.notify(ReloadKind::Page);
        assert_eq!(client.read().unwrap().to_text().unwrap(), "page");
    }

    #[test]
    fn test_keeps_newest_clients() {
        let hub = ReloadHub::with_listener(TcpListener::bind("127.0.0.1:0").unwrap()).unwrap();

        let mut sockets = Vec::new();
        for n in 1..=MAX_CLIENTS + 2 {
            let (client, _) =
                tungstenite::connect(format!("ws://127.0.0.1:{}", hub.port())).unwrap();
            sockets.push(client);
            wait_for_clients(&hub, n);
        }

        hub.notify(ReloadKind::Js);

        let deadline = Instant::now() + Duration::from_secs(5);
        while hub.clients() > MAX_CLIENTS {
            assert!(Instant::now() < deadline, "old clients were not dropped");
            thread::sleep(Duration::from_millis(10));
        }

        let newest = sockets.last_mut().unwrap();
        assert_eq!(newest.read().unwrap().to_text().unwrap(), "js");
    }
}
