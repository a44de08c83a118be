//! The dev server and the live-reload broadcast channel.
//!
//! The working tree is served over HTTP on a background tokio runtime while
//! a separate WebSocket port fans "asset updated" notifications out to every
//! connected client. The pipeline decides *when* a notification is emitted
//! (right after a dev task succeeds) and *what kind* it carries; everything
//! else here is plain transport.

use std::fmt::Display;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use camino::Utf8PathBuf;
use tungstenite::WebSocket;

use crate::error::WatchError;

/// How a client should apply an update: CSS can be hot-swapped in place
/// without discarding page state, everything else needs a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    Css,
    Js,
    Full,
}

impl Display for ReloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadKind::Css => write!(f, "css"),
            ReloadKind::Js => write!(f, "js"),
            ReloadKind::Full => write!(f, "full"),
        }
    }
}

/// One notification sent to connected clients, serialized as a
/// `"<kind>:<path>"` text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadMsg {
    pub kind: ReloadKind,
    pub path: Utf8PathBuf,
}

impl Display for ReloadMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.path)
    }
}

/// Reserve the WebSocket port, preferring the well-known one.
pub fn reserve_port() -> Result<(TcpListener, u16), WatchError> {
    let listener = match TcpListener::bind("127.0.0.1:1337") {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0")?,
    };

    let addr = listener.local_addr()?;
    let port = addr.port();
    Ok((listener, port))
}

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// A handle to the broadcast channel: tasks never touch sockets, they only
/// push [`ReloadMsg`]s through this.
#[derive(Debug)]
pub struct BroadcastChannel {
    sender: Sender<ReloadMsg>,
}

impl BroadcastChannel {
    pub fn notify(&self, msg: ReloadMsg) -> Result<(), WatchError> {
        self.sender.send(msg)?;
        Ok(())
    }
}

/// Start the WebSocket side: one thread accepting clients, one thread
/// broadcasting messages to them.
pub fn start_broadcast(listener: TcpListener) -> BroadcastChannel {
    let clients: Clients = Arc::new(Mutex::new(vec![]));

    new_thread_ws_incoming(listener, clients.clone());
    let sender = new_thread_ws_reload(clients);

    BroadcastChannel { sender }
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("reload client connection failed: {e}");
                    continue;
                }
            };

            match tungstenite::accept(stream) {
                Ok(socket) => clients.lock().unwrap().push(socket),
                Err(e) => tracing::warn!("websocket handshake failed: {e}"),
            }
        }
    })
}

fn new_thread_ws_reload(clients: Clients) -> Sender<ReloadMsg> {
    let (tx, rx) = std::sync::mpsc::channel::<ReloadMsg>();

    std::thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            let text = msg.to_string();
            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(text.clone().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("reload send failed: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}

pub(crate) mod http {
    use std::net::SocketAddr;
    use std::thread;

    use camino::Utf8PathBuf;

    use axum::Router;
    use console::style;
    use tower_http::services::ServeDir;

    /// Serve `root` on a background thread with its own tokio runtime.
    pub fn start(root: Utf8PathBuf, port: u16) -> thread::JoinHandle<Result<(), anyhow::Error>> {
        let url = style(format!("http://localhost:{port}/")).yellow();
        eprintln!("Serving {root} on {url}");

        thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(serve(root, port))
        })
    }

    async fn serve(root: Utf8PathBuf, port: u16) -> Result<(), anyhow::Error> {
        let address = SocketAddr::from(([127, 0, 0, 1], port));
        let address = tokio::net::TcpListener::bind(address).await?;

        let router = Router::new().fallback_service(ServeDir::new(root.as_std_path()));

        axum::serve(address, router).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_as_kind_and_path() {
        let msg = ReloadMsg {
            kind: ReloadKind::Css,
            path: "assets/css/main.css".into(),
        };
        assert_eq!(msg.to_string(), "css:assets/css/main.css");

        let msg = ReloadMsg {
            kind: ReloadKind::Full,
            path: "index.html".into(),
        };
        assert_eq!(msg.to_string(), "full:index.html");
    }
}
