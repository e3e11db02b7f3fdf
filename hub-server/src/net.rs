use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hub_codec::{read_message, FramingError, Message};
use hub_proto::ConnectionState;

use crate::client::Client;
use crate::dispatch::Dispatcher;
use crate::registry::ClientRegistry;

/// How long a reader thread's blocking read waits before it re-checks the stop flag. Bounds how
/// long a stalled peer can delay shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// How often the listener's accept loop re-checks the stop flag while idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One listener thread plus the per-client reader threads it spawns.
///
/// All blocking socket I/O is scoped to a single thread: the listener's `accept`, and each
/// client's own reader. There is no shared event loop.
pub struct NetworkEngine {
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    max_clients: usize,
    reader_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl NetworkEngine {
    pub fn bind(
        addr: SocketAddr,
        registry: Arc<ClientRegistry>,
        dispatcher: Arc<Dispatcher>,
        max_clients: usize,
    ) -> io::Result<NetworkEngine> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(NetworkEngine {
            listener,
            stop: Arc::new(AtomicBool::new(false)),
            registry,
            dispatcher,
            max_clients,
            reader_handles: Mutex::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop on the calling thread. Returns once `shutdown` sets the stop flag.
    pub fn run(&self) {
        info!("hub listening on {:?}", self.local_addr());

        while !self.stop.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((sock, peer)) => self.accept_one(sock, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!("accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        debug!("listener loop exiting");
    }

    fn accept_one(&self, sock: TcpStream, peer: SocketAddr) {
        if self.registry.len() >= self.max_clients {
            warn!(
                "rejecting connection from {}: at MAX_CLIENTS ({})",
                peer, self.max_clients
            );
            let _ = sock.shutdown(Shutdown::Both);
            return;
        }

        if let Err(e) = sock.set_nonblocking(false) {
            warn!("failed to configure socket for {}: {}", peer, e);
            return;
        }
        let read_sock = match sock.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to clone socket for {}: {}", peer, e);
                return;
            }
        };

        let client = match self.registry.accept(sock) {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to register client from {}: {}", peer, e);
                return;
            }
        };
        info!("client {} connected from {}", client.id(), peer);

        let dispatcher = self.dispatcher.clone();
        let stop = self.stop.clone();
        let handle = thread::Builder::new()
            .name(format!("hub-reader-{}", client.id()))
            .spawn(move || reader_loop(read_sock, client, dispatcher, stop))
            .expect("failed to spawn reader thread");
        self.reader_handles.lock().unwrap().push(handle);
    }

    /// Stop accepting, kick every live client with "Hub closing", and join every reader thread.
    /// Idempotent: a second call finds nothing left to kick and an empty handle list.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);

        for client in self.registry.snapshot() {
            if client.state() != ConnectionState::Closed {
                let _ = client.send(&Message::unsolicited(vec![
                    "COMM".to_owned(),
                    "KICKING".to_owned(),
                    "Hub closing".to_owned(),
                ]));
                client.mark_closed();
                client.shutdown();
            }
        }

        let handles: Vec<_> = self.reader_handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Per-client reader thread: decode one message at a time and hand it to the dispatcher, until
/// framing fails, the peer disconnects, or the client is otherwise marked closed.
///
/// A frame that's only partially read when `READ_TIMEOUT` elapses loses its already-read bytes on
/// the next poll, desyncing this one connection; the next `read_message` call then fails framing
/// and the client gets kicked like any other malformed peer. Acceptable attrition under the same
/// "short read closes the connection" policy as any other framing error (§7).
fn reader_loop(mut sock: TcpStream, client: Arc<Client>, dispatcher: Arc<Dispatcher>, stop: Arc<AtomicBool>) {
    if sock.set_read_timeout(Some(READ_TIMEOUT)).is_err() {
        client.mark_closed();
        return;
    }

    loop {
        if client.is_closed() {
            break;
        }

        match read_message(&mut sock) {
            Ok(msg) => {
                let _guard = client.in_use().read().unwrap();
                dispatcher.dispatch(&client, msg);
            }
            Err(FramingError::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                if stop.load(Ordering::SeqCst) {
                    client.mark_closed();
                    break;
                }
            }
            Err(e) => {
                debug!("client {} disconnected: {}", client.id(), e);
                client.mark_closed();
                break;
            }
        }
    }
}
