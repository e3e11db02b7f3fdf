use std::collections::HashSet;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Mutex, RwLock};

use hexplay::HexViewBuilder;
use hub_codec::{encode, Message};
use hub_proto::{any_matches, ConnectionState, ConnectionStateCell, Filter};
use hub_store::NotifySink;

use crate::error::NetError;

/// One connected client.
///
/// `write_sock` is a clone of the accepted socket dedicated to writes and doubles as the
/// per-client send lock: holding its `Mutex` guard for the duration of a write is what gives
/// `send` its "messages to one client are delivered in send order" guarantee. The reader thread
/// owns a second clone for reads and never touches this one.
///
/// `in_use` is acquired in shared mode by anything that dereferences this client's `Arc` to do
/// I/O (the router, the dispatcher), and in exclusive mode only by the reaper, which is how the
/// reaper waits out any send or filter check already in flight before it frees the client.
pub struct Client {
    id: u64,
    peer_addr: SocketAddr,
    write_sock: Mutex<TcpStream>,
    state: ConnectionStateCell,
    filters: Mutex<Vec<Filter>>,
    subscriptions: Mutex<HashSet<String>>,
    in_use: RwLock<()>,
}

impl Client {
    pub fn new(id: u64, write_sock: TcpStream, peer_addr: SocketAddr) -> Self {
        Client {
            id,
            peer_addr,
            write_sock: Mutex::new(write_sock),
            state: ConnectionStateCell::new(),
            filters: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashSet::new()),
            in_use: RwLock::new(()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn mark_connected(&self) -> bool {
        self.state.mark_connected()
    }

    pub fn mark_closed(&self) -> bool {
        self.state.mark_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Shared guard any I/O on this client must hold; see the struct docs.
    pub fn in_use(&self) -> &RwLock<()> {
        &self.in_use
    }

    pub fn add_filter(&self, filter: Filter) {
        self.filters.lock().unwrap().push(filter);
    }

    pub fn clear_filters(&self) {
        self.filters.lock().unwrap().clear();
    }

    pub fn matches(&self, payload: &str) -> bool {
        any_matches(&self.filters.lock().unwrap(), payload)
    }

    pub fn record_subscription(&self, name: &str) {
        self.subscriptions.lock().unwrap().insert(name.to_owned());
    }

    pub fn forget_subscription(&self, name: &str) {
        self.subscriptions.lock().unwrap().remove(name);
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.subscriptions.lock().unwrap().contains(name)
    }

    pub fn subscriptions_snapshot(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().iter().cloned().collect()
    }

    /// Encode and send `msg`. On any failure the client is marked closed; the caller doesn't
    /// need to do that itself, but may still want to log or early-return.
    pub fn send(&self, msg: &Message) -> Result<(), NetError> {
        let bytes = encode(msg)?;
        match self.send_packed(&bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.mark_closed();
                Err(e)
            }
        }
    }

    /// Write raw framed bytes without blocking: the socket is put in non-blocking mode for the
    /// duration of the write, so a peer whose receive buffer is full fails the write immediately
    /// instead of stalling this thread. The hub never queues on behalf of a slow client.
    pub fn send_packed(&self, bytes: &[u8]) -> Result<(), NetError> {
        use std::io::Write;

        trace!(
            "-> client {}: {} bytes\n{}",
            self.id,
            bytes.len(),
            HexViewBuilder::new(bytes).finish()
        );

        let mut sock = self.write_sock.lock().unwrap();
        sock.set_nonblocking(true).ok();
        let result = sock.write_all(bytes);
        sock.set_nonblocking(false).ok();

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(NetError::SlowConsumer),
            Err(e) => Err(NetError::Io(e)),
        }
    }

    pub fn shutdown(&self) {
        let sock = self.write_sock.lock().unwrap();
        let _ = sock.shutdown(Shutdown::Both);
    }
}

impl NotifySink for Client {
    fn client_id(&self) -> u64 {
        self.id
    }

    fn notify(&self, name: &str, value: f64) {
        let msg = Message::unsolicited(vec!["WATCH".to_owned(), name.to_owned(), format!("{:.6}", value)]);
        if self.send(&msg).is_err() {
            debug!("client {} dropped while delivering WATCH {}", self.id, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_side = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (client_side, server_side)
    }

    #[test]
    fn filters_default_to_matching_nothing() {
        let (_client_side, server_side) = connected_pair();
        let addr = server_side.peer_addr().unwrap();
        let client = Client::new(1, server_side, addr);
        assert!(!client.matches("MOVE 1"));
    }

    #[test]
    fn added_filters_are_evaluated_by_any_matches() {
        let (_client_side, server_side) = connected_pair();
        let addr = server_side.peer_addr().unwrap();
        let client = Client::new(1, server_side, addr);
        client.add_filter(Filter::Action("MOVE".into()));
        assert!(client.matches("MOVE 1"));
        client.clear_filters();
        assert!(!client.matches("MOVE 1"));
    }

    #[test]
    fn state_transitions_forward_only() {
        let (_client_side, server_side) = connected_pair();
        let addr = server_side.peer_addr().unwrap();
        let client = Client::new(1, server_side, addr);
        assert_eq!(client.state(), ConnectionState::Unauthenticated);
        assert!(client.mark_connected());
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(client.mark_closed());
        assert!(!client.mark_connected());
        assert_eq!(client.state(), ConnectionState::Closed);
    }
}
