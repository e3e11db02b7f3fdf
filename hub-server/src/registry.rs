use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use hub_store::VariableStore;

use crate::client::Client;

/// Owns every live `Client` and the reap sweep that frees closed ones.
///
/// Clients are never removed the instant they're marked closed: a reader thread or a sender on
/// another thread might be mid-access. Instead the reaper periodically takes an exclusive lock
/// on each closed client's `in_use` guard — which blocks until any such access finishes — before
/// dropping it.
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: RwLock<HashMap<u64, Arc<Client>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        ClientRegistry {
            next_id: AtomicU64::new(1),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn accept(&self, write_sock: TcpStream) -> std::io::Result<Arc<Client>> {
        let peer_addr = write_sock.peer_addr()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(Client::new(id, write_sock, peer_addr));
        self.clients.write().unwrap().insert(id, client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every currently-registered client, for routing or a kick-all sweep. Taken
    /// under the registry lock, then released — callers do their own per-client `in_use`
    /// locking for whatever they do with the snapshot.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        self.clients.read().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<Arc<Client>> {
        self.clients.read().unwrap().get(&id).cloned()
    }

    /// Free every client currently marked `Closed`. Returns how many were reaped.
    pub fn reap(&self, store: &VariableStore) -> usize {
        let closed_ids: Vec<u64> = self
            .clients
            .read()
            .unwrap()
            .values()
            .filter(|c| c.is_closed())
            .map(|c| c.id())
            .collect();

        let mut reaped = 0;
        for id in closed_ids {
            let client = {
                let mut clients = self.clients.write().unwrap();
                clients.remove(&id)
            };
            if let Some(client) = client {
                let _guard = client.in_use().write().unwrap();
                store.drop_client(id);
                client.clear_filters();
                client.shutdown();
                reaped += 1;
                debug!("reaped client {} ({})", id, client.peer_addr());
            }
        }
        reaped
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        ClientRegistry::new()
    }
}
