use hub_codec::Message;
use hub_proto::ConnectionState;

use crate::registry::ClientRegistry;

/// Fans a notification payload out to every connected client whose filters match it.
///
/// The candidate list is built while holding each client's `in_use` lock only long enough to
/// check its filters; the lock is dropped before the actual write, so a slow write to one
/// client never blocks the filter check for another.
pub struct NotificationRouter;

impl NotificationRouter {
    /// Broadcast `payload` as `NOTIFY IN <payload>` to every matching, connected client.
    /// Returns the number of clients it was delivered to.
    pub fn publish(registry: &ClientRegistry, payload: &str) -> usize {
        let candidates: Vec<_> = registry
            .snapshot()
            .into_iter()
            .filter(|client| {
                let _guard = client.in_use().read().unwrap();
                client.state() == ConnectionState::Connected && client.matches(payload)
            })
            .collect();

        let msg = Message::unsolicited(vec!["NOTIFY".to_owned(), "IN".to_owned(), payload.to_owned()]);

        let mut delivered = 0;
        for client in candidates {
            let _guard = client.in_use().read().unwrap();
            if client.state() != ConnectionState::Connected {
                continue;
            }
            if client.send(&msg).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientRegistry;
    use hub_proto::Filter;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    fn accept_pair(listener: &TcpListener) -> (TcpStream, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let client_side = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (client_side, server_side)
    }

    #[test]
    fn only_matching_connected_clients_receive_the_notification() {
        let registry = ClientRegistry::new();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let (mut reader_a, sock_a) = accept_pair(&listener);
        let client_a = registry.accept(sock_a).unwrap();
        client_a.mark_connected();
        client_a.add_filter(Filter::Action("MOVE".into()));

        let (_reader_b, sock_b) = accept_pair(&listener);
        let client_b = registry.accept(sock_b).unwrap();
        client_b.mark_connected();
        client_b.add_filter(Filter::Action("STOP".into()));

        let delivered = NotificationRouter::publish(&registry, "MOVE 1");
        assert_eq!(delivered, 1);

        let mut buf = [0u8; 64];
        reader_a.set_read_timeout(Some(std::time::Duration::from_millis(500))).unwrap();
        let n = reader_a.read(&mut buf).unwrap();
        assert!(n > 0);
    }
}
