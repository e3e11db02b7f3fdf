use std::sync::Arc;

use hub_codec::Message;
use hub_proto::{Authenticator, ConnectionState, Filter, FilterType, Namespace, ProtoError, Verb};
use hub_store::{NotifySink, StoreError, VariableStore};

use crate::client::Client;
use crate::log_sink::LogSink;
use crate::registry::ClientRegistry;
use crate::router::NotificationRouter;

/// Classifies one decoded [`Message`] by namespace/verb and routes it to the matching handler,
/// enforcing the authentication gate in front of everything but `COMM`.
///
/// Holds no per-connection state of its own: every method takes the `Client` it's acting on, so
/// a single `Dispatcher` is shared (behind an `Arc`) by every reader thread.
pub struct Dispatcher {
    store: Arc<VariableStore>,
    registry: Arc<ClientRegistry>,
    auth: Arc<dyn Authenticator>,
    log_sink: Arc<LogSink>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<VariableStore>,
        registry: Arc<ClientRegistry>,
        auth: Arc<dyn Authenticator>,
        log_sink: Arc<LogSink>,
    ) -> Self {
        Dispatcher {
            store,
            registry,
            auth,
            log_sink,
        }
    }

    pub fn dispatch(&self, client: &Arc<Client>, msg: Message) {
        if msg.components.is_empty() {
            self.kick(client, "Illegal message");
            return;
        }

        let namespace = match msg.namespace().and_then(Namespace::parse) {
            Some(ns) => ns,
            None => {
                self.kick(client, "Illegal message");
                return;
            }
        };

        if namespace == Namespace::Comm {
            self.handle_comm(client, &msg);
            return;
        }

        if client.state() != ConnectionState::Connected {
            self.kick(client, "Unauthenticated request");
            return;
        }

        match namespace {
            Namespace::Notify => self.handle_notify(client, &msg),
            Namespace::Var => self.handle_var(client, &msg),
            Namespace::Watch => self.handle_watch(client, &msg),
            Namespace::Log => self.handle_log(client, &msg),
            Namespace::Comm => {} // handled above
        }
    }

    fn handle_comm(&self, client: &Arc<Client>, msg: &Message) {
        match msg.verb().and_then(Verb::parse) {
            Some(Verb::Auth) => self.handle_auth(client, msg),
            Some(Verb::Shutdown) => self.handle_shutdown(client, msg),
            _ => self.kick(client, "Illegal message"),
        }
    }

    fn handle_auth(&self, client: &Arc<Client>, msg: &Message) {
        let password = msg.arg(0).unwrap_or("");
        match self.auth.authenticate(password) {
            Ok(()) => {
                client.mark_connected();
                let _ = client.send(&Message::reply(msg.request_id, vec!["COMM", "SUCCESS"]));
            }
            Err(ProtoError::NoPasswordConfigured) => {
                error!(
                    "client {} attempted AUTH but no password is configured; refusing",
                    client.id()
                );
                let _ = client.send(&Message::reply(msg.request_id, vec!["COMM", "FAILURE"]));
                self.kick(client, "Authentication failure");
            }
            Err(_) => {
                let _ = client.send(&Message::reply(msg.request_id, vec!["COMM", "FAILURE"]));
                self.kick(client, "Authentication failure");
            }
        }
    }

    fn handle_shutdown(&self, client: &Arc<Client>, msg: &Message) {
        let _ = client.send(&Message::reply(msg.request_id, vec!["COMM", "CLOSING"]));
        client.mark_closed();
    }

    fn handle_notify(&self, client: &Arc<Client>, msg: &Message) {
        match msg.verb().and_then(Verb::parse) {
            Some(Verb::Out) => {
                let payload = msg.arg(0).unwrap_or("");
                NotificationRouter::publish(&self.registry, payload);
            }
            Some(Verb::AddFilter) => {
                let kind = msg.arg(0).and_then(|s| s.parse::<u8>().ok()).and_then(FilterType::from_u8);
                match (kind, msg.arg(1)) {
                    (Some(kind), Some(body)) => client.add_filter(Filter::new(kind, body)),
                    _ => self.kick(client, "Illegal message"),
                }
            }
            Some(Verb::ClearFilters) => client.clear_filters(),
            _ => self.kick(client, "Illegal message"),
        }
    }

    fn handle_var(&self, client: &Arc<Client>, msg: &Message) {
        match msg.verb().and_then(Verb::parse) {
            Some(Verb::Get) => {
                let name = msg.arg(0).unwrap_or("");
                match self.store.get(name) {
                    Ok((value, read_only)) => {
                        let tag = if read_only { "RO" } else { "RW" };
                        let _ = client.send(&Message::reply(
                            msg.request_id,
                            vec!["VAR".to_owned(), "VALUE".to_owned(), tag.to_owned(), format!("{:.6}", value)],
                        ));
                    }
                    Err(_) => self.kick(client, &format!("Invalid variable access ({})", name)),
                }
            }
            Some(Verb::Set) => {
                let name = msg.arg(0).unwrap_or("");
                match msg.arg(1).and_then(|s| s.parse::<f64>().ok()) {
                    Some(value) => match self.store.set(name, value) {
                        Ok(()) => {}
                        Err(_) => self.kick(client, &format!("Invalid variable access ({})", name)),
                    },
                    None => self.kick(client, "Illegal message"),
                }
            }
            _ => self.kick(client, "Illegal message"),
        }
    }

    fn handle_watch(&self, client: &Arc<Client>, msg: &Message) {
        match msg.verb().and_then(Verb::parse) {
            Some(Verb::Add) => {
                let name = msg.arg(0).unwrap_or("");
                let sink: Arc<dyn NotifySink> = client.clone();
                match self.store.subscribe(sink, name) {
                    Ok(()) => client.record_subscription(name),
                    Err(_) => self.kick(client, &format!("Invalid variable access ({})", name)),
                }
            }
            Some(Verb::Del) => {
                let name = msg.arg(0).unwrap_or("");
                match self.store.unsubscribe(client.id(), name) {
                    Ok(()) => client.forget_subscription(name),
                    Err(StoreError::NotFound(_)) => {
                        self.kick(client, &format!("Invalid variable access ({})", name))
                    }
                    Err(StoreError::NotSubscribed(_)) => client.forget_subscription(name),
                    Err(_) => self.kick(client, "Illegal message"),
                }
            }
            _ => self.kick(client, "Illegal message"),
        }
    }

    fn handle_log(&self, client: &Arc<Client>, msg: &Message) {
        let app = msg.verb();
        let level = msg.arg(0).and_then(|s| s.parse::<u8>().ok());
        let text = msg.arg(1);
        match (app, level, text) {
            (Some(app), Some(level), Some(text)) => self.log_sink.log(app, level, text),
            _ => self.kick(client, "Illegal message"),
        }
    }

    /// Send `[COMM, KICKING, reason]` best-effort, then mark the client closed.
    fn kick(&self, client: &Arc<Client>, reason: &str) {
        let _ = client.send(&Message::unsolicited(vec![
            "COMM".to_owned(),
            "KICKING".to_owned(),
            reason.to_owned(),
        ]));
        client.mark_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_proto::{MockAuthenticator, SharedPasswordAuthenticator, Variable, VariableSchema};
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    fn harness(auth: Arc<dyn Authenticator>) -> (Dispatcher, Arc<ClientRegistry>, Arc<Client>, TcpStream) {
        let schema = VariableSchema {
            entries: vec![
                Variable::new("speed", 0.0, false, false),
                Variable::new("clock_hz", 100.0, false, true),
            ],
        };
        let store = Arc::new(VariableStore::new(&schema));
        let registry = Arc::new(ClientRegistry::new());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        reader.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

        let client = registry.accept(server_side).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let log_sink = Arc::new(LogSink::open(&dir.path().join("hub.log"), crate::log_sink::LogLevel::Debug, false).unwrap());

        let dispatcher = Dispatcher::new(store, registry.clone(), auth, log_sink);
        (dispatcher, registry, client, reader)
    }

    fn msg(request_id: u16, components: &[&str]) -> Message {
        Message::reply(request_id, components.to_vec())
    }

    fn read_reply(reader: &mut TcpStream) -> Message {
        hub_codec::read_message(reader).unwrap()
    }

    #[test]
    fn empty_message_is_kicked() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(MockAuthenticator));
        dispatcher.dispatch(&client, Message::reply(0, Vec::<String>::new()));
        let reply = read_reply(&mut reader);
        assert_eq!(reply.components, vec!["COMM", "KICKING", "Illegal message"]);
        assert!(client.is_closed());
    }

    #[test]
    fn auth_success_moves_to_connected() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(SharedPasswordAuthenticator::new("secret")));
        dispatcher.dispatch(&client, msg(1, &["COMM", "AUTH", "secret"]));
        let reply = read_reply(&mut reader);
        assert_eq!(reply.request_id, 1);
        assert_eq!(reply.components, vec!["COMM", "SUCCESS"]);
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[test]
    fn auth_failure_kicks_after_failure_reply() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(SharedPasswordAuthenticator::new("secret")));
        dispatcher.dispatch(&client, msg(1, &["COMM", "AUTH", "wrong"]));

        let failure = read_reply(&mut reader);
        assert_eq!(failure.components, vec!["COMM", "FAILURE"]);
        let kick = read_reply(&mut reader);
        assert_eq!(kick.components, vec!["COMM", "KICKING", "Authentication failure"]);
        assert!(client.is_closed());
    }

    #[test]
    fn non_comm_message_before_connected_is_kicked() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(MockAuthenticator));
        dispatcher.dispatch(&client, msg(0, &["VAR", "GET", "speed"]));
        let reply = read_reply(&mut reader);
        assert_eq!(reply.components, vec!["COMM", "KICKING", "Unauthenticated request"]);
        assert!(client.is_closed());
    }

    #[test]
    fn var_get_and_set_round_trip_once_connected() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(MockAuthenticator));
        client.mark_connected();

        dispatcher.dispatch(&client, msg(0, &["VAR", "SET", "speed", "1.5"]));
        dispatcher.dispatch(&client, msg(7, &["VAR", "GET", "speed"]));

        let reply = read_reply(&mut reader);
        assert_eq!(reply.request_id, 7);
        assert_eq!(reply.components, vec!["VAR", "VALUE", "RW", "1.500000"]);
    }

    #[test]
    fn read_only_write_kicks_with_the_variable_name() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(MockAuthenticator));
        client.mark_connected();

        dispatcher.dispatch(&client, msg(0, &["VAR", "SET", "clock_hz", "200"]));

        let reply = read_reply(&mut reader);
        assert_eq!(
            reply.components,
            vec!["COMM", "KICKING", "Invalid variable access (clock_hz)"]
        );
        assert!(client.is_closed());
    }

    #[test]
    fn watch_add_then_a_write_elsewhere_delivers_a_push() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(MockAuthenticator));
        client.mark_connected();

        dispatcher.dispatch(&client, msg(0, &["WATCH", "ADD", "speed"]));
        dispatcher.dispatch(&client, msg(0, &["VAR", "SET", "speed", "2.5"]));

        let reply = read_reply(&mut reader);
        assert_eq!(reply.components, vec!["WATCH", "speed", "2.500000"]);
    }

    #[test]
    fn notify_prefix_filter_matches_whole_action_tokens_only() {
        let (dispatcher, registry, x, mut x_reader) = harness(Arc::new(MockAuthenticator));
        x.mark_connected();
        dispatcher.dispatch(&x, msg(0, &["NOTIFY", "ADD_FILTER", "3", "MISSION"]));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let y_reader = TcpStream::connect(addr).unwrap();
        let (y_sock, _) = listener.accept().unwrap();
        let y = registry.accept(y_sock).unwrap();
        y.mark_connected();
        drop(y_reader);

        dispatcher.dispatch(&y, msg(0, &["NOTIFY", "OUT", "MISSION START"]));
        let reply = read_reply(&mut x_reader);
        assert_eq!(reply.components, vec!["NOTIFY", "IN", "MISSION START"]);

        dispatcher.dispatch(&y, msg(0, &["NOTIFY", "OUT", "MISSIONX"]));
        x_reader
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = x_reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn log_message_has_no_reply_and_does_not_kick() {
        let (dispatcher, _registry, client, mut reader) = harness(Arc::new(MockAuthenticator));
        client.mark_connected();
        dispatcher.dispatch(&client, msg(0, &["LOG", "nav", "1", "starting up"]));
        assert!(!client.is_closed());
        reader.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 1];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }
}
