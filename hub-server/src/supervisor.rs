use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use hub_proto::{Authenticator, SchemaParseError, SharedPasswordAuthenticator, VariableSchema};
use hub_store::{parse_values, FlushRequester, Flusher, StoreError, VariableStore};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::log_sink::LogSink;
use crate::net::NetworkEngine;
use crate::registry::ClientRegistry;

/// How often the background reaper sweeps the registry for closed clients to free.
const REAP_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to read variable schema at {0:?}: {1}")]
    Schema(std::path::PathBuf, #[source] io::Error),

    #[error("failed to parse variable schema: {0}")]
    SchemaParse(#[from] SchemaParseError),

    #[error("failed to read persistent variable database at {0:?}: {1}")]
    Db(std::path::PathBuf, #[source] io::Error),

    #[error("persistent variable database error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to open log file at {0:?}: {1}")]
    Log(std::path::PathBuf, #[source] io::Error),

    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] io::Error),
}

/// The hub process, assembled in the order laid out in the component design: config, then the
/// variable store (schema, persisted values, flusher), then the log sink, then the network
/// engine. Owns every long-running thread except the one that calls [`Hub::run`].
pub struct Hub {
    config: Config,
    store: Arc<VariableStore>,
    registry: Arc<ClientRegistry>,
    log_sink: Arc<LogSink>,
    engine: NetworkEngine,
    flusher: Mutex<Option<Flusher>>,
    reaper_stop: Arc<AtomicBool>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl Hub {
    pub fn start(config: Config) -> Result<Hub, SupervisorError> {
        let schema_text = fs::read_to_string(&config.var_defs)
            .map_err(|e| SupervisorError::Schema(config.var_defs.clone(), e))?;
        let schema = VariableSchema::parse(&schema_text)?;

        let has_persistent = schema.entries.iter().any(|v| v.persistent);
        let flush_requester = FlushRequester::new();
        let mut store = VariableStore::new(&schema);
        if has_persistent {
            store = store.with_flusher(flush_requester.clone());
        }
        let store = Arc::new(store);

        if config.var_db.exists() {
            let text = fs::read_to_string(&config.var_db)
                .map_err(|e| SupervisorError::Db(config.var_db.clone(), e))?;
            for (name, value) in parse_values(&text) {
                store.seed(&name, value)?;
            }
        } else {
            fs::write(&config.var_db, "").map_err(|e| SupervisorError::Db(config.var_db.clone(), e))?;
        }

        let flusher = if has_persistent {
            info!("persistent variables present; starting flusher for {:?}", config.var_db);
            Some(Flusher::spawn(store.clone(), flush_requester, config.var_db.clone()))
        } else {
            None
        };

        let log_sink = Arc::new(
            LogSink::open(&config.log_file, config.log_level, config.log_replicate_stdout)
                .map_err(|e| SupervisorError::Log(config.log_file.clone(), e))?,
        );

        let registry = Arc::new(ClientRegistry::new());
        let auth: Arc<dyn Authenticator> = Arc::new(SharedPasswordAuthenticator::new(config.password.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), registry.clone(), auth, log_sink.clone()));

        let bind_addr = SocketAddr::new(IpAddr::V4(config.bind_address), config.bind_port);
        let engine = NetworkEngine::bind(bind_addr, registry.clone(), dispatcher, config.max_clients)
            .map_err(|e| SupervisorError::Bind(bind_addr, e))?;

        let reaper_stop = Arc::new(AtomicBool::new(false));
        let reaper_handle = spawn_reaper(registry.clone(), store.clone(), reaper_stop.clone());

        Ok(Hub {
            config,
            store,
            registry,
            log_sink,
            engine,
            flusher: Mutex::new(flusher),
            reaper_stop,
            reaper_handle: Mutex::new(Some(reaper_handle)),
            shutdown_started: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.engine.local_addr()
    }

    /// Runs the accept loop on the calling thread until [`Hub::shutdown`] is called from
    /// elsewhere (typically a signal handler thread).
    pub fn run(&self) {
        self.engine.run();
    }

    /// Ordered, idempotent shutdown: stop accepting, kick every client, join every reader
    /// thread and the reaper, force one final flush, and close the log sink. Safe to call more
    /// than once (a second call is a no-op) and safe to call from any thread.
    pub fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("hub shutting down");
        self.engine.shutdown();

        self.reaper_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reaper_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.registry.reap(&self.store);

        if let Some(flusher) = self.flusher.lock().unwrap().take() {
            flusher.shutdown(&self.store, &self.config.var_db);
        }

        self.log_sink.close();
    }
}

fn spawn_reaper(registry: Arc<ClientRegistry>, store: Arc<VariableStore>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("hub-reaper".into())
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(REAP_INTERVAL);
                registry.reap(&store);
            }
        })
        .expect("failed to spawn reaper thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::TcpStream;
    use std::time::Duration;

    fn write_schema(dir: &std::path::Path, text: &str) -> std::path::PathBuf {
        let path = dir.join("vars.defs");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn start_and_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.bind_address = "127.0.0.1".parse().unwrap();
        config.bind_port = 0;
        config.var_defs = write_schema(dir.path(), "speed = 0.0, 0, 0\n");
        config.var_db = dir.path().join("vars.db");
        config.log_file = dir.path().join("hub.log");

        let hub = Hub::start(config).unwrap();
        hub.shutdown();
        hub.shutdown();
    }

    #[test]
    fn persistent_variable_survives_a_set_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.bind_address = "127.0.0.1".parse().unwrap();
        config.bind_port = 0;
        config.var_defs = write_schema(dir.path(), "pid_p = 0, 1, 0\n");
        config.var_db = dir.path().join("vars.db");
        config.log_file = dir.path().join("hub.log");
        config.password = "secret".to_owned();

        let hub = Arc::new(Hub::start(config).unwrap());
        let addr = hub.local_addr().unwrap();

        let run_hub = hub.clone();
        let handle = thread::spawn(move || run_hub.run());
        thread::sleep(Duration::from_millis(50));

        let mut sock = TcpStream::connect(addr).unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let auth = hub_codec::Message::reply(1, vec!["COMM".to_owned(), "AUTH".to_owned(), "secret".to_owned()]);
        hub_codec::write_message(&mut sock, &auth).unwrap();
        let reply = hub_codec::read_message(&mut sock).unwrap();
        assert_eq!(reply.components, vec!["COMM", "SUCCESS"]);

        let set = hub_codec::Message::unsolicited(vec![
            "VAR".to_owned(),
            "SET".to_owned(),
            "pid_p".to_owned(),
            "3.25".to_owned(),
        ]);
        hub_codec::write_message(&mut sock, &set).unwrap();

        // give the flusher a moment to coalesce and write before we shut down
        thread::sleep(Duration::from_millis(100));

        hub.shutdown();
        handle.join().unwrap();

        let contents = fs::read_to_string(dir.path().join("vars.db")).unwrap();
        let values = parse_values(&contents);
        assert_eq!(values, vec![("pid_p".to_owned(), 3.25)]);
    }
}
