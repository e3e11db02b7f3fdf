use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::StoreError;
use crate::store::VariableStore;

/// Shared handle used by `VariableStore::set` to wake the flusher. `pending` coalesces any
/// number of writes between two flushes into a single disk write.
#[derive(Clone)]
pub struct FlushRequester {
    pending: Arc<(Mutex<bool>, Condvar)>,
}

impl FlushRequester {
    pub fn new() -> Self {
        FlushRequester {
            pending: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn request(&self) {
        let (lock, cvar) = &*self.pending;
        let mut pending = lock.lock().unwrap();
        *pending = true;
        cvar.notify_one();
    }

    fn wait(&self, stop: &AtomicBool, poll_interval: Duration) -> bool {
        let (lock, cvar) = &*self.pending;
        let mut pending = lock.lock().unwrap();
        while !*pending {
            if stop.load(Ordering::SeqCst) {
                return false;
            }
            let (guard, _timeout) = cvar.wait_timeout(pending, poll_interval).unwrap();
            pending = guard;
        }
        *pending = false;
        true
    }
}

impl Default for FlushRequester {
    fn default() -> Self {
        FlushRequester::new()
    }
}

/// Background writer that owns the persistent-value file.
///
/// Writes a fresh `<db>.0` file containing every persistent variable, then atomically renames
/// it over `<db>`, so a crash mid-write leaves the previous, consistent file in place.
pub struct Flusher {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    requester: FlushRequester,
}

impl Flusher {
    /// Spawn the background flush thread for `store`, writing to `db_path`.
    ///
    /// `requester` must be the same `FlushRequester` the store was built with
    /// (`VariableStore::with_flusher`) — it's how `set()` wakes this thread.
    pub fn spawn(
        store: Arc<VariableStore>,
        requester: FlushRequester,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        let db_path = db_path.into();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_requester = requester.clone();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("hub-flusher".into())
            .spawn(move || {
                while thread_requester.wait(&thread_stop, Duration::from_millis(250)) {
                    if let Err(e) = write_snapshot(&store, &db_path) {
                        error!("failed to flush persistent values to {:?}: {}", db_path, e);
                    }
                }
            })
            .expect("failed to spawn flusher thread");

        Flusher {
            handle: Some(handle),
            stop,
            requester,
        }
    }

    /// Stop the background thread, flushing once more first so nothing written right before
    /// shutdown is lost.
    pub fn shutdown(mut self, store: &VariableStore, db_path: &Path) {
        let _ = write_snapshot(store, db_path);
        self.stop.store(true, Ordering::SeqCst);
        self.requester.request();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn write_snapshot(store: &VariableStore, db_path: &Path) -> Result<(), StoreError> {
    let snapshot = store.persistent_snapshot();
    write_snapshot_lines(&snapshot, db_path)
}

fn write_snapshot_lines(values: &[(String, f64)], db_path: &Path) -> Result<(), StoreError> {
    let tmp_path = tmp_path_for(db_path);

    let mut contents = String::from("# hub persistent variable database\n");
    for (name, value) in values {
        contents.push_str(&format!("{} = {:.4}\n", name, value));
    }

    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(contents.as_bytes())?;
        f.sync_all()?;
    }

    fs::rename(&tmp_path, db_path)?;

    Ok(())
}

fn tmp_path_for(db_path: &Path) -> PathBuf {
    let mut tmp = db_path.as_os_str().to_owned();
    tmp.push(".0");
    PathBuf::from(tmp)
}

/// Parse a persistent-value file (`name = value` per line, `#` comments, blank lines ignored).
pub fn parse_values(text: &str) -> Vec<(String, f64)> {
    let mut values = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once('=') {
            let name = name.trim();
            if let Ok(value) = value.trim().parse::<f64>() {
                values.push((name.to_owned(), value));
            } else {
                warn!("ignoring malformed persistent value line: `{}`", line);
            }
        } else {
            warn!("ignoring malformed persistent value line: `{}`", line);
        }
    }
    values
}
