//! Process entry point: parses a single optional config-path argument, assembles the hub, and
//! installs the three POSIX signals that trigger a graceful, drained shutdown. Any other fatal
//! signal takes the OS default fast-exit path and skips drained shutdown entirely, since this
//! binary never installs a handler for it.

#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;
use structopt::StructOpt;

use hub_server::{Config, Hub};

#[derive(StructOpt, Debug)]
#[structopt(name = "hub", about = "central broker for the robotics framework")]
struct Opt {
    /// Path to the hub configuration file. If omitted, or if it can't be read, built-in
    /// defaults are used.
    #[structopt(parse(from_os_str))]
    config: Option<PathBuf>,
}

fn main() {
    pretty_env_logger::init();

    let opt = Opt::from_args();

    if let Err(e) = run(opt) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    let config = load_config(opt.config.as_deref());

    let hub = Arc::new(Hub::start(config).context("starting hub")?);
    info!("hub listening on {:?}", hub.local_addr());

    let stop_requested = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, stop_requested.clone()).context("registering SIGINT handler")?;
    flag::register(SIGTERM, stop_requested.clone()).context("registering SIGTERM handler")?;
    flag::register(SIGHUP, stop_requested.clone()).context("registering SIGHUP handler")?;

    let shutdown_hub = hub.clone();
    thread::spawn(move || {
        while !stop_requested.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
        }
        info!("signal received; starting graceful shutdown");
        shutdown_hub.shutdown();
    });

    hub.run();

    Ok(())
}

/// A missing or unreadable config path is a warning, not a fatal error: the hub falls back to
/// built-in defaults and keeps running.
fn load_config(path: Option<&std::path::Path>) -> Config {
    match path {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("could not load config {:?} ({}); using built-in defaults", path, e);
                Config::default()
            }
        },
        None => {
            warn!("no config file given; using built-in defaults");
            Config::default()
        }
    }
}
