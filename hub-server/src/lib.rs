//! Network engine, client registry, notification router, dispatcher, log sink, configuration
//! and process supervisor for the hub broker.
//!
//! [`supervisor::Hub`] is the assembled process: it owns the [`registry::ClientRegistry`], the
//! [`hub_store::VariableStore`], the [`log_sink::LogSink`], and the [`net::NetworkEngine`], wired
//! together in the startup order the component design calls for.

#[macro_use]
extern crate log;

mod client;
mod config;
mod dispatch;
mod error;
mod log_sink;
mod net;
mod registry;
mod router;
mod supervisor;

pub use crate::client::Client;
pub use crate::config::{Config, DEFAULT_MAX_CLIENTS};
pub use crate::dispatch::Dispatcher;
pub use crate::error::NetError;
pub use crate::log_sink::{LogLevel, LogSink};
pub use crate::net::NetworkEngine;
pub use crate::registry::ClientRegistry;
pub use crate::router::NotificationRouter;
pub use crate::supervisor::{Hub, SupervisorError};
