//! The hub's typed variable table: reads, writes, change subscriptions, and the background
//! thread that coalesces writes to persistent variables out to disk.

#[macro_use]
extern crate log;

mod error;
mod flush;
mod store;

pub use crate::error::StoreError;
pub use crate::flush::{parse_values, FlushRequester, Flusher};
pub use crate::store::{NotifySink, VariableStore};
