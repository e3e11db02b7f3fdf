//! Wire framing for the hub protocol.
//!
//! A frame is a 6 byte big-endian header followed by `component_count` NUL-terminated
//! UTF-8 strings:
//!
//! ```text
//! [2B total_payload_len][2B request_id][2B component_count][component0\0component1\0...]
//! ```

#[macro_use]
extern crate log;

mod error;
mod message;

mod decode;
mod encode;

pub use crate::error::FramingError;
pub use crate::message::Message;

pub use crate::decode::read_message;
pub use crate::encode::{encode, write_message};

/// Header size in bytes: total_payload_len, request_id, component_count.
pub const HEADER_LEN: usize = 6;

/// Largest payload (component bytes, including NUL terminators) a single frame may carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
