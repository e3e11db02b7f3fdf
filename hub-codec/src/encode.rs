use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::FramingError;
use crate::message::Message;
use crate::MAX_PAYLOAD_LEN;

/// Encode `msg` and write the resulting frame to `writer`.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<(), FramingError> {
    let mut payload = Vec::new();
    for c in &msg.components {
        payload.extend_from_slice(c.as_bytes());
        payload.push(0);
    }

    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FramingError::MessageTooLarge(payload.len()));
    }

    trace!(
        "writing frame: payload_len={} request_id={} components={}",
        payload.len(),
        msg.request_id,
        msg.components.len()
    );

    writer.write_u16::<BigEndian>(payload.len() as u16)?;
    writer.write_u16::<BigEndian>(msg.request_id)?;
    writer.write_u16::<BigEndian>(msg.components.len() as u16)?;
    writer.write_all(&payload)?;

    Ok(())
}

/// Encode `msg` into a standalone byte buffer, without writing it anywhere.
///
/// Used by senders that need the bytes ready before taking the per-client send lock
/// (see `hub_server::net`), so the lock is held only across the actual `write`.
pub fn encode(msg: &Message) -> Result<Vec<u8>, FramingError> {
    let mut buf = Vec::new();
    write_message(&mut buf, msg)?;
    Ok(buf)
}
