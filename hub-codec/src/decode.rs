use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::FramingError;
use crate::message::Message;

/// Read one framed [`Message`] from `reader`, blocking until a full frame arrives or the
/// stream ends.
///
/// A clean EOF before any header byte is read is reported as [`FramingError::Eof`]; an EOF in
/// the middle of a header or payload is reported the same way, since both mean the peer is gone
/// mid-frame and the caller's policy (close the connection) is identical either way.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, FramingError> {
    let total_payload_len = match reader.read_u16::<BigEndian>() {
        Ok(n) => n as usize,
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FramingError::Eof),
        Err(e) => return Err(e.into()),
    };
    let request_id = reader.read_u16::<BigEndian>()?;
    let component_count = reader.read_u16::<BigEndian>()? as usize;

    trace!(
        "reading frame: payload_len={} request_id={} components={}",
        total_payload_len,
        request_id,
        component_count
    );

    let mut payload = vec![0u8; total_payload_len];
    reader.read_exact(&mut payload)?;

    let components = split_components(&payload, component_count)?;

    Ok(Message::new(request_id, components))
}

fn split_components(payload: &[u8], component_count: usize) -> Result<Vec<String>, FramingError> {
    let mut components = Vec::with_capacity(component_count);
    let mut rest = payload;

    for index in 0..component_count {
        let nul_at = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FramingError::UnterminatedComponent { index })?;

        let s = std::str::from_utf8(&rest[..nul_at])
            .map_err(|_| FramingError::InvalidUtf8 { index })?;
        components.push(s.to_owned());

        rest = &rest[nul_at + 1..];
    }

    if !rest.is_empty() {
        return Err(FramingError::LengthMismatch {
            declared: payload.len(),
            actual: payload.len() - rest.len(),
        });
    }

    Ok(components)
}
