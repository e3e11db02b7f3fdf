use std::io;

use thiserror::Error;

/// Errors that can occur while decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("connection closed while reading frame")]
    Eof,

    #[error("component {index} is not NUL-terminated")]
    UnterminatedComponent { index: usize },

    #[error("component {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },

    #[error("declared payload length {declared} does not match {actual} bytes of components")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("message has {0} bytes of payload, which exceeds the 65535 byte limit")]
    MessageTooLarge(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}
