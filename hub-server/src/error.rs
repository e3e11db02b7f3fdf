use std::io;

use thiserror::Error;

/// Failures from the network-facing send path. These never escape a single client: the caller
/// always responds to any variant here by marking that client closed.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("client socket is not writable; dropping rather than buffering")]
    SlowConsumer,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Framing(#[from] hub_codec::FramingError),
}
