use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown variable `{0}`")]
    NotFound(String),

    #[error("variable `{0}` is read-only")]
    ReadOnly(String),

    #[error("client is not subscribed to `{0}`")]
    NotSubscribed(String),

    #[error("persistent value file names unknown variable `{0}`")]
    UnknownPersistedVariable(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
