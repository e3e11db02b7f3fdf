use thiserror::Error;

/// Domain-level failures raised while handling an already-decoded message.
///
/// These never propagate to other clients; the dispatcher translates each variant into a kick
/// of the offending client (see `hub_server::dispatch`).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtoError {
    #[error("bad password")]
    BadPassword,

    #[error("no password is configured; refusing all authentication")]
    NoPasswordConfigured,

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("variable `{0}` is read-only")]
    ReadOnlyVariable(String),

    #[error("not subscribed to `{0}`")]
    NotSubscribed(String),

    #[error("illegal message")]
    IllegalMessage,

    #[error("request made before authentication")]
    Unauthenticated,
}
