//! Protocol domain types shared by every part of the hub: message namespaces and verbs, the
//! notification [`Filter`], the client [`ConnectionState`] machine, the [`Authenticator`]
//! contract, and the variable/schema data model.

mod auth;
mod error;
mod filter;
mod namespace;
mod state;
mod variable;

pub use crate::auth::{Authenticator, MockAuthenticator, SharedPasswordAuthenticator};
pub use crate::error::ProtoError;
pub use crate::filter::{any_matches, Filter, FilterType};
pub use crate::namespace::{Namespace, Verb};
pub use crate::state::{ConnectionState, ConnectionStateCell};
pub use crate::variable::{SchemaParseError, Variable, VariableSchema};
