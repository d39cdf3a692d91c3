//! The connection engine and its public error/handler types.

mod connection;

pub use connection::{
    Connection, ConnectionError, ConnectionHandler, NullHandler, State, TransportErrorKind,
};
