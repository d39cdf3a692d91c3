//! A pure Rust implementation of the Device Control Protocol (DCP), a
//! length-prefixed, big-endian binary message protocol spoken over TCP to
//! a central DCP hub.

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod client;
pub mod hub;
pub mod message;
pub mod parser;
mod packet;
mod wire;

pub use message::{DcpFlags, Message};
pub use wire::{DEFAULT_PORT, MAX_PACKET_SIZE};

/// Crate-level result alias for [`client::ConnectionError`], the one
/// fallible error type exposed by this crate's public API.
pub type Result<T> = std::result::Result<T, client::ConnectionError>;
