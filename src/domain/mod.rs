//! Domain models for Courier Core

pub mod connection;
pub mod email;
pub mod field;
pub mod provider;

pub use connection::*;
pub use email::*;
pub use field::*;
pub use provider::*;
