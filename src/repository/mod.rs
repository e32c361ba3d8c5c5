//! Data access layer (Repository pattern)

pub mod connection;

pub use connection::{
    ConnectionRepository, InMemoryConnectionRepository, JsonFileConnectionRepository,
};
