//! Cryptographic utilities for Courier Core

pub mod vault;

pub use vault::{CredentialVault, EncryptionError, EncryptionKey};
