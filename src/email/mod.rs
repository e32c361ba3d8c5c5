//! Email delivery through third-party providers
//!
//! Each provider implements [`EmailProvider`]; [`factory`] maps a
//! connection's provider type to its handler:
//! - Mailgun (HTTP API)
//! - Gmail (configuration only)
//! - Netcore (configuration only)

pub mod factory;
pub mod gmail;
pub mod mailgun;
pub mod netcore;
pub mod payload;
pub mod provider;

pub use factory::{DefaultEmailProviderFactory, EmailProviderFactory};
pub use gmail::GmailProvider;
pub use mailgun::MailgunProvider;
pub use netcore::NetcoreProvider;
pub use provider::{EmailProvider, EmailProviderError};
