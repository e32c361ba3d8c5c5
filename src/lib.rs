//! Courier Core - transactional email delivery
//!
//! This crate sends email through any of several third-party providers,
//! tried in the priority order of their configured connections, with
//! provider-specific authentication and request formatting hidden behind
//! the [`email::EmailProvider`] trait.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod email;
pub mod error;
pub mod repository;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use service::{ConnectionRegistry, DeliveryOrchestrator};
