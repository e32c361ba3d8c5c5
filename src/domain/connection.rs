//! Connection domain types

use super::field::is_blank;
use super::provider::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

pub type ConnectionId = Uuid;

/// A configured, credentialed instance of a provider.
///
/// Fields the provider schema flags as `encrypt` are held in encrypted form
/// while the connection sits in the registry; handlers receive a decrypted
/// copy. `Debug` output lists field names only, so a connection can be logged
/// without leaking credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub provider_type: ProviderKind,
    pub title: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    /// Lower values are tried first
    pub priority: i64,
    #[serde(default)]
    pub force_from_email: bool,
    #[serde(default)]
    pub force_from_name: bool,
    pub created_at: DateTime<Utc>,
    /// Bumped on every replace; keys the decrypted-copy cache
    #[serde(default)]
    pub version: u64,
}

impl Connection {
    /// Get a string field, ignoring blank values
    pub fn field_str(&self, name: &str) -> Option<&str> {
        if is_blank(self.fields.get(name)) {
            return None;
        }
        self.fields.get(name).and_then(Value::as_str).map(str::trim)
    }

    pub fn from_email(&self) -> Option<&str> {
        self.field_str("from_email")
    }

    pub fn from_name(&self) -> Option<&str> {
        self.field_str("from_name")
    }
}

struct FieldNames<'a>(&'a HashMap<String, Value>);

impl fmt::Debug for FieldNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.0.keys().collect();
        names.sort();
        f.debug_list().entries(names).finish()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("provider_type", &self.provider_type)
            .field("title", &self.title)
            .field("fields", &FieldNames(&self.fields))
            .field("priority", &self.priority)
            .field("force_from_email", &self.force_from_email)
            .field("force_from_name", &self.force_from_name)
            .field("created_at", &self.created_at)
            .field("version", &self.version)
            .finish()
    }
}

fn default_priority() -> i64 {
    10
}

/// Input for creating or fully replacing a connection
#[derive(Clone, Deserialize, Validate)]
pub struct ConnectionInput {
    /// Present when replacing an existing connection
    #[serde(default)]
    pub id: Option<ConnectionId>,
    #[validate(length(min = 1, max = 64))]
    pub provider_type: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub force_from_email: bool,
    #[serde(default)]
    pub force_from_name: bool,
}

impl fmt::Debug for ConnectionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInput")
            .field("id", &self.id)
            .field("provider_type", &self.provider_type)
            .field("title", &self.title)
            .field("fields", &FieldNames(&self.fields))
            .field("priority", &self.priority)
            .finish()
    }
}

/// Narrows the candidate list handed to the orchestrator
#[derive(Debug, Clone, Default)]
pub struct ConnectionFilter {
    pub provider_type: Option<ProviderKind>,
    pub ids: Option<Vec<ConnectionId>>,
}

impl ConnectionFilter {
    pub fn matches(&self, connection: &Connection) -> bool {
        if let Some(kind) = self.provider_type {
            if connection.provider_type != kind {
                return false;
            }
        }
        match &self.ids {
            Some(ids) => ids.contains(&connection.id),
            None => true,
        }
    }
}
