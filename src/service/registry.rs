//! Connection Registry
//!
//! Holds the configured connections as an immutable snapshot. Readers clone
//! the snapshot `Arc` and never wait on administrative writes, which build a
//! new snapshot and swap it in. Decrypted copies are cached per connection
//! version and dropped whenever that connection is replaced or deleted.

use crate::crypto::CredentialVault;
use crate::domain::{
    is_blank, Connection, ConnectionFilter, ConnectionId, ConnectionInput, FieldSchema,
    ProviderKind, ProviderOptions,
};
use crate::email::factory;
use crate::error::{AppError, Result};
use crate::repository::ConnectionRepository;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;
use validator::Validate;

/// Options for a provider type string
pub fn describe_provider(provider_type: &str) -> Result<ProviderOptions> {
    let kind: ProviderKind = provider_type.parse()?;
    Ok(factory::describe(kind))
}

/// Field schema for a provider type string
pub fn provider_schema(provider_type: &str) -> Result<FieldSchema> {
    Ok(describe_provider(provider_type)?.fields)
}

/// Registry of configured connections
pub struct ConnectionRegistry<R: ConnectionRepository> {
    repo: Arc<R>,
    vault: CredentialVault,
    snapshot: RwLock<Arc<Vec<Connection>>>,
    decrypted: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<R: ConnectionRepository> ConnectionRegistry<R> {
    /// Load the registry from its repository
    pub async fn load(repo: Arc<R>, vault: CredentialVault) -> Result<Self> {
        let connections = repo.list().await?;
        tracing::info!(count = connections.len(), "Loaded connections");

        Ok(Self {
            repo,
            vault,
            snapshot: RwLock::new(Arc::new(connections)),
            decrypted: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Current snapshot, with sensitive fields still encrypted
    pub fn snapshot(&self) -> Arc<Vec<Connection>> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Connections ready for delivery, ascending by priority.
    ///
    /// Ties keep insertion order. Connections missing a required field are
    /// left out.
    pub fn list_usable_connections(&self, filter: Option<&ConnectionFilter>) -> Vec<Connection> {
        let snapshot = self.snapshot();
        let mut usable: Vec<Connection> = snapshot
            .iter()
            .filter(|c| filter.map_or(true, |f| f.matches(c)))
            .filter(|c| match factory::schema(c.provider_type).check_required(&c.fields) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(connection_id = %c.id, error = %e, "Skipping incomplete connection");
                    false
                }
            })
            .cloned()
            .collect();

        usable.sort_by_key(|c| c.priority);
        usable
    }

    pub fn get(&self, id: ConnectionId) -> Result<Connection> {
        self.snapshot()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))
    }

    /// Create or fully replace a connection.
    ///
    /// Fields are validated against the provider schema and sensitive ones
    /// encrypted before anything is persisted. A sensitive value equal to the
    /// masked form of the stored one keeps the stored ciphertext.
    pub async fn save(&self, input: ConnectionInput) -> Result<Connection> {
        input.validate()?;
        let kind: ProviderKind = input.provider_type.parse()?;
        let schema = factory::schema(kind);

        let _guard = self.write_lock.lock().await;

        let existing = match input.id {
            Some(id) => Some(self.get(id)?),
            None => None,
        };

        let mut fields = schema.validate(&input.fields)?;
        let mut kept = HashMap::new();
        let resubmits_mask = schema.encrypted_fields().any(|name| {
            matches!(fields.get(name), Some(Value::String(v)) if v.starts_with('*'))
        });
        let current = existing
            .as_ref()
            .filter(|e| resubmits_mask && e.provider_type == kind)
            .and_then(|e| self.decrypted(e).ok());
        if let (Some(existing), Some(current)) = (existing.as_ref(), current) {
            for name in schema.encrypted_fields() {
                let (Some(Value::String(submitted)), Some(plain)) =
                    (fields.get(name), current.field_str(name))
                else {
                    continue;
                };
                if *submitted == CredentialVault::mask(plain) {
                    if let Some(stored) = existing.fields.get(name) {
                        kept.insert(name.to_string(), stored.clone());
                    }
                }
            }
        }
        for name in kept.keys() {
            fields.remove(name);
        }

        let mut fields = self.vault.encrypt_fields(&schema, &fields)?;
        fields.extend(kept);

        let connection = Connection {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            provider_type: kind,
            title: input.title.trim().to_string(),
            fields,
            priority: input.priority,
            force_from_email: input.force_from_email,
            force_from_name: input.force_from_name,
            created_at: existing
                .as_ref()
                .map(|e| e.created_at)
                .unwrap_or_else(Utc::now),
            version: existing.as_ref().map(|e| e.version + 1).unwrap_or(1),
        };

        let saved = self.repo.upsert(&connection).await?;
        self.refresh().await?;
        self.invalidate(saved.id);

        tracing::info!(
            connection_id = %saved.id,
            provider = %saved.provider_type,
            version = saved.version,
            "Connection saved"
        );
        Ok(saved)
    }

    /// Delete a connection and drop its decrypted copy
    pub async fn delete(&self, id: ConnectionId) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.repo.delete(id).await?;
        self.refresh().await?;
        self.invalidate(id);

        tracing::info!(connection_id = %id, "Connection deleted");
        Ok(())
    }

    /// Re-read the repository and swap in a new snapshot
    pub async fn refresh(&self) -> Result<()> {
        let connections = Arc::new(self.repo.list().await?);
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = connections;
        Ok(())
    }

    /// Decrypted copy of a connection, cached until the connection changes.
    ///
    /// Only the version in the current snapshot is cached, so a copy taken
    /// before a replace or delete is decrypted but never stored.
    pub fn decrypted(&self, connection: &Connection) -> Result<Arc<Connection>> {
        if let Some(cached) = self
            .cache()
            .get(&connection.id)
            .filter(|c| c.version == connection.version)
        {
            return Ok(cached.clone());
        }

        let schema = factory::schema(connection.provider_type);
        let mut plain = connection.clone();
        plain.fields = self.vault.decrypt_fields(&schema, &connection.fields)?;
        let plain = Arc::new(plain);

        let mut cache = self.cache();
        let current = self
            .snapshot()
            .iter()
            .any(|c| c.id == connection.id && c.version == connection.version);
        if current {
            cache.insert(connection.id, plain.clone());
        }
        Ok(plain)
    }

    /// Copy of a connection with sensitive fields decrypted and masked
    pub fn masked(&self, id: ConnectionId) -> Result<Connection> {
        let connection = self.get(id)?;
        let plain = self.decrypted(&connection)?;
        let schema = factory::schema(connection.provider_type);

        let mut masked = (*plain).clone();
        for name in schema.encrypted_fields() {
            if is_blank(masked.fields.get(name)) {
                continue;
            }
            if let Some(value) = plain.field_str(name) {
                masked
                    .fields
                    .insert(name.to_string(), Value::String(CredentialVault::mask(value)));
            }
        }
        Ok(masked)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.decrypted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn invalidate(&self, id: ConnectionId) {
        self.cache().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;
    use crate::repository::connection::MockConnectionRepository;
    use crate::repository::InMemoryConnectionRepository;
    use serde_json::json;

    fn vault() -> CredentialVault {
        CredentialVault::new(EncryptionKey::new([0x42u8; 32]))
    }

    fn mailgun_input(title: &str, priority: i64) -> ConnectionInput {
        ConnectionInput {
            id: None,
            provider_type: "mailgun".to_string(),
            title: title.to_string(),
            fields: HashMap::from([
                ("api_key".to_string(), json!("key-abcdef123456")),
                ("domain".to_string(), json!("mg.example.com")),
                ("from_email".to_string(), json!("ops@mg.example.com")),
            ]),
            priority,
            force_from_email: false,
            force_from_name: false,
        }
    }

    async fn registry() -> ConnectionRegistry<InMemoryConnectionRepository> {
        ConnectionRegistry::load(Arc::new(InMemoryConnectionRepository::new()), vault())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_encrypts_sensitive_fields() {
        let registry = registry().await;
        let saved = registry.save(mailgun_input("Primary", 10)).await.unwrap();

        assert_ne!(saved.fields["api_key"], json!("key-abcdef123456"));
        assert_eq!(saved.fields["domain"], json!("mg.example.com"));
        assert_eq!(saved.fields["region"], json!("US"));
        assert_eq!(saved.version, 1);

        let plain = registry.decrypted(&saved).unwrap();
        assert_eq!(plain.field_str("api_key"), Some("key-abcdef123456"));
    }

    #[tokio::test]
    async fn test_save_rejects_missing_required_field() {
        let registry = registry().await;
        let mut input = mailgun_input("Primary", 10);
        input.fields.remove("domain");

        let err = registry.save(input).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidConfiguration { ref field_name, .. } if field_name == "domain"
        ));
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_save_rejects_unknown_provider() {
        let registry = registry().await;
        let mut input = mailgun_input("Primary", 10);
        input.provider_type = "sendgrid".to_string();
        assert!(matches!(
            registry.save(input).await,
            Err(AppError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_then_insertion() {
        let registry = registry().await;
        for (title, priority) in [("c", 30), ("a", 10), ("b", 20), ("a2", 10)] {
            registry.save(mailgun_input(title, priority)).await.unwrap();
        }

        let titles: Vec<String> = registry
            .list_usable_connections(None)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["a", "a2", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_skips_incomplete_connections() {
        let complete = Connection {
            id: Uuid::new_v4(),
            provider_type: ProviderKind::Netcore,
            title: "ok".to_string(),
            fields: HashMap::from([
                ("api_key".to_string(), json!("cipher")),
                ("from_email".to_string(), json!("a@x.com")),
            ]),
            priority: 1,
            force_from_email: false,
            force_from_name: false,
            created_at: Utc::now(),
            version: 1,
        };
        let mut incomplete = complete.clone();
        incomplete.id = Uuid::new_v4();
        incomplete.fields.remove("api_key");

        let repo = InMemoryConnectionRepository::with_connections(vec![complete.clone(), incomplete]);
        let registry = ConnectionRegistry::load(Arc::new(repo), vault()).await.unwrap();

        assert_eq!(registry.list_usable_connections(None), vec![complete]);
    }

    #[tokio::test]
    async fn test_filter() {
        let registry = registry().await;
        let first = registry.save(mailgun_input("first", 10)).await.unwrap();
        registry.save(mailgun_input("second", 20)).await.unwrap();

        let filter = ConnectionFilter {
            provider_type: None,
            ids: Some(vec![first.id]),
        };
        let listed = registry.list_usable_connections(Some(&filter));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);
    }

    #[tokio::test]
    async fn test_replace_bumps_version_and_invalidates_cache() {
        let registry = registry().await;
        let saved = registry.save(mailgun_input("Primary", 10)).await.unwrap();
        assert_eq!(
            registry.decrypted(&saved).unwrap().field_str("api_key"),
            Some("key-abcdef123456")
        );

        let mut input = mailgun_input("Primary", 10);
        input.id = Some(saved.id);
        input.fields.insert("api_key".to_string(), json!("key-rotated"));
        let replaced = registry.save(input).await.unwrap();

        assert_eq!(replaced.version, 2);
        assert_eq!(replaced.created_at, saved.created_at);
        let current = registry.get(saved.id).unwrap();
        assert_eq!(
            registry.decrypted(&current).unwrap().field_str("api_key"),
            Some("key-rotated")
        );
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_resubmitted_mask_keeps_stored_secret() {
        let registry = registry().await;
        let saved = registry.save(mailgun_input("Primary", 10)).await.unwrap();
        let masked = registry.masked(saved.id).unwrap();
        assert_eq!(masked.fields["api_key"], json!("************3456"));

        let mut input = mailgun_input("Primary", 5);
        input.id = Some(saved.id);
        input
            .fields
            .insert("api_key".to_string(), masked.fields["api_key"].clone());
        let replaced = registry.save(input).await.unwrap();

        assert_eq!(replaced.fields["api_key"], saved.fields["api_key"]);
        assert_eq!(
            registry.decrypted(&replaced).unwrap().field_str("api_key"),
            Some("key-abcdef123456")
        );
    }

    #[tokio::test]
    async fn test_replace_unknown_id() {
        let registry = registry().await;
        let mut input = mailgun_input("Primary", 10);
        input.id = Some(Uuid::new_v4());
        assert!(matches!(registry.save(input).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_connection() {
        let registry = registry().await;
        let saved = registry.save(mailgun_input("Primary", 10)).await.unwrap();
        registry.decrypted(&saved).unwrap();

        registry.delete(saved.id).await.unwrap();
        assert!(registry.list_usable_connections(None).is_empty());
        assert!(matches!(registry.masked(saved.id), Err(AppError::NotFound(_))));
        assert!(registry.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stale_candidate_after_delete_is_not_cached() {
        let registry = registry().await;
        registry.save(mailgun_input("Primary", 10)).await.unwrap();
        let candidates = registry.list_usable_connections(None);

        registry.delete(candidates[0].id).await.unwrap();
        let plain = registry.decrypted(&candidates[0]).unwrap();

        assert_eq!(plain.field_str("api_key"), Some("key-abcdef123456"));
        assert!(registry.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_after_replace_is_not_cached() {
        let registry = registry().await;
        let saved = registry.save(mailgun_input("Primary", 10)).await.unwrap();

        let mut input = mailgun_input("Primary", 10);
        input.id = Some(saved.id);
        registry.save(input).await.unwrap();
        registry.decrypted(&saved).unwrap();

        assert!(registry.cache().is_empty());
    }

    #[tokio::test]
    async fn test_replace_with_fresh_secret_after_key_change() {
        let repo = Arc::new(InMemoryConnectionRepository::new());
        let original = ConnectionRegistry::load(repo.clone(), vault()).await.unwrap();
        let saved = original.save(mailgun_input("Primary", 10)).await.unwrap();

        let rotated = CredentialVault::new(EncryptionKey::new([0x99u8; 32]));
        let registry = ConnectionRegistry::load(repo, rotated).await.unwrap();
        assert!(matches!(
            registry.decrypted(&saved),
            Err(AppError::Encryption(_))
        ));

        let mut input = mailgun_input("Primary", 10);
        input.id = Some(saved.id);
        input.fields.insert("api_key".to_string(), json!("key-brand-new"));
        let replaced = registry.save(input).await.unwrap();

        assert_eq!(replaced.id, saved.id);
        assert_eq!(replaced.created_at, saved.created_at);
        assert_eq!(replaced.version, 2);
        assert_eq!(
            registry.decrypted(&replaced).unwrap().field_str("api_key"),
            Some("key-brand-new")
        );
    }

    #[tokio::test]
    async fn test_load_propagates_storage_errors() {
        let mut mock = MockConnectionRepository::new();
        mock.expect_list()
            .returning(|| Err(AppError::Storage("disk on fire".to_string())));

        let result = ConnectionRegistry::load(Arc::new(mock), vault()).await;
        assert!(matches!(result, Err(AppError::Storage(_))));
    }

    #[test]
    fn test_describe_provider() {
        let options = describe_provider("mailgun").unwrap();
        assert_eq!(options.display_name, "Mailgun");
        assert!(provider_schema("Gmail").unwrap().is_encrypted("refresh_token"));
        assert!(describe_provider("smtp").is_err());
    }
}
