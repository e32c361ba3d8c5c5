//! Connection repository
//!
//! Storage for connection records with sensitive fields already encrypted.
//! Records keep insertion order, which breaks priority ties.

use crate::domain::{Connection, ConnectionId};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// List all connections in insertion order
    async fn list(&self) -> Result<Vec<Connection>>;

    /// Replace the record with the same id in place, or append it
    async fn upsert(&self, connection: &Connection) -> Result<Connection>;

    /// Delete a connection
    async fn delete(&self, id: ConnectionId) -> Result<()>;
}

fn upsert_in(records: &mut Vec<Connection>, connection: &Connection) {
    match records.iter_mut().find(|c| c.id == connection.id) {
        Some(existing) => *existing = connection.clone(),
        None => records.push(connection.clone()),
    }
}

fn delete_in(records: &mut Vec<Connection>, id: ConnectionId) -> Result<()> {
    let before = records.len();
    records.retain(|c| c.id != id);
    if records.len() == before {
        return Err(AppError::NotFound(format!("Connection {} not found", id)));
    }
    Ok(())
}

/// In-memory store, used by tests and embedders with their own persistence
#[derive(Default)]
pub struct InMemoryConnectionRepository {
    records: RwLock<Vec<Connection>>,
}

impl InMemoryConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connections(connections: Vec<Connection>) -> Self {
        Self {
            records: RwLock::new(connections),
        }
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn list(&self) -> Result<Vec<Connection>> {
        Ok(self.records.read().await.clone())
    }

    async fn upsert(&self, connection: &Connection) -> Result<Connection> {
        upsert_in(&mut *self.records.write().await, connection);
        Ok(connection.clone())
    }

    async fn delete(&self, id: ConnectionId) -> Result<()> {
        delete_in(&mut *self.records.write().await, id)
    }
}

/// Store backed by a JSON array on disk
pub struct JsonFileConnectionRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileConnectionRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<Connection>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a sibling temp file so readers never see a partial file.
    async fn write_all(&self, records: &[Connection]) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionRepository for JsonFileConnectionRepository {
    async fn list(&self) -> Result<Vec<Connection>> {
        self.read_all().await
    }

    async fn upsert(&self, connection: &Connection) -> Result<Connection> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        upsert_in(&mut records, connection);
        self.write_all(&records).await?;
        Ok(connection.clone())
    }

    async fn delete(&self, id: ConnectionId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        delete_in(&mut records, id)?;
        self.write_all(&records).await
    }
}
