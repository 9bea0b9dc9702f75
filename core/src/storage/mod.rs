//! Durable key/value storage with the shape of the browser's `localStorage`.
//!
//! Values are plain strings; callers JSON-encode structured data. Every
//! mutation is committed before the call returns.

use std::collections::BTreeMap;
use std::sync::RwLock;

use r2d2_sqlite::rusqlite::{params, OptionalExtension};
use time::OffsetDateTime;

use crate::db::DbPool;
use crate::errors::PrismError;

pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, PrismError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PrismError>;
    fn remove_item(&self, key: &str) -> Result<(), PrismError>;
    /// All keys currently present, in ascending order.
    fn keys(&self) -> Result<Vec<String>, PrismError>;
}

/// Storage backed by the `local_storage` table of the application database.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: DbPool,
}

impl SqliteStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }
}

impl LocalStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PrismError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PrismError> {
        let conn = self.pool.get()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        conn.execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PrismError> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PrismError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT key FROM local_storage ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

/// Process-local storage for ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> PrismError {
    PrismError::Storage("storage lock poisoned".into())
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PrismError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PrismError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PrismError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PrismError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn exercise(storage: &dyn LocalStorage) {
        assert_eq!(storage.get_item("a").unwrap(), None);
        storage.set_item("b", "2").unwrap();
        storage.set_item("a", "1").unwrap();
        storage.set_item("a", "3").unwrap();
        assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("3"));
        assert_eq!(storage.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        storage.remove_item("a").unwrap();
        storage.remove_item("a").unwrap();
        assert_eq!(storage.get_item("a").unwrap(), None);
    }

    #[test]
    fn memory_storage_behaves_like_local_storage() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn sqlite_storage_behaves_like_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().to_path_buf()).unwrap();
        exercise(&SqliteStorage::new(pool));
    }

    #[test]
    fn sqlite_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = SqliteStorage::new(init_db(dir.path().to_path_buf()).unwrap());
            storage.set_item("selected-providers", "[\"openai\"]").unwrap();
        }
        let storage = SqliteStorage::new(init_db(dir.path().to_path_buf()).unwrap());
        assert_eq!(
            storage.get_item("selected-providers").unwrap().as_deref(),
            Some("[\"openai\"]")
        );
    }
}
