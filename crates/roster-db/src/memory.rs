use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use roster_types::models::UserRecord;

use crate::UserStore;

/// In-process store. Lives as long as the value that owns it; nothing is
/// shared between processes.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_users<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut HashMap<String, UserRecord>) -> T,
    {
        let mut users = self.users.lock().map_err(|e| anyhow!("Store lock poisoned: {}", e))?;
        Ok(f(&mut users))
    }
}

impl UserStore for MemoryStore {
    fn get(&self, username: &str) -> Result<Option<UserRecord>> {
        self.with_users(|users| users.get(username).cloned())
    }

    fn put(&self, username: &str, record: &UserRecord) -> Result<()> {
        self.with_users(|users| {
            users.insert(username.to_string(), record.clone());
        })
    }

    fn list(&self) -> Result<Vec<UserRecord>> {
        self.with_users(|users| users.values().cloned().collect())
    }

    fn is_empty(&self) -> Result<bool> {
        self.with_users(|users| users.is_empty())
    }

    fn delete_all(&self) -> Result<usize> {
        self.with_users(|users| {
            let count = users.len();
            users.clear();
            count
        })
    }
}
