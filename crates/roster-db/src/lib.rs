pub mod memory;
pub mod migrations;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use roster_types::models::UserRecord;

pub use memory::MemoryStore;

/// Key-value access to user records, keyed by username.
///
/// `put` is a full overwrite; callers read, modify and write back. A missing
/// key is `Ok(None)`, never an error.
pub trait UserStore: Send + Sync {
    fn get(&self, username: &str) -> Result<Option<UserRecord>>;

    fn put(&self, username: &str, record: &UserRecord) -> Result<()>;

    /// All records, in no particular order.
    fn list(&self) -> Result<Vec<UserRecord>>;

    /// True when no user key exists. Does not decode any record.
    fn is_empty(&self) -> Result<bool>;

    /// Removes every user record and returns how many there were.
    fn delete_all(&self) -> Result<usize>;
}

/// Persistent key-value store on SQLite.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roster_types::models::Role;

    fn record(name: &str) -> UserRecord {
        UserRecord::new(name.into(), "hunter22".into(), Role::User, Utc::now())
    }

    fn check_store_contract(store: &dyn UserStore) {
        assert!(store.get("alice").unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
        assert!(store.is_empty().unwrap());

        let mut alice = record("alice");
        store.put("alice", &alice).unwrap();
        store.put("bob", &record("bob")).unwrap();
        assert!(!store.is_empty().unwrap());
        assert_eq!(store.get("alice").unwrap(), Some(alice.clone()));

        // Keys are case-sensitive
        assert!(store.get("Alice").unwrap().is_none());

        alice.apply_ban(Some("flood"), Utc::now());
        store.put("alice", &alice).unwrap();
        let stored = store.get("alice").unwrap().unwrap();
        assert!(stored.is_banned);
        assert_eq!(stored.bans, 1);

        let mut names: Vec<String> = store.list().unwrap().into_iter().map(|u| u.username).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);

        assert_eq!(store.delete_all().unwrap(), 2);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.delete_all().unwrap(), 0);
    }

    #[test]
    fn sqlite_store_contract() {
        let db = Database::open_in_memory().unwrap();
        check_store_contract(&db);
    }

    #[test]
    fn memory_store_contract() {
        check_store_contract(&MemoryStore::new());
    }

    #[test]
    fn sqlite_emptiness_check_skips_decoding() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute("INSERT INTO kv (key, value) VALUES ('user:broken', '{')", [])?;
            conn.execute("INSERT INTO kv (key, value) VALUES ('meta:x', '1')", [])?;
            Ok(())
        })
        .unwrap();
        assert!(db.list().is_err());
        assert!(!db.is_empty().unwrap());

        db.delete_all().unwrap();
        assert!(db.is_empty().unwrap());
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("roster-test-{}.db", unique_suffix()));
        {
            let db = Database::open(&path).unwrap();
            db.put("carol", &record("carol")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get("carol").unwrap().unwrap().username, "carol");
        drop(db);
        let _ = std::fs::remove_file(&path);
    }

    fn unique_suffix() -> String {
        format!("{}-{}", std::process::id(), Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }
}
