use crate::{Database, UserStore};
use anyhow::{Context, Result};
use roster_types::models::UserRecord;
use rusqlite::Connection;

/// Prefix for user records in the key space.
const USER_PREFIX: &str = "user:";

fn user_key(username: &str) -> String {
    format!("{USER_PREFIX}{username}")
}

impl UserStore for Database {
    fn get(&self, username: &str) -> Result<Option<UserRecord>> {
        self.with_conn(|conn| query_value(conn, &user_key(username)))?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn put(&self, username: &str, record: &UserRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (user_key(username), value),
            )?;
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<UserRecord>> {
        let raws = self.with_conn(|conn| {
            // substr instead of LIKE: usernames may contain '%' or '_'
            let mut stmt = conn.prepare(
                "SELECT value FROM kv WHERE substr(key, 1, ?1) = ?2",
            )?;
            let rows = stmt
                .query_map((USER_PREFIX.len() as i64, USER_PREFIX), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        raws.iter().map(|raw| decode(raw)).collect()
    }

    fn is_empty(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let any: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM kv WHERE substr(key, 1, ?1) = ?2)",
                (USER_PREFIX.len() as i64, USER_PREFIX),
                |row| row.get(0),
            )?;
            Ok(!any)
        })
    }

    fn delete_all(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM kv WHERE substr(key, 1, ?1) = ?2",
                (USER_PREFIX.len() as i64, USER_PREFIX),
            )?;
            Ok(removed)
        })
    }
}

fn decode(raw: &str) -> Result<UserRecord> {
    serde_json::from_str(raw).context("corrupt user record in kv store")
}

fn query_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
