use std::path::Path;
use std::sync::Mutex;

use binsync_core::Position;
use rusqlite::Connection;
use tracing::info;

use crate::error::StateResult;
use crate::PositionStore;

/// SQLite-backed position store.
pub struct SqlitePositionStore {
    conn: Mutex<Connection>,
}

impl SqlitePositionStore {
    /// Open or create a position store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening position store");

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory position store (for testing).
    pub fn in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StateResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                server_id INTEGER PRIMARY KEY,
                log_file TEXT NOT NULL,
                log_offset INTEGER NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }
}

impl PositionStore for SqlitePositionStore {
    fn get_position(&self, server_id: u32) -> StateResult<Option<Position>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT log_file, log_offset FROM positions WHERE server_id = ?1")?;

        let result = stmt.query_row([server_id], |row| {
            Ok(Position {
                log_file: row.get::<_, String>(0)?,
                log_offset: row.get::<_, i64>(1)? as u64,
            })
        });

        match result {
            Ok(position) => Ok(Some(position)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_position(&self, server_id: u32, position: &Position) -> StateResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO positions (server_id, log_file, log_offset, updated_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
             ON CONFLICT(server_id) DO UPDATE SET
                log_file = ?2,
                log_offset = ?3,
                updated_at = CURRENT_TIMESTAMP",
            rusqlite::params![server_id, position.log_file, position.log_offset as i64],
        )?;

        Ok(())
    }

    fn all_positions(&self) -> StateResult<Vec<(u32, Position)>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT server_id, log_file, log_offset FROM positions ORDER BY server_id")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                Position {
                    log_file: row.get::<_, String>(1)?,
                    log_offset: row.get::<_, i64>(2)? as u64,
                },
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_roundtrip() {
        let store = SqlitePositionStore::in_memory().unwrap();

        // Initially no position
        assert!(store.get_position(1001).unwrap().is_none());

        store
            .set_position(1001, &Position::new("mysql-bin.000003", 12345))
            .unwrap();

        let loaded = store.get_position(1001).unwrap().unwrap();
        assert_eq!(loaded.log_file, "mysql-bin.000003");
        assert_eq!(loaded.log_offset, 12345);
    }

    #[test]
    fn test_position_update() {
        let store = SqlitePositionStore::in_memory().unwrap();

        store
            .set_position(1001, &Position::new("mysql-bin.000001", 100))
            .unwrap();
        store
            .set_position(1001, &Position::new("mysql-bin.000002", 4))
            .unwrap();

        let loaded = store.get_position(1001).unwrap().unwrap();
        assert_eq!(loaded, Position::new("mysql-bin.000002", 4));
    }

    #[test]
    fn test_distinct_servers_are_independent() {
        let store = SqlitePositionStore::in_memory().unwrap();

        store
            .set_position(1001, &Position::new("mysql-bin.000001", 100))
            .unwrap();
        store
            .set_position(1002, &Position::new("mysql-bin.000009", 900))
            .unwrap();

        assert_eq!(
            store.get_position(1001).unwrap().unwrap(),
            Position::new("mysql-bin.000001", 100)
        );
        assert_eq!(
            store.get_position(1002).unwrap().unwrap(),
            Position::new("mysql-bin.000009", 900)
        );

        let all = store.all_positions().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_position_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.db");

        {
            let store = SqlitePositionStore::open(&path).unwrap();
            store
                .set_position(1001, &Position::new("mysql-bin.000007", 77))
                .unwrap();
        }

        let store = SqlitePositionStore::open(&path).unwrap();
        assert_eq!(
            store.get_position(1001).unwrap().unwrap(),
            Position::new("mysql-bin.000007", 77)
        );
    }

    #[test]
    fn test_large_offset_roundtrip() {
        let store = SqlitePositionStore::in_memory().unwrap();
        let pos = Position::new("mysql-bin.000001", u32::MAX as u64 + 17);

        store.set_position(7, &pos).unwrap();
        assert_eq!(store.get_position(7).unwrap().unwrap(), pos);
    }
}
