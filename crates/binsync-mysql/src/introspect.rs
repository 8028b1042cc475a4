use binsync_core::{Position, PrimaryKey, TableId};
use mysql_async::prelude::*;
use mysql_async::{Opts, Pool, Row};
use tracing::{debug, info};

use crate::error::{MySqlError, MySqlResult};

/// Live metadata queries against the source server.
///
/// Used once per stream start: primary-key shapes feed the filter policy,
/// column names label binlog row images (which carry none), and the head
/// position seeds a fresh start with no backlog. Metadata query failures
/// are fatal to stream start; there is no safe guess for any of these.
pub struct SchemaIntrospector {
    pool: Pool,
}

impl SchemaIntrospector {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_opts(opts: Opts) -> Self {
        Self {
            pool: Pool::new(opts),
        }
    }

    /// Primary-key shape of a table, from the metadata catalog.
    pub async fn primary_key(&self, table: &TableId) -> MySqlResult<PrimaryKey> {
        let mut conn = self.pool.get_conn().await?;

        let columns: Vec<String> = conn
            .exec(
                "SELECT COLUMN_NAME
                 FROM information_schema.COLUMNS
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_KEY = 'PRI'
                 ORDER BY ORDINAL_POSITION",
                (&table.schema, &table.table),
            )
            .await?;

        let shape = classify_key(columns);
        debug!(table = %table, key = ?shape, "resolved primary key shape");
        Ok(shape)
    }

    /// Ordinal-ordered column names for a table.
    pub async fn column_names(&self, table: &TableId) -> MySqlResult<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;

        let columns: Vec<String> = conn
            .exec(
                "SELECT COLUMN_NAME
                 FROM information_schema.COLUMNS
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                 ORDER BY ORDINAL_POSITION",
                (&table.schema, &table.table),
            )
            .await?;

        if columns.is_empty() {
            return Err(MySqlError::Metadata(format!(
                "table {} not found in information_schema",
                table
            )));
        }
        Ok(columns)
    }

    /// The source's current head position.
    ///
    /// Tries `SHOW BINARY LOG STATUS` first (MySQL 8.2+), then falls back
    /// to `SHOW MASTER STATUS` for older servers.
    pub async fn head_position(&self) -> MySqlResult<Position> {
        let mut conn = self.pool.get_conn().await?;

        let row: Option<Row> = match conn.query_first("SHOW BINARY LOG STATUS").await {
            Ok(row) => row,
            Err(_) => conn.query_first("SHOW MASTER STATUS").await?,
        };

        let Some(row) = row else {
            return Err(MySqlError::BinlogDisabled);
        };

        let log_file: String = row.get(0).unwrap_or_default();
        let log_offset: u64 = row.get(1).unwrap_or(4);

        if log_file.is_empty() {
            return Err(MySqlError::BinlogDisabled);
        }

        let position = Position::new(log_file, log_offset);
        info!(position = %position, "source head position");
        Ok(position)
    }

    /// Disconnect the underlying pool.
    pub async fn disconnect(self) -> MySqlResult<()> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

fn classify_key(mut columns: Vec<String>) -> PrimaryKey {
    match columns.len() {
        0 => PrimaryKey::Absent,
        1 => PrimaryKey::Single(columns.remove(0)),
        _ => PrimaryKey::Composite(columns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_key() {
        assert_eq!(classify_key(vec![]), PrimaryKey::Absent);
        assert_eq!(
            classify_key(vec!["id".into()]),
            PrimaryKey::Single("id".into())
        );
        assert_eq!(
            classify_key(vec!["order_id".into(), "sku".into()]),
            PrimaryKey::Composite(vec!["order_id".into(), "sku".into()])
        );
    }
}
