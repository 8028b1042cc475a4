use std::collections::{HashMap, HashSet};

use binsync_core::{Position, SkipOp, TableId};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// One replication source: a MySQL server plus the schemas/tables to watch
/// and the filtering applied to their mutations.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Replica identity announced to the source; unique per replica.
    pub server_id: u32,
    /// Optional operator-supplied start position, used only when no
    /// checkpoint has been persisted yet. Both fields or neither.
    #[serde(default)]
    pub init_log_file: Option<String>,
    #[serde(default)]
    pub init_log_offset: Option<u64>,
    /// Operation kinds skipped for every table (`delete`, `update`).
    #[serde(default)]
    pub skip_ops: Vec<String>,
    /// Tables (as `schema.table`) whose deletes are skipped.
    #[serde(default)]
    pub skip_delete_tables: Vec<String>,
    /// Tables (as `schema.table`) whose updates are skipped.
    #[serde(default)]
    pub skip_update_tables: Vec<String>,
    /// Seconds between throughput reports.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    pub databases: Vec<DatabaseConfig>,
}

/// A watched database and the tables replicated from it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub database: String,
    pub tables: Vec<String>,
}

fn default_port() -> u16 {
    3306
}

fn default_report_interval() -> u64 {
    10
}

impl SourceConfig {
    /// Parse a single source from TOML text.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Watched tables as schema -> table-name set.
    pub fn watched_tables(&self) -> HashMap<String, HashSet<String>> {
        self.databases
            .iter()
            .map(|db| {
                (
                    db.database.clone(),
                    db.tables.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect()
    }

    /// Every watched table as a table identity.
    pub fn table_ids(&self) -> Vec<TableId> {
        self.databases
            .iter()
            .flat_map(|db| {
                db.tables
                    .iter()
                    .map(|table| TableId::new(db.database.clone(), table.clone()))
            })
            .collect()
    }

    /// Operator-supplied start position, if fully specified.
    pub fn initial_position(&self) -> Option<Position> {
        match (&self.init_log_file, self.init_log_offset) {
            (Some(file), Some(offset)) => Some(Position::new(file.clone(), offset)),
            _ => None,
        }
    }

    /// Parsed skip-operation kinds.
    pub fn skip_op_kinds(&self) -> ConfigResult<HashSet<SkipOp>> {
        self.skip_ops
            .iter()
            .map(|s| {
                s.parse::<SkipOp>()
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
name = "primary"
host = "127.0.0.1"
user = "repl"
password = "secret"
server_id = 1001
skip_ops = ["delete"]
skip_update_tables = ["shop.audit"]

[[databases]]
database = "shop"
tables = ["orders", "customers"]

[[databases]]
database = "crm"
tables = ["contacts"]
"#;

    #[test]
    fn test_parse_source() {
        let config = SourceConfig::parse(EXAMPLE).unwrap();
        assert_eq!(config.name, "primary");
        assert_eq!(config.port, 3306);
        assert_eq!(config.server_id, 1001);
        assert_eq!(config.report_interval_secs, 10);
        assert_eq!(config.databases.len(), 2);
    }

    #[test]
    fn test_watched_tables() {
        let config = SourceConfig::parse(EXAMPLE).unwrap();
        let watched = config.watched_tables();
        assert!(watched["shop"].contains("orders"));
        assert!(watched["crm"].contains("contacts"));
        assert!(!watched.contains_key("other"));
    }

    #[test]
    fn test_table_ids() {
        let config = SourceConfig::parse(EXAMPLE).unwrap();
        let ids = config.table_ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&TableId::new("shop", "orders")));
        assert!(ids.contains(&TableId::new("crm", "contacts")));
    }

    #[test]
    fn test_initial_position_requires_both_fields() {
        let mut config = SourceConfig::parse(EXAMPLE).unwrap();
        assert!(config.initial_position().is_none());

        config.init_log_file = Some("mysql-bin.000002".into());
        assert!(config.initial_position().is_none());

        config.init_log_offset = Some(4);
        assert_eq!(
            config.initial_position(),
            Some(Position::new("mysql-bin.000002", 4))
        );
    }

    #[test]
    fn test_skip_op_kinds() {
        let config = SourceConfig::parse(EXAMPLE).unwrap();
        let kinds = config.skip_op_kinds().unwrap();
        assert!(kinds.contains(&SkipOp::Delete));
        assert!(!kinds.contains(&SkipOp::Update));
    }

    #[test]
    fn test_unknown_skip_op_rejected() {
        let mut config = SourceConfig::parse(EXAMPLE).unwrap();
        config.skip_ops.push("insert".into());
        assert!(config.skip_op_kinds().is_err());
    }
}
