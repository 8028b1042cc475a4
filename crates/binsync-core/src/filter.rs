use std::collections::HashSet;
use std::str::FromStr;

use tracing::debug;

use crate::error::Error;
use crate::types::TableId;

/// Primary-key shape of a table, resolved once at stream start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Absent,
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Whether the key uniquely addresses a row for delete/update replay.
    ///
    /// Only a single-column key qualifies: with no key or a composite key,
    /// downstream application cannot assert a unique row identity.
    pub fn is_row_addressable(&self) -> bool {
        matches!(self, PrimaryKey::Single(_))
    }
}

/// Operation kinds that may be skipped by policy.
///
/// Inserts are deliberately not representable here: insert replication
/// needs no row identity and is always forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipOp {
    Delete,
    Update,
}

impl FromStr for SkipOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(SkipOp::Delete),
            "update" => Ok(SkipOp::Update),
            other => Err(Error::UnknownSkipOp(other.to_string())),
        }
    }
}

/// Decides, per table and operation kind, whether a mutation is forwarded.
///
/// Built once before streaming from explicit configuration plus the
/// auto-derived skips for tables without a usable primary key, then never
/// mutated, so lookups are pure and free of concurrency hazards.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    skip_ops: HashSet<SkipOp>,
    skip_delete_tables: HashSet<String>,
    skip_update_tables: HashSet<String>,
}

impl FilterPolicy {
    pub fn new(
        skip_ops: impl IntoIterator<Item = SkipOp>,
        skip_delete_tables: impl IntoIterator<Item = String>,
        skip_update_tables: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            skip_ops: skip_ops.into_iter().collect(),
            skip_delete_tables: skip_delete_tables.into_iter().collect(),
            skip_update_tables: skip_update_tables.into_iter().collect(),
        }
    }

    /// Merge in auto-derived skips for tables whose key shape cannot
    /// address rows uniquely. Such tables stop forwarding deletes and
    /// updates regardless of explicit configuration; inserts are unaffected.
    pub fn with_auto_skips(
        mut self,
        shapes: impl IntoIterator<Item = (TableId, PrimaryKey)>,
    ) -> Self {
        for (table, key) in shapes {
            if !key.is_row_addressable() {
                let name = table.qualified();
                debug!(
                    table = %name,
                    key = ?key,
                    "no unique row key, auto-skipping deletes and updates"
                );
                self.skip_delete_tables.insert(name.clone());
                self.skip_update_tables.insert(name);
            }
        }
        self
    }

    /// Whether a delete/update on the given table should be forwarded.
    pub fn should_forward(&self, table: &TableId, op: SkipOp) -> bool {
        if self.skip_ops.contains(&op) {
            return false;
        }
        let name = table.qualified();
        match op {
            SkipOp::Delete => !self.skip_delete_tables.contains(&name),
            SkipOp::Update => !self.skip_update_tables.contains(&name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableId {
        TableId::new("shop", name)
    }

    #[test]
    fn test_skip_op_parse() {
        assert_eq!("delete".parse::<SkipOp>().unwrap(), SkipOp::Delete);
        assert_eq!("Update".parse::<SkipOp>().unwrap(), SkipOp::Update);
        assert!("insert".parse::<SkipOp>().is_err());
        assert!("truncate".parse::<SkipOp>().is_err());
    }

    #[test]
    fn test_default_policy_forwards_everything() {
        let policy = FilterPolicy::default();
        assert!(policy.should_forward(&table("orders"), SkipOp::Delete));
        assert!(policy.should_forward(&table("orders"), SkipOp::Update));
    }

    #[test]
    fn test_skip_op_kind_applies_to_all_tables() {
        let policy = FilterPolicy::new([SkipOp::Delete], [], []);
        assert!(!policy.should_forward(&table("orders"), SkipOp::Delete));
        assert!(!policy.should_forward(&table("customers"), SkipOp::Delete));
        assert!(policy.should_forward(&table("orders"), SkipOp::Update));
    }

    #[test]
    fn test_skip_tables_per_kind() {
        let policy = FilterPolicy::new(
            [],
            ["shop.orders".to_string()],
            ["shop.customers".to_string()],
        );
        assert!(!policy.should_forward(&table("orders"), SkipOp::Delete));
        assert!(policy.should_forward(&table("orders"), SkipOp::Update));
        assert!(!policy.should_forward(&table("customers"), SkipOp::Update));
        assert!(policy.should_forward(&table("customers"), SkipOp::Delete));
    }

    #[test]
    fn test_auto_skip_absent_and_composite_keys() {
        let policy = FilterPolicy::default().with_auto_skips([
            (table("logs"), PrimaryKey::Absent),
            (
                table("line_items"),
                PrimaryKey::Composite(vec!["order_id".into(), "sku".into()]),
            ),
            (table("orders"), PrimaryKey::Single("id".into())),
        ]);

        for name in ["logs", "line_items"] {
            assert!(!policy.should_forward(&table(name), SkipOp::Delete));
            assert!(!policy.should_forward(&table(name), SkipOp::Update));
        }
        assert!(policy.should_forward(&table("orders"), SkipOp::Delete));
        assert!(policy.should_forward(&table("orders"), SkipOp::Update));
    }

    #[test]
    fn test_auto_skip_merges_with_explicit_config() {
        let policy = FilterPolicy::new([], ["shop.audit".to_string()], [])
            .with_auto_skips([(table("logs"), PrimaryKey::Absent)]);

        assert!(!policy.should_forward(&table("audit"), SkipOp::Delete));
        assert!(!policy.should_forward(&table("logs"), SkipOp::Delete));
        assert!(!policy.should_forward(&table("logs"), SkipOp::Update));
    }
}
