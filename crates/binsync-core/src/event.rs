use async_trait::async_trait;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::types::{Position, RowMap, TableId, Value};

/// The kind of mutation a change event applies downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Insert,
    Delete,
    Query,
}

impl Action {
    /// Intra-position ordering for events derived from the same raw event.
    ///
    /// A consumer merging streams can rely on a delete (1) sorting before
    /// the insert (2) it is paired with for the same logical update; DDL
    /// statements (0) sort before both.
    pub fn sequence(self) -> u8 {
        match self {
            Action::Query => 0,
            Action::Delete => 1,
            Action::Insert => 2,
        }
    }
}

/// One normalized change, independent of the source wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub schema: String,
    /// Table name; `None` for statement (DDL) events.
    pub table: Option<String>,
    pub action: Action,
    pub values: RowMap,
    /// Wall-clock microseconds at transform time, not source commit time.
    pub event_time: i64,
    pub seq: u8,
}

impl ChangeEvent {
    /// A row-level event for the given table.
    pub fn row(action: Action, table: &TableId, values: RowMap) -> Self {
        Self {
            schema: table.schema.clone(),
            table: Some(table.table.clone()),
            action,
            values,
            event_time: now_micros(),
            seq: action.sequence(),
        }
    }

    /// A DDL event carrying a converted statement.
    pub fn statement(schema: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: None,
            action: Action::Query,
            values: [("query".to_string(), Value::String(query.into()))]
                .into_iter()
                .collect(),
            event_time: now_micros(),
            seq: Action::Query.sequence(),
        }
    }
}

/// Current wall clock as microseconds since the epoch.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

/// Before/after images of one updated row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPair {
    pub before: RowMap,
    pub after: RowMap,
}

/// A raw decoded replication event, before policy and transformation.
///
/// Closed union: the transformer is an exhaustive match over these cases.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Insert { table: TableId, rows: Vec<RowMap> },
    Update { table: TableId, rows: Vec<RowPair> },
    Delete { table: TableId, rows: Vec<RowMap> },
    Statement { schema: String, query: String },
}

impl RawEvent {
    pub fn schema(&self) -> &str {
        match self {
            RawEvent::Insert { table, .. }
            | RawEvent::Update { table, .. }
            | RawEvent::Delete { table, .. } => &table.schema,
            RawEvent::Statement { schema, .. } => schema,
        }
    }

    /// The affected table name, if this is a row-level event.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            RawEvent::Insert { table, .. }
            | RawEvent::Update { table, .. }
            | RawEvent::Delete { table, .. } => Some(&table.table),
            RawEvent::Statement { .. } => None,
        }
    }
}

/// A raw event together with the position immediately after it.
///
/// Checkpointing that position after the event's derived changes have been
/// handed off makes restart resume exactly at the next unprocessed event.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedEvent {
    pub event: RawEvent,
    pub position: Position,
}

/// A strictly ordered stream of raw replication events.
///
/// `next_event` blocks until an event is available; backpressure on the
/// consumer side therefore throttles the underlying read. Returning
/// `Ok(None)` means the stream has ended.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Result<Option<SourcedEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_sequence() {
        assert_eq!(Action::Query.sequence(), 0);
        assert_eq!(Action::Delete.sequence(), 1);
        assert_eq!(Action::Insert.sequence(), 2);
    }

    #[test]
    fn test_row_event_shape() {
        let table = TableId::new("shop", "orders");
        let values: RowMap = [("id".to_string(), Value::Int(5))].into_iter().collect();

        let event = ChangeEvent::row(Action::Delete, &table, values);
        assert_eq!(event.schema, "shop");
        assert_eq!(event.table.as_deref(), Some("orders"));
        assert_eq!(event.seq, 1);
        assert!(event.event_time > 0);
    }

    #[test]
    fn test_statement_event_shape() {
        let event = ChangeEvent::statement("shop", "ALTER TABLE orders ADD COLUMN note TEXT");
        assert_eq!(event.table, None);
        assert_eq!(event.seq, 0);
        assert_eq!(
            event.values.get("query").and_then(Value::as_str),
            Some("ALTER TABLE orders ADD COLUMN note TEXT")
        );
    }

    #[test]
    fn test_event_serializes_to_flat_json() {
        let table = TableId::new("shop", "orders");
        let values: RowMap = [("id".to_string(), Value::Int(5))].into_iter().collect();
        let event = ChangeEvent::row(Action::Insert, &table, values);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["schema"], "shop");
        assert_eq!(json["table"], "orders");
        assert_eq!(json["action"], "insert");
        assert_eq!(json["seq"], 2);
        assert_eq!(json["values"]["id"], 5);
    }

    #[test]
    fn test_raw_event_accessors() {
        let insert = RawEvent::Insert {
            table: TableId::new("shop", "orders"),
            rows: vec![],
        };
        assert_eq!(insert.schema(), "shop");
        assert_eq!(insert.table_name(), Some("orders"));

        let ddl = RawEvent::Statement {
            schema: "shop".into(),
            query: "alter table orders add column note text".into(),
        };
        assert_eq!(ddl.schema(), "shop");
        assert_eq!(ddl.table_name(), None);
    }
}
