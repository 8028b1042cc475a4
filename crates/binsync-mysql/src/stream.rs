use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use base64::Engine;
use binsync_core::{
    Error as CoreError, EventSource, Position, RawEvent, Result as CoreResult, RowMap, RowPair,
    SourcedEvent, TableId, Value,
};
use futures_util::StreamExt;
use mysql_async::binlog::events::{EventData, RowsEventData, RowsEventRows};
use mysql_async::binlog::row::BinlogRow;
use mysql_async::binlog::value::BinlogValue;
use mysql_async::{BinlogStream, BinlogStreamRequest, Conn, Opts};
use tracing::{debug, info, trace, warn};

use crate::error::MySqlResult;

/// Schemas and tables the stream is restricted to: schema name to the set
/// of watched table names within it.
pub type WatchedTables = HashMap<String, HashSet<String>>;

/// Connection settings for the replication stream.
pub struct BinlogSourceConfig {
    pub opts: Opts,
    /// Replica identity announced to the source; must be unique among the
    /// server's replicas.
    pub server_id: u32,
    /// Position to resume reading from.
    pub resume: Position,
}

/// A single long-lived cursor over the source's binlog.
///
/// Yields raw events strictly in source order, one at a time; the network
/// read blocks until the consumer asks for the next event, so downstream
/// backpressure throttles consumption naturally.
pub struct BinlogSource {
    stream: BinlogStream,
    /// Current binlog file, updated on rotate events.
    log_file: String,
    watched: WatchedTables,
    /// Ordinal-ordered column names per table, resolved at stream start.
    columns: HashMap<TableId, Vec<String>>,
}

impl BinlogSource {
    /// Open a replication connection and start the binlog dump at the
    /// resume position.
    ///
    /// A resume point the server no longer retains fails the dump request
    /// here; the stream never silently skips ahead of a stale position.
    pub async fn connect(
        config: BinlogSourceConfig,
        watched: WatchedTables,
        columns: HashMap<TableId, Vec<String>>,
    ) -> MySqlResult<Self> {
        info!(
            server_id = config.server_id,
            position = %config.resume,
            "opening binlog stream"
        );

        let conn = Conn::new(config.opts).await?;
        let request = BinlogStreamRequest::new(config.server_id)
            .with_filename(config.resume.log_file.as_bytes())
            .with_pos(config.resume.log_offset);
        let stream = conn.get_binlog_stream(request).await?;

        Ok(Self {
            stream,
            log_file: config.resume.log_file,
            watched,
            columns,
        })
    }

    fn watches_table(&self, schema: &str, table: &str) -> bool {
        self.watched
            .get(schema)
            .map(|tables| tables.contains(table))
            .unwrap_or(false)
    }

    fn sourced(&self, event: RawEvent, end_offset: u64) -> SourcedEvent {
        SourcedEvent {
            event,
            position: Position::new(self.log_file.clone(), end_offset),
        }
    }

    fn decode_rows(&self, data: &RowsEventData<'_>) -> CoreResult<Option<RawEvent>> {
        let table_id = data.table_id();
        let Some(tme) = self.stream.get_tme(table_id) else {
            warn!(table_id, "no table map for rows event, skipping");
            return Ok(None);
        };

        let schema = tme.database_name().to_string();
        let table = tme.table_name().to_string();
        if !self.watches_table(&schema, &table) {
            return Ok(None);
        }

        let id = TableId::new(schema, table);
        let names = self.columns.get(&id);

        let raw = match data {
            RowsEventData::WriteRowsEvent(_) => RawEvent::Insert {
                rows: after_images(data.rows(tme), names)?,
                table: id,
            },
            RowsEventData::DeleteRowsEvent(_) => RawEvent::Delete {
                rows: before_images(data.rows(tme), names)?,
                table: id,
            },
            RowsEventData::UpdateRowsEvent(_) => RawEvent::Update {
                rows: row_pairs(data.rows(tme), names)?,
                table: id,
            },
            _ => {
                trace!(table = %id, "ignoring unsupported rows event variant");
                return Ok(None);
            }
        };

        Ok(Some(raw))
    }
}

#[async_trait]
impl EventSource for BinlogSource {
    async fn next_event(&mut self) -> CoreResult<Option<SourcedEvent>> {
        loop {
            let Some(item) = self.stream.next().await else {
                return Ok(None);
            };
            let event = item.map_err(|e| CoreError::Stream(e.to_string()))?;
            let end_offset = u64::from(event.header().log_pos());

            let data = match event.read_data() {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to decode binlog event, skipping");
                    continue;
                }
            };

            match data {
                EventData::RotateEvent(rotate) => {
                    let next = rotate.name().to_string();
                    debug!(file = %next, "binlog rotated");
                    self.log_file = next;
                }

                EventData::QueryEvent(query) => {
                    let schema = query.schema().to_string();
                    if !self.watched.contains_key(&schema) {
                        continue;
                    }
                    let raw = RawEvent::Statement {
                        schema,
                        query: query.query().to_string(),
                    };
                    return Ok(Some(self.sourced(raw, end_offset)));
                }

                EventData::RowsEvent(rows) => {
                    if let Some(raw) = self.decode_rows(&rows)? {
                        return Ok(Some(self.sourced(raw, end_offset)));
                    }
                }

                _ => trace!("ignoring binlog event"),
            }
        }
    }
}

fn after_images(
    rows: RowsEventRows<'_>,
    names: Option<&Vec<String>>,
) -> CoreResult<Vec<RowMap>> {
    let mut out = Vec::new();
    for row in rows {
        let (_, after) = row.map_err(|e| CoreError::Stream(format!("row image decode: {e}")))?;
        if let Some(after) = after {
            out.push(row_map(&after, names));
        }
    }
    Ok(out)
}

fn before_images(
    rows: RowsEventRows<'_>,
    names: Option<&Vec<String>>,
) -> CoreResult<Vec<RowMap>> {
    let mut out = Vec::new();
    for row in rows {
        let (before, _) = row.map_err(|e| CoreError::Stream(format!("row image decode: {e}")))?;
        if let Some(before) = before {
            out.push(row_map(&before, names));
        }
    }
    Ok(out)
}

fn row_pairs(
    rows: RowsEventRows<'_>,
    names: Option<&Vec<String>>,
) -> CoreResult<Vec<RowPair>> {
    let mut out = Vec::new();
    for row in rows {
        let (before, after) =
            row.map_err(|e| CoreError::Stream(format!("row image decode: {e}")))?;
        match (before, after) {
            (Some(before), Some(after)) => out.push(RowPair {
                before: row_map(&before, names),
                after: row_map(&after, names),
            }),
            _ => warn!("update row image missing a before or after half, skipping row"),
        }
    }
    Ok(out)
}

fn row_map(row: &BinlogRow, names: Option<&Vec<String>>) -> RowMap {
    let mut map = RowMap::new();
    for i in 0..row.len() {
        // Columns absent from the row image (minimal row metadata) are
        // simply not present in the map.
        let Some(value) = row.as_ref(i) else {
            continue;
        };
        let name = names
            .and_then(|n| n.get(i).cloned())
            .unwrap_or_else(|| format!("col{}", i));
        map.insert(name, binlog_value(value));
    }
    map
}

fn binlog_value(value: &BinlogValue<'_>) -> Value {
    match value {
        BinlogValue::Value(v) => column_value(v),
        BinlogValue::Jsonb(json) => match serde_json::Value::try_from(json.clone()) {
            Ok(v) => Value::from(v),
            Err(e) => {
                trace!(error = %e, "undecodable JSON column");
                Value::Null
            }
        },
        // Partial JSON updates carry no full image to forward.
        BinlogValue::JsonDiff(_) => Value::Null,
    }
}

fn column_value(value: &mysql_async::Value) -> Value {
    use mysql_async::Value as Sql;

    match value {
        Sql::NULL => Value::Null,
        Sql::Int(i) => Value::Int(*i),
        Sql::UInt(u) => Value::Uint(*u),
        Sql::Float(f) => Value::Float(f64::from(*f)),
        Sql::Double(d) => Value::Float(*d),
        Sql::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        },
        Sql::Date(year, month, day, hour, minute, second, micros) => Value::String(
            format_datetime(*year, *month, *day, *hour, *minute, *second, *micros),
        ),
        Sql::Time(negative, days, hours, minutes, seconds, micros) => Value::String(
            format_time(*negative, *days, *hours, *minutes, *seconds, *micros),
        ),
    }
}

fn format_datetime(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> String {
    if hour == 0 && minute == 0 && second == 0 && micros == 0 {
        format!("{:04}-{:02}-{:02}", year, month, day)
    } else if micros == 0 {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            year, month, day, hour, minute, second, micros
        )
    }
}

fn format_time(negative: bool, days: u32, hours: u8, minutes: u8, seconds: u8, micros: u32) -> String {
    let sign = if negative { "-" } else { "" };
    let total_hours = days * 24 + u32::from(hours);
    if micros == 0 {
        format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds)
    } else {
        format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            sign, total_hours, minutes, seconds, micros
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_value_scalars() {
        use mysql_async::Value as Sql;

        assert_eq!(column_value(&Sql::NULL), Value::Null);
        assert_eq!(column_value(&Sql::Int(-7)), Value::Int(-7));
        assert_eq!(column_value(&Sql::UInt(7)), Value::Uint(7));
        assert_eq!(column_value(&Sql::Double(2.5)), Value::Float(2.5));
        assert_eq!(
            column_value(&Sql::Bytes(b"1.00".to_vec())),
            Value::String("1.00".into())
        );
    }

    #[test]
    fn test_column_value_non_utf8_bytes_are_base64() {
        let value = column_value(&mysql_async::Value::Bytes(vec![0xff, 0xfe, 0x00]));
        assert_eq!(value, Value::String("//4A".into()));
    }

    #[test]
    fn test_format_datetime() {
        assert_eq!(format_datetime(2024, 1, 15, 0, 0, 0, 0), "2024-01-15");
        assert_eq!(
            format_datetime(2024, 1, 15, 9, 30, 5, 0),
            "2024-01-15 09:30:05"
        );
        assert_eq!(
            format_datetime(2024, 1, 15, 9, 30, 5, 120),
            "2024-01-15 09:30:05.000120"
        );
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(false, 0, 9, 30, 5, 0), "09:30:05");
        assert_eq!(format_time(true, 1, 2, 0, 0, 0), "-26:00:00");
        assert_eq!(format_time(false, 0, 0, 0, 1, 500), "00:00:01.000500");
    }
}
