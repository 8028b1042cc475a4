use tracing::{debug, error, warn};

use crate::convert::DialectConverter;
use crate::event::{Action, ChangeEvent, RawEvent};
use crate::filter::{FilterPolicy, SkipOp};

/// Maps raw replication events into canonical change events.
///
/// One raw event yields zero, one, or two change events per affected row,
/// in emission order. Updates decompose into a delete of the before-image
/// followed by an insert of the after-image, so downstream application can
/// replace the old row without an upsert primitive.
pub struct EventTransformer<C> {
    policy: FilterPolicy,
    converter: C,
}

impl<C: DialectConverter> EventTransformer<C> {
    pub fn new(policy: FilterPolicy, converter: C) -> Self {
        Self { policy, converter }
    }

    pub fn transform(&self, raw: &RawEvent) -> Vec<ChangeEvent> {
        match raw {
            RawEvent::Insert { table, rows } => rows
                .iter()
                .map(|row| ChangeEvent::row(Action::Insert, table, row.clone()))
                .collect(),

            RawEvent::Update { table, rows } => {
                if !self.policy.should_forward(table, SkipOp::Update) {
                    debug!(table = %table, rows = rows.len(), "update filtered by policy");
                    return vec![];
                }
                rows.iter()
                    .flat_map(|pair| {
                        [
                            ChangeEvent::row(Action::Delete, table, pair.before.clone()),
                            ChangeEvent::row(Action::Insert, table, pair.after.clone()),
                        ]
                    })
                    .collect()
            }

            RawEvent::Delete { table, rows } => {
                if !self.policy.should_forward(table, SkipOp::Delete) {
                    debug!(table = %table, rows = rows.len(), "delete filtered by policy");
                    return vec![];
                }
                rows.iter()
                    .map(|row| ChangeEvent::row(Action::Delete, table, row.clone()))
                    .collect()
            }

            RawEvent::Statement { schema, query } => {
                if !query.to_lowercase().contains("alter") {
                    debug!(schema = %schema, "discarding non-alter statement");
                    return vec![];
                }
                match self.converter.convert(schema, query) {
                    Ok(converted) if converted.trim().is_empty() => {
                        warn!(
                            schema = %schema,
                            query = %query,
                            "dialect conversion produced empty output, dropping statement"
                        );
                        vec![]
                    }
                    Ok(converted) => vec![ChangeEvent::statement(schema.clone(), converted)],
                    Err(e) => {
                        error!(
                            schema = %schema,
                            query = %query,
                            error = %e,
                            "dialect conversion failed, dropping statement"
                        );
                        vec![]
                    }
                }
            }
        }
    }
}
