mod error;
mod introspect;
mod stream;

pub use error::{MySqlError, MySqlResult};
pub use introspect::SchemaIntrospector;
pub use stream::{BinlogSource, BinlogSourceConfig, WatchedTables};
