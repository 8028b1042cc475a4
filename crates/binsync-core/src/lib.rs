pub mod convert;
pub mod error;
pub mod event;
pub mod filter;
pub mod transform;
pub mod types;

pub use convert::{ConvertError, DialectConverter, PassthroughConverter};
pub use error::{Error, Result};
pub use event::{now_micros, Action, ChangeEvent, EventSource, RawEvent, RowPair, SourcedEvent};
pub use filter::{FilterPolicy, PrimaryKey, SkipOp};
pub use transform::EventTransformer;
pub use types::{Position, RowMap, TableId, Value};
