use thiserror::Error;

#[derive(Debug, Error)]
pub enum MySqlError {
    #[error("mysql error: {0}")]
    Driver(#[from] mysql_async::Error),

    #[error("metadata query failed: {0}")]
    Metadata(String),

    #[error("source returned no binlog status, binary logging may be disabled")]
    BinlogDisabled,
}

pub type MySqlResult<T> = Result<T, MySqlError>;
