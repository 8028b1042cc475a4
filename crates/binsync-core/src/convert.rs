use thiserror::Error;

/// Failure to translate a statement into the destination dialect.
#[derive(Debug, Error)]
#[error("cannot convert statement for `{schema}`: {reason}")]
pub struct ConvertError {
    pub schema: String,
    pub reason: String,
}

impl ConvertError {
    pub fn new(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            reason: reason.into(),
        }
    }
}

/// Translates a schema-change statement into the destination dialect.
///
/// Pure collaborator: the transformer catches and logs failures without
/// aborting the stream, so implementations should fail rather than guess on
/// syntax they do not support.
pub trait DialectConverter: Send + Sync {
    fn convert(&self, schema: &str, statement: &str) -> Result<String, ConvertError>;
}

/// Forwards statements unchanged, for destinations that accept the source
/// dialect as-is.
pub struct PassthroughConverter;

impl DialectConverter for PassthroughConverter {
    fn convert(&self, _schema: &str, statement: &str) -> Result<String, ConvertError> {
        Ok(statement.to_string())
    }
}
