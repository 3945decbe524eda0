use thiserror::Error;

/// Failure reported by a queue handler. Only the display string reaches the
/// caller.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum HandlerError {
    /// The handler has no implementation yet.
    #[error("method {0} not implemented")]
    Unimplemented(&'static str),

    /// The handler failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Handler failure with `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
