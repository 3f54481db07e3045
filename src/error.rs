use crate::{ConfigError, ParserError};
use std::fmt::{Display, Formatter};

impl ConfigError {
    pub fn new(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            message: message.into(),
        }
    }
    pub fn what(&self) -> &str {
        &self.what
    }
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigError: {}: {}", self.what, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ParserError {
    pub(crate) fn callback(name: impl Into<String>, message: impl Into<String>) -> Self {
        ParserError::Callback {
            name: name.into(),
            message: message.into(),
        }
    }
    pub(crate) fn limit(what: &'static str, limit: usize) -> Self {
        ParserError::Limit { what, limit }
    }

    /// Whether this error is the node-hit/tree-depth circuit breaker.
    pub fn is_limit(&self) -> bool {
        matches!(self, ParserError::Limit { .. })
    }
    pub fn is_config(&self) -> bool {
        matches!(self, ParserError::Config(_))
    }
}

impl From<ConfigError> for ParserError {
    fn from(err: ConfigError) -> Self {
        ParserError::Config(err)
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserError::Config(err) => write!(f, "{}", err),
            ParserError::Callback { name, message } => {
                write!(f, "CallbackError: {}: {}", name, message)
            }
            ParserError::Limit { what, limit } => {
                write!(f, "LimitError: maximum {} exceeded: {}", what, limit)
            }
        }
    }
}

impl std::fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigError {{ {}: {} }}", self.what, self.message)
    }
}

impl std::error::Error for ParserError {}
