use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced to callers of the engine. Degenerate arithmetic and
/// indicator warm-up never produce one of these; they downgrade to Hold
/// signals, skipped entries or zeroed statistics instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid series{}: {reason}", index.map(|i| format!(" at bar {i}")).unwrap_or_default())]
    InvalidSeries {
        index: Option<usize>,
        reason: String,
    },

    #[error("Invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl EngineError {
    pub fn invalid_series<S: Into<String>>(reason: S) -> Self {
        EngineError::InvalidSeries {
            index: None,
            reason: reason.into(),
        }
    }

    pub fn invalid_bar<S: Into<String>>(index: usize, reason: S) -> Self {
        EngineError::InvalidSeries {
            index: Some(index),
            reason: reason.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(field: &'static str, reason: S) -> Self {
        EngineError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidSeries { .. } => "invalid_series",
            EngineError::InvalidConfig { .. } => "invalid_config",
        }
    }
}
