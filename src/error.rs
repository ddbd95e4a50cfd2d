use thiserror::Error;

/// Main error type for the strategy core and its drivers
#[derive(Error, Debug)]
pub enum QTradeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Market data errors
    #[error("Indicator unavailable: {0}")]
    IndicatorUnavailable(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Collaborator errors (exchange, persistence, notification)
    #[error("Collaborator failure: {component} - {reason}")]
    CollaboratorFailure { component: String, reason: String },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl QTradeError {
    /// Shorthand for a failed exchange/persistence/notification call
    pub fn collaborator(component: &str, reason: impl Into<String>) -> Self {
        QTradeError::CollaboratorFailure {
            component: component.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for QTradeError
pub type Result<T> = std::result::Result<T, QTradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_error_names_component() {
        let err = QTradeError::collaborator("model_store", "disk full");
        assert_eq!(
            err.to_string(),
            "Collaborator failure: model_store - disk full"
        );
    }

    #[test]
    fn anyhow_errors_convert() {
        let err: QTradeError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, QTradeError::Other(_)));
    }
}
