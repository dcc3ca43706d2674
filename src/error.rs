use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid query: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Action service error: {0}")]
    Service(String),

    #[error("LLM Gateway error: {0}")]
    LLM(String),
}

impl AppError {
    /// Validation and configuration failures end the call; everything else is downgraded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_validation_and_config_are_terminal() {
        assert!(AppError::Validation("empty".into()).is_terminal());
        assert!(AppError::Config("no key".into()).is_terminal());
        assert!(!AppError::Execution("boom".into()).is_terminal());
        assert!(!AppError::Timeout("slow".into()).is_terminal());
        assert!(!AppError::Planning("bad json".into()).is_terminal());
    }

    #[test]
    fn messages_carry_detail() {
        let err = AppError::Service("unreachable".into());
        assert_eq!(err.to_string(), "Action service error: unreachable");
    }
}
