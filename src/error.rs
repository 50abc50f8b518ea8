use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpsweepError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by {service} (gave up after {retries} retry)")]
    RateLimited { service: &'static str, retries: u32 },

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpsweepError {
    /// Whether this error must abort the whole run rather than being
    /// recorded against a single item and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_) | Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, OpsweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_is_fatal() {
        assert!(OpsweepError::Auth("bad token".into()).is_fatal());
        assert!(OpsweepError::Validation("empty target list".into()).is_fatal());
    }

    #[test]
    fn test_per_item_errors_are_not_fatal() {
        assert!(!OpsweepError::NotFound("env-1".into()).is_fatal());
        assert!(!OpsweepError::RateLimited {
            service: "tracker",
            retries: 1
        }
        .is_fatal());
        assert!(!OpsweepError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_fatal());
    }
}
