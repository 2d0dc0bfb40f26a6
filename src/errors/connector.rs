//! Connector error types
//!
//! Every connector failure is surfaced as a structured variant; the Display
//! output is what ends up in execution logs and API responses, so no variant
//! ever carries credentials or a raw driver payload.

use thiserror::Error;

/// Errors raised by source connectors
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// No factory registered for the requested type tag
    #[error("Unknown connector type: {0}")]
    UnknownType(String),

    /// Connector configuration is missing required fields (caught pre-I/O)
    #[error("Invalid connector configuration: {0}")]
    InvalidConfig(String),

    /// Source could not be reached
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed {
        /// Hostname or API endpoint, credentials stripped
        endpoint: String,
        /// Reason for failure
        reason: String,
    },

    /// Source rejected the supplied credentials
    #[error("Authentication failed for {0}")]
    AuthFailed(String),

    /// Network or query timeout
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Query was rejected or failed at the source
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// SQL text could not be parsed into a projection plan
    #[error("Malformed SQL: {0}")]
    MalformedSql(String),

    /// SQL uses a construct the embedded evaluator does not support
    #[error("Unsupported SQL construct: {0}")]
    UnsupportedSql(String),

    /// Source returned a payload the connector could not interpret
    #[error("Unexpected response from source: {0}")]
    UnexpectedResponse(String),
}

impl ConnectorError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::Timeout(_)
                | ConnectorError::UnexpectedResponse(_)
        )
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| format!("{}://{}", u.scheme(), u.host_str().unwrap_or("unknown")))
            .unwrap_or_else(|| "remote endpoint".to_string());

        if err.is_timeout() {
            ConnectorError::Timeout(0)
        } else if err.is_connect() {
            ConnectorError::ConnectionFailed {
                endpoint,
                reason: "connection refused or unreachable".to_string(),
            }
        } else if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
            || err.status() == Some(reqwest::StatusCode::FORBIDDEN)
        {
            ConnectorError::AuthFailed(endpoint)
        } else {
            ConnectorError::UnexpectedResponse(format!("{} request failed", endpoint))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ConnectorError::Timeout(5000).is_transient());
        assert!(ConnectorError::ConnectionFailed {
            endpoint: "db.example.com".to_string(),
            reason: "refused".to_string(),
        }
        .is_transient());
        assert!(!ConnectorError::InvalidConfig("missing host".to_string()).is_transient());
        assert!(!ConnectorError::MalformedSql("SELEC".to_string()).is_transient());
    }

    #[test]
    fn test_display_omits_credentials() {
        let err = ConnectorError::AuthFailed("https://api.example.com".to_string());
        let text = err.to_string();
        assert!(!text.contains("password"));
        assert!(!text.contains("token"));
    }
}
