//! CLI error types.

use std::fmt;

use error_stack::Report;
use jwks_trust_common::error::TrustError;

#[derive(Debug)]
pub enum CliError {
    /// Configuration file error
    Config(String),
    /// Issuance or trust store failure
    Trust(String),
    /// Token was not accepted
    Rejected(String),
    /// IO error
    Io(std::io::Error),
    /// JSON serialization error
    Json(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Trust(msg) => write!(f, "Trust error: {}", msg),
            CliError::Rejected(msg) => write!(f, "Token rejected: {}", msg),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            CliError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err)
    }
}

impl From<Report<TrustError>> for CliError {
    fn from(report: Report<TrustError>) -> Self {
        match report.current_context() {
            TrustError::Configuration { .. } => CliError::Config(format!("{:?}", report)),
            _ => CliError::Trust(format!("{:?}", report)),
        }
    }
}
