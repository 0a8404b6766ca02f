use chrono::NaiveDate;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error status: {0}")]
    Status(StatusCode),

    #[error("Failed to decode readings payload: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

impl TelemetryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Http(e) => e.is_timeout() || e.is_connect(),
            TelemetryError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            TelemetryError::Decode(_) => false,
            TelemetryError::InvalidRange { .. } => false,
        }
    }
}
