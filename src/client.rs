use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TelemetryError;
use crate::models::{DateRangeQuery, Reading};

/// Transport seam for the aggregation pipeline. Production code talks to the
/// readings API over HTTP; tests substitute canned sources.
#[async_trait]
pub trait ReadingsSource: Send + Sync {
    async fn by_device(
        &self,
        device_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, TelemetryError>;

    async fn by_date_range(
        &self,
        query: &DateRangeQuery,
    ) -> Result<Vec<Reading>, TelemetryError>;

    async fn seven_days_by_location(
        &self,
        location_id: &str,
    ) -> Result<Vec<Reading>, TelemetryError>;
}

pub struct ReadingsClient {
    api_url: String,
    client: reqwest::Client,
    max_attempts: u32,
}

impl ReadingsClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_url: api_url.into(),
            client,
            max_attempts: 3,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn device_url(&self, device_id: &str) -> String {
        format!("{}/api/v1/readings/device/{}", self.api_url, device_id)
    }

    fn range_url(&self) -> String {
        format!("{}/api/v1/readings/range", self.api_url)
    }

    fn location_url(&self, location_id: &str) -> String {
        format!(
            "{}/api/v1/readings/location/{}/seven-days",
            self.api_url, location_id
        )
    }

    fn range_query(query: &DateRangeQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("deviceId", query.device_id.clone()),
            ("startDate", query.start_date.format("%Y-%m-%d").to_string()),
            ("endDate", query.end_date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(interval) = &query.interval {
            params.push(("interval", interval.clone()));
        }
        if let Some(count) = query.count {
            params.push(("count", count.to_string()));
        }
        params
    }

    async fn fetch_readings(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<Reading>, TelemetryError> {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(url, query).await {
                Ok(readings) => {
                    debug!("Fetched {} readings from {}", readings.len(), url);
                    return Ok(readings);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "Fetch attempt {}/{} failed, retrying in {:?}: {}",
                        attempt, self.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    // Exponential backoff
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<Reading>, TelemetryError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status));
        }
        response
            .json::<Vec<Reading>>()
            .await
            .map_err(TelemetryError::Decode)
    }
}

#[async_trait]
impl ReadingsSource for ReadingsClient {
    async fn by_device(
        &self,
        device_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, TelemetryError> {
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.fetch_readings(&self.device_url(device_id), &query)
            .await
    }

    async fn by_date_range(
        &self,
        query: &DateRangeQuery,
    ) -> Result<Vec<Reading>, TelemetryError> {
        if query.start_date > query.end_date {
            return Err(TelemetryError::InvalidRange {
                start: query.start_date,
                end: query.end_date,
            });
        }
        self.fetch_readings(&self.range_url(), &Self::range_query(query))
            .await
    }

    async fn seven_days_by_location(
        &self,
        location_id: &str,
    ) -> Result<Vec<Reading>, TelemetryError> {
        self.fetch_readings(&self.location_url(location_id), &[])
            .await
    }
}
