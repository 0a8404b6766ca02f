use std::env;

use chrono::{Duration, FixedOffset, Offset, Utc};
use uuid::Uuid;

use crate::aggregate::TelemetryAggregator;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub api_url: String,
    pub device_id: String,
    pub poll_interval_secs: u64,
    pub staleness_secs: i64,
    pub recent_limit: usize,
    pub recent_floor: usize,
    pub window_days: u32,
    pub bucket_offset_minutes: i32,
    pub request_timeout_secs: u64,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("API_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            device_id: env::var("DEVICE_ID").unwrap_or_else(|_| Uuid::new_v4().to_string()),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            staleness_secs: env::var("STALENESS_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
            recent_limit: env::var("RECENT_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            recent_floor: env::var("RECENT_FLOOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            window_days: env::var("WINDOW_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7),
            bucket_offset_minutes: env::var("BUCKET_OFFSET_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Offsets outside the valid range fall back to UTC.
    pub fn bucket_offset(&self) -> FixedOffset {
        self.bucket_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn aggregator(&self) -> TelemetryAggregator {
        TelemetryAggregator::new()
            .with_staleness(Duration::seconds(self.staleness_secs))
            .with_recent_floor(self.recent_floor)
            .with_window_days(self.window_days)
            .with_bucket_offset(self.bucket_offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn config_with_offset(minutes: i32) -> MonitorConfig {
        MonitorConfig {
            api_url: "http://localhost:3000".to_string(),
            device_id: "dev-1".to_string(),
            poll_interval_secs: 30,
            staleness_secs: 600,
            recent_limit: 50,
            recent_floor: 10,
            window_days: 7,
            bucket_offset_minutes: minutes,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_bucket_offset_in_seconds() {
        let config = config_with_offset(120);
        assert_eq!(config.bucket_offset().local_minus_utc(), 120 * 60);
    }

    #[test]
    fn test_bucket_offset_falls_back_to_utc() {
        let config = config_with_offset(100_000);
        assert_eq!(config.bucket_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_bucket_offset_overflowing_minutes_fall_back_to_utc() {
        // Minutes large enough that converting to seconds overflows i32.
        let config = config_with_offset(71_582_789);
        assert_eq!(config.bucket_offset().local_minus_utc(), 0);

        let config = config_with_offset(i32::MIN);
        assert_eq!(config.bucket_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_aggregator_uses_configured_staleness() {
        let mut config = config_with_offset(0);
        config.staleness_secs = 60;
        let aggregator = config.aggregator();

        let ts = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let reading = crate::models::Reading::new("dev-1", ts);

        let within: DateTime<Utc> = ts + Duration::seconds(60);
        let beyond: DateTime<Utc> = ts + Duration::seconds(61);
        assert!(aggregator.online_status(&[reading.clone()], within));
        assert!(!aggregator.online_status(&[reading], beyond));
    }
}
