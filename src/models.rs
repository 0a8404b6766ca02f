use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: String,
    pub device_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl Reading {
    pub fn new(device_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            timestamp,
            voltage: None,
            current: None,
            power: None,
            temperature: None,
            humidity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Averages {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct MetricsSummary {
    pub voltage: MetricStats,
    pub current: MetricStats,
    pub power: MetricStats,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub time: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_avg: Option<f64>,
}

impl ChartPoint {
    pub fn from_reading(reading: &Reading, offset: &FixedOffset) -> Self {
        Self {
            time: reading
                .timestamp
                .with_timezone(offset)
                .format("%H:%M:%S")
                .to_string(),
            timestamp: reading.timestamp,
            voltage: reading.voltage.unwrap_or(0.0),
            current: reading.current.unwrap_or(0.0),
            power: reading.power.unwrap_or(0.0),
            voltage_avg: None,
            current_avg: None,
            power_avg: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub label: String,
    pub count: usize,
    pub avg_voltage: f64,
    pub avg_current: f64,
    pub avg_power: f64,
    pub chart_points: Vec<ChartPoint>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFocus {
    #[default]
    All,
    Voltage,
    Current,
    Power,
    AvgVoltage,
    AvgCurrent,
}

impl MetricFocus {
    /// Clicking the already-focused metric returns to the combined view.
    pub fn toggle(self, clicked: MetricFocus) -> MetricFocus {
        if clicked == self {
            MetricFocus::All
        } else {
            clicked
        }
    }

    pub fn annotate(self, point: &mut ChartPoint, averages: Averages) {
        match self {
            MetricFocus::All => {}
            MetricFocus::Voltage | MetricFocus::AvgVoltage => {
                point.voltage_avg = Some(averages.voltage);
            }
            MetricFocus::Current | MetricFocus::AvgCurrent => {
                point.current_avg = Some(averages.current);
            }
            MetricFocus::Power => {
                point.power_avg = Some(averages.power);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DateRangeQuery {
    pub device_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub generation: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
    pub online: bool,
    pub readings: Vec<Reading>,
    pub averages: Averages,
    pub summary: MetricsSummary,
    pub buckets: Vec<DailyBucket>,
}

impl DeviceSnapshot {
    pub fn empty(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            generation: 0,
            fetched_at: Utc::now(),
            online: false,
            readings: Vec::new(),
            averages: Averages::default(),
            summary: MetricsSummary::default(),
            buckets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone};

    #[test]
    fn test_reading_deserializes_from_wire_format() {
        let json = r#"{
            "id": "r-001",
            "deviceId": "esp32-solar-01",
            "timestamp": 1736072400000,
            "voltage": 12.4,
            "current": 1.25,
            "power": 15.5
        }"#;

        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.id, "r-001");
        assert_eq!(reading.device_id, "esp32-solar-01");
        assert_eq!(
            reading.timestamp,
            Utc.timestamp_millis_opt(1736072400000).unwrap()
        );
        assert_eq!(reading.voltage, Some(12.4));
        assert_eq!(reading.current, Some(1.25));
        assert_eq!(reading.power, Some(15.5));
        assert_eq!(reading.temperature, None);
        assert_eq!(reading.humidity, None);
    }

    #[test]
    fn test_reading_roundtrips_timestamp_as_millis() {
        let mut reading = Reading::new(
            "esp32-solar-01",
            Utc.timestamp_millis_opt(1736072400000).unwrap(),
        );
        reading.voltage = Some(11.9);

        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["timestamp"], 1736072400000i64);
        assert_eq!(value["deviceId"], "esp32-solar-01");
    }

    #[test]
    fn test_chart_point_omits_unset_overlays() {
        let reading = Reading::new("dev-1", Utc.timestamp_millis_opt(1736072400000).unwrap());
        let point = ChartPoint::from_reading(&reading, &Utc.fix());

        let value = serde_json::to_value(&point).unwrap();
        assert!(value.get("voltageAvg").is_none());
        assert!(value.get("currentAvg").is_none());
        assert!(value.get("powerAvg").is_none());
    }

    #[test]
    fn test_chart_point_serializes_set_overlay() {
        let reading = Reading::new("dev-1", Utc.timestamp_millis_opt(1736072400000).unwrap());
        let mut point = ChartPoint::from_reading(&reading, &Utc.fix());
        MetricFocus::Voltage.annotate(
            &mut point,
            Averages {
                voltage: 12.1,
                current: 0.0,
                power: 0.0,
            },
        );

        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(value["voltageAvg"], 12.1);
        assert!(value.get("currentAvg").is_none());
    }

    #[test]
    fn test_chart_point_maps_missing_metrics_to_zero() {
        let reading = Reading::new("dev-1", Utc.timestamp_millis_opt(1736072400000).unwrap());
        let point = ChartPoint::from_reading(&reading, &Utc.fix());

        assert_eq!(point.voltage, 0.0);
        assert_eq!(point.current, 0.0);
        assert_eq!(point.power, 0.0);
    }

    #[test]
    fn test_chart_point_time_respects_offset() {
        let reading = Reading::new("dev-1", Utc.with_ymd_and_hms(2025, 6, 1, 23, 30, 0).unwrap());

        let utc_point = ChartPoint::from_reading(&reading, &Utc.fix());
        assert_eq!(utc_point.time, "23:30:00");

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_point = ChartPoint::from_reading(&reading, &plus_two);
        assert_eq!(local_point.time, "01:30:00");
    }

    #[test]
    fn test_focus_toggle_selects_new_metric() {
        assert_eq!(
            MetricFocus::All.toggle(MetricFocus::Voltage),
            MetricFocus::Voltage
        );
        assert_eq!(
            MetricFocus::Voltage.toggle(MetricFocus::Power),
            MetricFocus::Power
        );
    }

    #[test]
    fn test_focus_toggle_same_metric_returns_to_all() {
        assert_eq!(
            MetricFocus::Voltage.toggle(MetricFocus::Voltage),
            MetricFocus::All
        );
        assert_eq!(
            MetricFocus::AvgCurrent.toggle(MetricFocus::AvgCurrent),
            MetricFocus::All
        );
    }

    #[test]
    fn test_focus_defaults_to_all() {
        assert_eq!(MetricFocus::default(), MetricFocus::All);
    }

    #[test]
    fn test_focus_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MetricFocus::AvgVoltage).unwrap(),
            "\"avg_voltage\""
        );
        assert_eq!(serde_json::to_string(&MetricFocus::All).unwrap(), "\"all\"");
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = DeviceSnapshot::empty("esp32-solar-01");
        assert_eq!(snapshot.device_id, "esp32-solar-01");
        assert_eq!(snapshot.generation, 0);
        assert!(!snapshot.online);
        assert!(snapshot.readings.is_empty());
        assert!(snapshot.buckets.is_empty());
    }
}
