use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

use crate::models::{
    Averages, ChartPoint, DailyBucket, MetricFocus, MetricStats, MetricsSummary, Reading,
};

#[derive(Debug, Clone, Copy)]
pub struct SeriesOptions {
    pub limit: usize,
    pub focus: MetricFocus,
    pub averages: Averages,
}

#[derive(Debug, Clone)]
pub struct TelemetryAggregator {
    staleness: Duration,
    recent_floor: usize,
    window_days: u32,
    bucket_offset: FixedOffset,
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self {
            staleness: Duration::minutes(10),
            recent_floor: 10,
            window_days: 7,
            bucket_offset: Utc.fix(),
        }
    }
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_recent_floor(mut self, floor: usize) -> Self {
        self.recent_floor = floor;
        self
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days.max(1);
        self
    }

    pub fn with_bucket_offset(mut self, offset: FixedOffset) -> Self {
        self.bucket_offset = offset;
        self
    }

    pub fn recent_floor(&self) -> usize {
        self.recent_floor
    }

    /// Newest readings first, capped at `limit` but never below the floor
    /// that the online-status check needs.
    pub fn select_recent(&self, readings: &[Reading], limit: usize) -> Vec<Reading> {
        let mut sorted = readings.to_vec();
        sorted.sort_by_key(|r| Reverse(r.timestamp));
        sorted.truncate(limit.max(self.recent_floor));
        sorted
    }

    /// `recent` must be sorted newest-first, as returned by `select_recent`.
    pub fn online_status(&self, recent: &[Reading], now: DateTime<Utc>) -> bool {
        match recent.first() {
            Some(latest) => now.signed_duration_since(latest.timestamp) <= self.staleness,
            None => false,
        }
    }

    /// Missing metrics count as zero; the divisor is always the full set.
    pub fn averages(&self, readings: &[Reading]) -> Averages {
        if readings.is_empty() {
            return Averages::default();
        }
        let count = readings.len() as f64;
        let mut voltage = 0.0;
        let mut current = 0.0;
        let mut power = 0.0;
        for reading in readings {
            voltage += reading.voltage.unwrap_or(0.0);
            current += reading.current.unwrap_or(0.0);
            power += reading.power.unwrap_or(0.0);
        }
        Averages {
            voltage: voltage / count,
            current: current / count,
            power: power / count,
        }
    }

    /// Min/max cover only readings that actually report the metric, so a
    /// device with sparse sensors does not get dragged to zero.
    pub fn summary(&self, readings: &[Reading]) -> MetricsSummary {
        let averages = self.averages(readings);
        MetricsSummary {
            voltage: stats_for(readings, averages.voltage, |r| r.voltage),
            current: stats_for(readings, averages.current, |r| r.current),
            power: stats_for(readings, averages.power, |r| r.power),
        }
    }

    /// One bucket per calendar day for the trailing window, oldest first,
    /// ending on the reference date. Days without readings still get a
    /// bucket with zeroed aggregates.
    pub fn daily_breakdown(
        &self,
        readings: &[Reading],
        reference: DateTime<Utc>,
    ) -> Vec<DailyBucket> {
        let mut by_date: HashMap<NaiveDate, Vec<Reading>> = HashMap::new();
        for reading in readings {
            let date = reading
                .timestamp
                .with_timezone(&self.bucket_offset)
                .date_naive();
            by_date.entry(date).or_default().push(reading.clone());
        }

        let today = reference.with_timezone(&self.bucket_offset).date_naive();
        let mut buckets = Vec::with_capacity(self.window_days as usize);
        for days_back in (0..self.window_days as i64).rev() {
            let date = today - Duration::days(days_back);
            let mut day = by_date.remove(&date).unwrap_or_default();
            day.sort_by_key(|r| r.timestamp);

            let averages = self.averages(&day);
            let chart_points = day
                .iter()
                .map(|r| ChartPoint::from_reading(r, &self.bucket_offset))
                .collect();

            buckets.push(DailyBucket {
                date,
                label: date.format("%b %-d, %Y").to_string(),
                count: day.len(),
                avg_voltage: averages.voltage,
                avg_current: averages.current,
                avg_power: averages.power,
                chart_points,
                readings: day,
            });
        }
        buckets
    }

    /// Chart-ready points in chronological order regardless of input order.
    /// The focused metric's average is stamped onto every point so the chart
    /// can draw a flat overlay line.
    pub fn chart_series(&self, readings: &[Reading], options: &SeriesOptions) -> Vec<ChartPoint> {
        let mut sorted: Vec<&Reading> = readings.iter().collect();
        sorted.sort_by_key(|r| r.timestamp);
        sorted.truncate(options.limit);

        sorted
            .into_iter()
            .map(|reading| {
                let mut point = ChartPoint::from_reading(reading, &self.bucket_offset);
                options.focus.annotate(&mut point, options.averages);
                point
            })
            .collect()
    }

    /// Date range covering the trailing daily window. The end date is the
    /// day after the reference date so the current day is fully covered
    /// whether the backend treats the end as inclusive or exclusive.
    pub fn window_range(&self, reference: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let today = reference.with_timezone(&self.bucket_offset).date_naive();
        let start = today - Duration::days(self.window_days as i64 - 1);
        (start, today + Duration::days(1))
    }
}

fn stats_for<F>(readings: &[Reading], avg: f64, metric: F) -> MetricStats
where
    F: Fn(&Reading) -> Option<f64>,
{
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut seen = false;
    for reading in readings {
        if let Some(value) = metric(reading) {
            seen = true;
            if value < min {
                min = value;
            }
            if value > max {
                max = value;
            }
        }
    }
    if !seen {
        return MetricStats {
            min: 0.0,
            max: 0.0,
            avg,
        };
    }
    MetricStats { min, max, avg }
}
