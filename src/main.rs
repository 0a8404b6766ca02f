use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::info;

use telemetry_aggregator::client::ReadingsClient;
use telemetry_aggregator::config::MonitorConfig;
use telemetry_aggregator::poll::DevicePoller;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = MonitorConfig::from_env();
    info!(
        "Monitoring device {} via {} (poll every {}s)",
        config.device_id, config.api_url, config.poll_interval_secs
    );

    let client = ReadingsClient::new(&config.api_url)
        .with_request_timeout(Duration::from_secs(config.request_timeout_secs));
    let shutdown = Arc::new(Notify::new());

    let (poller, mut snapshots) = DevicePoller::new(
        Arc::new(client),
        config.aggregator(),
        config.device_id.clone(),
        Arc::clone(&shutdown),
    );
    let poller = poller
        .with_poll_interval(Duration::from_secs(config.poll_interval_secs))
        .with_recent_limit(config.recent_limit);
    let metrics = poller.metrics();

    let poller_handle = tokio::spawn(poller.run());

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    "Device {}: online={} readings={} buckets={} avg {:.2}V {:.2}A {:.2}W",
                    snapshot.device_id,
                    snapshot.online,
                    snapshot.readings.len(),
                    snapshot.buckets.len(),
                    snapshot.averages.voltage,
                    snapshot.averages.current,
                    snapshot.averages.power,
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                shutdown.notify_one();
                break;
            }
        }
    }

    poller_handle.await?;

    let stats = metrics.stats();
    info!(
        "Poll stats: {} started, {} succeeded, {} failed, {} stale dropped, avg fetch {:.1}ms",
        stats.polls_started,
        stats.polls_succeeded,
        stats.polls_failed,
        stats.stale_dropped,
        stats.avg_fetch_latency_ms,
    );

    Ok(())
}
