use std::time::Duration;

use devsim_proto::SerialNumber;
use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{api::ApiClient, discovery::get_devices_with_retry, heartbeat::simulate_heartbeat};

/// Outcome of one pass over the device list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 2xx answers
    pub accepted: usize,
    /// answered with any other status
    pub rejected: usize,
    /// no answer at all
    pub failed: usize,
}

/// Sends one heartbeat per device, in order. A failure for one device never
/// keeps the remaining ones from being attempted.
pub async fn send_heartbeats(api: &ApiClient, sns: &[SerialNumber]) -> CycleReport {
    let mut report = CycleReport::default();

    for sn in sns {
        let res: anyhow::Result<_> = async {
            let heartbeat = simulate_heartbeat(sn)?;
            Ok(api.send_heartbeat(&heartbeat).await?)
        }
        .await;

        match res {
            Ok(status) if status.is_success() => {
                info!("heartbeat sent for {sn}: {}", status.as_u16());
                report.accepted += 1;
            }
            Ok(status) => {
                warn!("heartbeat sent for {sn}: {}", status.as_u16());
                report.rejected += 1;
            }
            Err(e) => {
                warn!("failed to send heartbeat for {sn}: {e}");
                report.failed += 1;
            }
        }
    }

    debug!("heartbeat cycle finished: {report:?}");
    report
}

/// Retry budget of the discovery round run at the start of every cycle.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Re-discovers the fleet before every cycle, so devices registered later on
/// start reporting too. Runs until `shutdown` is cancelled.
pub async fn provisioning_loop(
    api: &ApiClient,
    discovery: DiscoveryPolicy,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let cycle = async {
            let sns =
                get_devices_with_retry(api, discovery.max_retries, discovery.retry_delay).await;
            if sns.is_empty() {
                warn!("no devices found, retrying next cycle");
            } else {
                info!("{} devices found, sending heartbeats", sns.len());
                send_heartbeats(api, &sns).await;
            }
            sleep(interval).await;
        };

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = cycle => { /* continue */ }
        }
    }
}

/// Reports for a fixed fleet forever. Runs until `shutdown` is cancelled.
pub async fn telemetry_loop(
    api: &ApiClient,
    sns: &[SerialNumber],
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let cycle = async {
            send_heartbeats(api, sns).await;
            sleep(interval).await;
        };

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = cycle => { /* continue */ }
        }
    }
}
