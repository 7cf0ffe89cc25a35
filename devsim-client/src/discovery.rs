use std::time::Duration;

use devsim_proto::SerialNumber;
use log::{debug, warn};
use tokio::time::sleep;

use crate::api::ApiClient;

/// Polls the serial number listing until it comes back non-empty.
///
/// Errors and empty listings both count as "not ready yet". Gives up with an
/// empty list after `max_retries` attempts; there is no pause after the last
/// one.
pub async fn get_devices_with_retry(
    api: &ApiClient,
    max_retries: u32,
    delay: Duration,
) -> Vec<SerialNumber> {
    for attempt in 1..=max_retries {
        match api.list_serials().await {
            Ok(sns) if !sns.is_empty() => {
                debug!("discovered {} devices on attempt {attempt}/{max_retries}", sns.len());
                return sns;
            }
            Ok(_) => warn!("attempt {attempt}/{max_retries}: no devices registered yet"),
            Err(e) => warn!("attempt {attempt}/{max_retries} failed: {e}"),
        }

        if attempt < max_retries {
            sleep(delay).await;
        }
    }

    Vec::new()
}
