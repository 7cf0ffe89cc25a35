#![forbid(unsafe_code)]

use argh::FromArgs;
use simple_logger::SimpleLogger;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{api::ApiClient, egress::DiscoveryPolicy};

mod api;
mod config;
mod discovery;
mod egress;
mod heartbeat;
mod http_util;
#[cfg(test)]
mod mock;
mod provision;

#[derive(FromArgs, Debug)]
#[argh(description = "Simulated IoT fleet reporting to a device-management API.")]
struct Cli {
    #[argh(
        option,
        short = 'c',
        default = "\"devsim.toml\".to_string()",
        description = "path to config file"
    )]
    pub config_path: String,
    #[argh(
        option,
        short = 'u',
        description = "base URL of the API, overrides the config file"
    )]
    pub base_url: Option<String>,
    #[argh(subcommand)]
    pub mode: Mode,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Mode {
    Provision(ProvisionMode),
    Telemetry(TelemetryMode),
}

#[derive(FromArgs, Debug)]
#[argh(
    subcommand,
    name = "provision",
    description = "register a user, create the fleet, then report while re-discovering devices every cycle"
)]
struct ProvisionMode {}

#[derive(FromArgs, Debug)]
#[argh(
    subcommand,
    name = "telemetry",
    description = "discover the fleet once, then report for it forever"
)]
struct TelemetryMode {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let cli: Cli = argh::from_env();
    log::debug!("command line: {cli:#?}");

    let mut conf = config::config(&cli.config_path)?;
    if let Some(base_url) = cli.base_url {
        conf.base_url = base_url;
    }
    log::debug!("config: {conf:#?}");

    let api = ApiClient::new(&conf.base_url, conf.request_timeout());
    let discovery = DiscoveryPolicy {
        max_retries: conf.discovery.max_retries,
        retry_delay: conf.discovery.retry_delay(),
    };
    let shutdown = shutdown_on_ctrl_c();

    log::info!(
        "waiting {} seconds for {} to come up...",
        conf.startup_delay,
        api.base_url()
    );
    if until_shutdown(&shutdown, sleep(conf.startup_delay())).await.is_none() {
        return Ok(());
    }

    match cli.mode {
        Mode::Provision(_) => {
            let Some(provisioned) =
                until_shutdown(&shutdown, provision::bootstrap(&api, &conf.bootstrap)).await
            else {
                return Ok(());
            };
            provisioned?;
            egress::provisioning_loop(&api, discovery, conf.heartbeat_interval(), shutdown).await;
        }
        Mode::Telemetry(_) => {
            let Some(sns) = until_shutdown(
                &shutdown,
                discovery::get_devices_with_retry(
                    &api,
                    discovery.max_retries,
                    discovery.retry_delay,
                ),
            )
            .await
            else {
                return Ok(());
            };
            if sns.is_empty() {
                anyhow::bail!("no devices found after {} attempts", discovery.max_retries);
            }
            log::info!("{} devices found, sending heartbeats", sns.len());
            egress::telemetry_loop(&api, &sns, conf.heartbeat_interval(), shutdown).await;
        }
    }

    log::info!("shutting down");
    Ok(())
}

/// Drives `fut` to completion unless `shutdown` fires first.
async fn until_shutdown<F: Future>(shutdown: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = shutdown.cancelled() => {
            log::info!("interrupted");
            None
        }
        out = fut => Some(out),
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown_token = CancellationToken::new();
    tokio::spawn({
        let shutdown_token = shutdown_token.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("unable to listen for ctrl-c: {e}");
                return;
            }
            shutdown_token.cancel();
        }
    });
    shutdown_token
}
