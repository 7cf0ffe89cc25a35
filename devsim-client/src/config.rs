use std::time::Duration;

use confique::Config;

#[derive(Config, Debug)]
pub struct Conf {
    /// Base URL of the device-management API
    #[config(env = "DEVSIM_BASE_URL", default = "http://host.docker.internal:3000/api/v1")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[config(env = "DEVSIM_REQUEST_TIMEOUT", default = 5)]
    pub request_timeout: u64,

    /// Delay before the first request, in seconds
    #[config(env = "DEVSIM_STARTUP_DELAY", default = 30)]
    pub startup_delay: u64,

    /// Pause between two heartbeat cycles, in seconds
    #[config(env = "DEVSIM_HEARTBEAT_INTERVAL", default = 60)]
    pub heartbeat_interval: u64,

    #[config(nested)]
    pub discovery: DiscoveryConf,

    #[config(nested)]
    pub bootstrap: BootstrapConf,
}

#[derive(Config, Debug)]
pub struct DiscoveryConf {
    /// Attempts per discovery round
    #[config(env = "DEVSIM_DISCOVERY_MAX_RETRIES", default = 10)]
    pub max_retries: u32,

    /// Pause between two attempts, in seconds
    #[config(env = "DEVSIM_DISCOVERY_RETRY_DELAY", default = 5)]
    pub retry_delay: u64,
}

#[derive(Config, Debug)]
pub struct BootstrapConf {
    #[config(default = "admin")]
    pub user_name: String,

    #[config(default = "admin@admin")]
    pub user_email: String,

    #[config(env = "DEVSIM_USER_PASSWORD", default = "admin123")]
    pub user_password: String,

    /// Number of simulated devices to create
    #[config(default = 3)]
    pub fleet_size: usize,

    /// Locations picked at random for each device
    #[config(default = ["São Paulo", "Rio de Janeiro", "Curitiba"])]
    pub locations: Vec<String>,
}

pub fn config(path: &str) -> anyhow::Result<Conf> {
    let conf = Conf::builder().env().file(path).load()?;

    if conf.bootstrap.locations.is_empty() {
        anyhow::bail!("config error: bootstrap.locations must not be empty");
    }

    Ok(conf)
}

impl Conf {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
}

impl DiscoveryConf {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}
