use devsim_proto::{
    Condition, Metric, Operator, SerialNumber,
    msg::{AuthToken, CreateDeviceReq, CreateRuleReq, RegisterUserReq},
};
use log::info;
use rand::seq::IndexedRandom;

use crate::{
    api::{ApiClient, ApiError},
    config::BootstrapConf,
};

/// Alert rules attached to every provisioned device.
pub const DEFAULT_RULES: [(Metric, Operator, f64); 2] = [
    (Metric::Temperature, Operator::Gt, 70.0),
    (Metric::CpuUsage, Operator::Gt, 60.0),
];

pub async fn register_user(
    api: &ApiClient,
    name: &str,
    email: &str,
    password: &str,
) -> Result<AuthToken, ApiError> {
    let resp = api
        .register_user(&RegisterUserReq {
            name: name.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        })
        .await?;
    info!("user created: {}", resp.user);

    Ok(resp.token)
}

pub async fn create_device(
    api: &ApiClient,
    token: &AuthToken,
    device: CreateDeviceReq,
) -> Result<SerialNumber, ApiError> {
    api.create_device(token, &device).await?;
    info!("device created: {}", device.sn);

    Ok(device.sn)
}

pub async fn create_rule(
    api: &ApiClient,
    token: &AuthToken,
    device_sn: &SerialNumber,
    metric: Metric,
    operator: Operator,
    value: f64,
) -> Result<(), ApiError> {
    let req = CreateRuleReq {
        device_sn: device_sn.clone(),
        condition: Condition {
            metric,
            operator,
            value,
        },
    };
    api.create_rule(token, &req).await?;
    info!("rule created for {device_sn}: {}", req.condition);

    Ok(())
}

/// Registers the configured user and creates the simulated fleet along with
/// its alert rules. The first failure aborts the whole setup.
pub async fn bootstrap(api: &ApiClient, conf: &BootstrapConf) -> anyhow::Result<Vec<SerialNumber>> {
    let token = register_user(api, &conf.user_name, &conf.user_email, &conf.user_password).await?;

    let mut sns = Vec::with_capacity(conf.fleet_size);
    for i in 1..=conf.fleet_size {
        let location = conf
            .locations
            .choose(&mut rand::rng())
            .ok_or_else(|| anyhow::anyhow!("no device location configured"))?;

        let sn = create_device(
            api,
            &token,
            CreateDeviceReq {
                name: format!("Sensor {i}"),
                location: location.clone(),
                sn: SerialNumber::random(),
                description: format!("IoT device number {i}"),
            },
        )
        .await?;

        for (metric, operator, value) in DEFAULT_RULES {
            create_rule(api, &token, &sn, metric, operator, value).await?;
        }

        sns.push(sn);
    }

    info!("setup finished, {} devices provisioned", sns.len());
    Ok(sns)
}
