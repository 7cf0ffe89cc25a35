use std::time::Duration;

use bytes::Bytes;
use devsim_proto::{
    Heartbeat, SerialNumber,
    msg::{AuthToken, CreateDeviceReq, CreateRuleReq, RegisterUserReq, RegisterUserResp},
};
use http::{HeaderValue, Method, Response, StatusCode, header};
use log::trace;
use serde::{Serialize, de::DeserializeOwned};

use crate::http_util;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: [{}]{body}", .status.as_u16())]
    Status { status: StatusCode, body: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Client for the device-management REST API.
///
/// Every call opens its own connection and is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /users/register`
    pub async fn register_user(&self, req: &RegisterUserReq) -> Result<RegisterUserResp, ApiError> {
        let resp = self
            .request(Method::POST, "/users/register", None, Some(json_body(req)?))
            .await?;
        parse_json(success(resp)?)
    }

    /// `POST /devices`
    pub async fn create_device(&self, token: &AuthToken, req: &CreateDeviceReq) -> Result<(), ApiError> {
        let resp = self
            .request(Method::POST, "/devices", Some(token), Some(json_body(req)?))
            .await?;
        success(resp)?;
        Ok(())
    }

    /// `POST /notifications/rules`
    pub async fn create_rule(&self, token: &AuthToken, req: &CreateRuleReq) -> Result<(), ApiError> {
        let resp = self
            .request(
                Method::POST,
                "/notifications/rules",
                Some(token),
                Some(json_body(req)?),
            )
            .await?;
        success(resp)?;
        Ok(())
    }

    /// `GET /opendevices/sns`
    pub async fn list_serials(&self) -> Result<Vec<SerialNumber>, ApiError> {
        let resp = self.request(Method::GET, "/opendevices/sns", None, None).await?;
        parse_json(success(resp)?)
    }

    /// `POST /heartbeats`
    ///
    /// Only transport failures are errors; the status code is handed back
    /// as is, whatever it is.
    pub async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<StatusCode, ApiError> {
        let resp = self
            .request(Method::POST, "/heartbeats", None, Some(json_body(heartbeat)?))
            .await?;
        Ok(resp.status())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&AuthToken>,
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>, ApiError> {
        let uri = format!("{}{path}", self.base_url);
        let mut builder = http_util::basic_request_builder(&uri, method)?;

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| anyhow::anyhow!("invalid auth token: {e}"))?;
            builder = builder.header(header::AUTHORIZATION, value);
        }

        let body = match body {
            Some(body) => {
                builder = builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, body.len());
                body
            }
            None => Bytes::new(),
        };
        let req = builder.body(body).map_err(anyhow::Error::from)?;

        trace!("{} {uri}", req.method());
        match tokio::time::timeout(self.timeout, http_util::send_http_request(req)).await {
            Ok(resp) => Ok(resp?),
            Err(_) => Err(ApiError::Timeout(self.timeout)),
        }
    }
}

fn json_body<T: Serialize>(value: &T) -> Result<Bytes, ApiError> {
    Ok(serde_json::to_vec(value)?.into())
}

fn success(resp: Response<Bytes>) -> Result<Response<Bytes>, ApiError> {
    if !resp.status().is_success() {
        return Err(ApiError::Status {
            status: resp.status(),
            body: String::from_utf8_lossy(resp.body()).into_owned(),
        });
    }
    Ok(resp)
}

fn parse_json<T: DeserializeOwned>(resp: Response<Bytes>) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(resp.body())?)
}
