//! In-process stand-in for the device-management API, used by the tests.

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_auth::AuthBearer;
use devsim_proto::{
    Heartbeat, SerialNumber,
    msg::{AuthToken, CreateDeviceReq, CreateRuleReq, RegisterUserReq, RegisterUserResp, UserInfo},
};
use tokio::net::TcpListener;

use crate::api::ApiClient;

pub const MOCK_TOKEN: &str = "mock-token";

/// Everything the mock received, in arrival order.
#[derive(Debug, Default)]
pub struct Recorded {
    pub registrations: Vec<RegisterUserReq>,
    pub devices: Vec<CreateDeviceReq>,
    pub rules: Vec<CreateRuleReq>,
    pub heartbeats: Vec<Heartbeat>,
    pub device_attempts: usize,
    pub rule_attempts: usize,
    pub serial_queries: usize,
}

#[derive(Debug, Default)]
pub struct MockBehavior {
    /// Listings served first, one per query. Once drained, the serials of
    /// the devices created so far are listed.
    pub serial_script: VecDeque<Vec<SerialNumber>>,
    /// Forced status for the serial listing.
    pub serials_status: Option<StatusCode>,
    /// Number of listings answered 200 with a body that is not a list.
    pub malformed_listings: usize,
    /// Forced status for device creation.
    pub devices_status: Option<StatusCode>,
    /// Forced status for rule creation.
    pub rules_status: Option<StatusCode>,
    /// Forced status for heartbeats.
    pub heartbeat_status: Option<StatusCode>,
    pub reject_registration: bool,
    /// Registrations are accepted but never answered in time.
    pub stall_registration: bool,
    /// Heartbeats for this device are accepted but never answered in time.
    pub stall_heartbeat_for: Option<SerialNumber>,
}

#[derive(Debug, Default)]
struct MockState {
    recorded: Mutex<Recorded>,
    behavior: Mutex<MockBehavior>,
}

type SharedState = Arc<MockState>;

pub struct MockApi {
    addr: SocketAddr,
    state: SharedState,
}

impl MockApi {
    pub async fn start(behavior: MockBehavior) -> Self {
        let state = Arc::new(MockState {
            recorded: Mutex::default(),
            behavior: Mutex::new(behavior),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app(state.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });

        Self { addr, state }
    }

    pub fn client(&self, timeout: Duration) -> ApiClient {
        ApiClient::new(&format!("http://{}/api/v1", self.addr), timeout)
    }

    pub fn recorded<R>(&self, f: impl FnOnce(&Recorded) -> R) -> R {
        f(&self.state.recorded.lock().unwrap())
    }
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn app(state: SharedState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .route("/users/register", post(register))
                .route("/devices", post(create_device))
                .route("/notifications/rules", post(create_rule))
                .route("/opendevices/sns", get(list_serials))
                .route("/heartbeats", post(heartbeat)),
        )
        .with_state(state)
}

async fn register(State(state): State<SharedState>, Json(req): Json<RegisterUserReq>) -> Response {
    let (reject, stall) = {
        let behavior = state.behavior.lock().unwrap();
        (behavior.reject_registration, behavior.stall_registration)
    };
    if reject {
        return (StatusCode::BAD_REQUEST, "email already registered").into_response();
    }
    if stall {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }

    let user = UserInfo {
        name: req.name.clone(),
        email: req.email.clone(),
    };
    state.recorded.lock().unwrap().registrations.push(req);

    (
        StatusCode::CREATED,
        Json(RegisterUserResp {
            user,
            token: AuthToken::new(MOCK_TOKEN),
        }),
    )
        .into_response()
}

async fn create_device(
    State(state): State<SharedState>,
    AuthBearer(token): AuthBearer,
    Json(req): Json<CreateDeviceReq>,
) -> StatusCode {
    if token != MOCK_TOKEN {
        return StatusCode::UNAUTHORIZED;
    }
    let mut recorded = state.recorded.lock().unwrap();
    recorded.device_attempts += 1;
    if let Some(status) = state.behavior.lock().unwrap().devices_status {
        return status;
    }
    recorded.devices.push(req);
    StatusCode::CREATED
}

async fn create_rule(
    State(state): State<SharedState>,
    AuthBearer(token): AuthBearer,
    Json(req): Json<CreateRuleReq>,
) -> StatusCode {
    if token != MOCK_TOKEN {
        return StatusCode::UNAUTHORIZED;
    }
    let mut recorded = state.recorded.lock().unwrap();
    recorded.rule_attempts += 1;
    if let Some(status) = state.behavior.lock().unwrap().rules_status {
        return status;
    }
    recorded.rules.push(req);
    StatusCode::CREATED
}

async fn list_serials(State(state): State<SharedState>) -> Response {
    let mut recorded = state.recorded.lock().unwrap();
    recorded.serial_queries += 1;

    let mut behavior = state.behavior.lock().unwrap();
    if let Some(status) = behavior.serials_status {
        return (status, "forced failure").into_response();
    }
    if behavior.malformed_listings > 0 {
        behavior.malformed_listings -= 1;
        return (StatusCode::OK, Json(serde_json::json!({"error": "x"}))).into_response();
    }

    let sns = match behavior.serial_script.pop_front() {
        Some(sns) => sns,
        None => recorded.devices.iter().map(|d| d.sn.clone()).collect(),
    };
    Json(sns).into_response()
}

async fn heartbeat(State(state): State<SharedState>, Json(hb): Json<Heartbeat>) -> StatusCode {
    let (stall, status) = {
        let behavior = state.behavior.lock().unwrap();
        (
            behavior.stall_heartbeat_for.as_ref() == Some(&hb.device_sn),
            behavior.heartbeat_status.unwrap_or(StatusCode::ACCEPTED),
        )
    };
    state.recorded.lock().unwrap().heartbeats.push(hb);

    if stall {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    status
}
