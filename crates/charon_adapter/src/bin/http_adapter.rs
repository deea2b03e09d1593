#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use charon_adapter::{
    AdapterHealthResponse, AdapterRuntime, ApproveAdapterRequest, ApproveAdapterResponse,
    CheckCreditsAdapterRequest, CheckCreditsAdapterResponse, EnhanceAdapterRequest,
    EnhanceAdapterResponse, IssueAdapterRequest, RegisterAdapterRequest, RegisterAdapterResponse,
    RejectAdapterRequest, RejectAdapterResponse, RevokeAdapterRequest, RevokeAdapterResponse,
    VerifyAdapterRequest, VerifyAdapterResponse,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = env::var("CHARON_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let reaper_enabled = parse_reaper_enabled_from_env();
    let reaper_interval_ms = parse_reaper_interval_ms_from_env();

    let runtime = Arc::new(AdapterRuntime::default_from_env()?);
    if reaper_enabled {
        let runtime_for_worker = runtime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(reaper_interval_ms));
            loop {
                ticker.tick().await;
                if let Err(err) = runtime_for_worker.run_reservation_reaper_worker_pass(None) {
                    eprintln!("charon_adapter_http reaper pass failed: {err}");
                }
            }
        });
    }

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/report", get(report))
        .route("/v1/register", post(run_register))
        .route("/v1/approve", post(run_approve))
        .route("/v1/reject", post(run_reject))
        .route("/v1/issue", post(run_issue))
        .route("/v1/verify", post(run_verify))
        .route("/v1/credits/check", post(run_check_credits))
        .route("/v1/enhance", post(run_enhance))
        .route("/v1/revoke", post(run_revoke))
        .with_state(runtime);

    println!(
        "charon_adapter_http listening on http://{addr} (reaper_enabled={reaper_enabled} interval_ms={reaper_interval_ms})"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_reaper_enabled_from_env() -> bool {
    match env::var("CHARON_REAPER_ENABLED") {
        Ok(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
        Err(_) => true,
    }
}

fn parse_reaper_interval_ms_from_env() -> u64 {
    env::var("CHARON_REAPER_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| (100..=60_000).contains(v))
        .unwrap_or(5_000)
}

async fn healthz(
    State(runtime): State<Arc<AdapterRuntime>>,
) -> (StatusCode, Json<AdapterHealthResponse>) {
    match runtime.health_report() {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse::unhealthy(reason)),
        ),
    }
}

async fn report(
    State(runtime): State<Arc<AdapterRuntime>>,
) -> (StatusCode, Json<AdapterHealthResponse>) {
    healthz(State(runtime)).await
}

async fn run_register(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<RegisterAdapterRequest>,
) -> (StatusCode, Json<RegisterAdapterResponse>) {
    match runtime.run_register(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(RegisterAdapterResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(reason),
            }),
        ),
    }
}

async fn run_approve(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<ApproveAdapterRequest>,
) -> (StatusCode, Json<ApproveAdapterResponse>) {
    match runtime.run_approve(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (StatusCode::BAD_REQUEST, Json(approve_error(reason))),
    }
}

async fn run_reject(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<RejectAdapterRequest>,
) -> (StatusCode, Json<RejectAdapterResponse>) {
    match runtime.run_reject(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(RejectAdapterResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(reason),
            }),
        ),
    }
}

async fn run_issue(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<IssueAdapterRequest>,
) -> (StatusCode, Json<ApproveAdapterResponse>) {
    match runtime.run_issue(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (StatusCode::BAD_REQUEST, Json(approve_error(reason))),
    }
}

async fn run_verify(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<VerifyAdapterRequest>,
) -> (StatusCode, Json<VerifyAdapterResponse>) {
    match runtime.run_verify(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(VerifyAdapterResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(reason),
                name: None,
                remaining_credits: None,
            }),
        ),
    }
}

async fn run_check_credits(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<CheckCreditsAdapterRequest>,
) -> (StatusCode, Json<CheckCreditsAdapterResponse>) {
    match runtime.run_check_credits(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(CheckCreditsAdapterResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(reason),
                granted: None,
                consumed: None,
                remaining: None,
                account_status: None,
            }),
        ),
    }
}

async fn run_enhance(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<EnhanceAdapterRequest>,
) -> (StatusCode, Json<EnhanceAdapterResponse>) {
    match runtime.run_enhance(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(EnhanceAdapterResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(reason),
                enhanced_text: None,
                remaining_credits: None,
            }),
        ),
    }
}

async fn run_revoke(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<RevokeAdapterRequest>,
) -> (StatusCode, Json<RevokeAdapterResponse>) {
    match runtime.run_revoke(request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(RevokeAdapterResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(reason),
            }),
        ),
    }
}

fn approve_error(reason: String) -> ApproveAdapterResponse {
    ApproveAdapterResponse {
        status: "error".to_string(),
        outcome: "REJECTED".to_string(),
        reason: Some(reason),
        code: None,
    }
}
