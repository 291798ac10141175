use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use payrelay_core::LookupStore;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    lookup: LookupStore,
    payment_status: &'static str,
}

impl HealthState {
    pub fn new(lookup: LookupStore, payment_status: &'static str) -> Self {
        Self { lookup, payment_status }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub lookup: HealthCheck,
    /// Informational only; readiness does not depend on it.
    pub payment_server: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let lookup = lookup_check(&state.lookup);
    let ready = lookup.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "payrelay-server runtime initialized".to_string(),
        },
        lookup,
        payment_server: HealthCheck {
            status: state.payment_status,
            detail: "payment server state at startup".to_string(),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn lookup_check(lookup: &LookupStore) -> HealthCheck {
    let failures: Vec<String> = lookup
        .check_files()
        .into_iter()
        .filter_map(|check| check.result.err().map(|error| format!("{}: {error}", check.file)))
        .collect();

    if failures.is_empty() {
        HealthCheck { status: "ready", detail: "lookup files readable".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: failures.join("; ") }
    }
}
