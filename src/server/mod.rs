//! HTTP API
//!
//! | Method | Path                | |
//! |--------|---------------------|-|
//! | GET    | `/health`           | liveness, no tenant needed |
//! | POST   | `/predictions`      | score an assessment input |
//! | GET    | `/patients`         | list the tenant's patients |
//! | POST   | `/patients`         | create |
//! | GET    | `/patients/{id}`    | fetch |
//! | PUT    | `/patients/{id}`    | partial update |
//! | DELETE | `/patients/{id}`    | delete |
//! | POST   | `/recommendations`  | care recommendations |
//!
//! Every route except `/health` requires an `X-Hospital-Id` header.

mod error;
mod handlers;
mod tenant;

pub use error::{ApiError, ApiResult};
pub use handlers::PredictionRequest;
pub use tenant::{Tenant, HOSPITAL_HEADER};

use crate::ai::Recommender;
use crate::scoring::RiskScorer;
use crate::store::PatientStore;
use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PatientStore>,
    pub scorer: Arc<RiskScorer>,
    pub recommender: Recommender,
}

impl AppState {
    pub fn new(store: PatientStore, scorer: RiskScorer, recommender: Recommender) -> Self {
        Self {
            store: Arc::new(store),
            scorer: Arc::new(scorer),
            recommender,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/predictions", post(handlers::predict))
        .route(
            "/patients",
            get(handlers::list_patients).post(handlers::create_patient),
        )
        .route(
            "/patients/{id}",
            get(handlers::get_patient)
                .put(handlers::update_patient)
                .delete(handlers::delete_patient),
        )
        .route("/recommendations", post(handlers::recommend))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
