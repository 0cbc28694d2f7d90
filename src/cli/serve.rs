//! HTTP server command handler

use crate::ai::{AiClient, LlmRecommender, Recommender};
use crate::config::{AiSection, ServiceConfig};
use crate::server::{self, AppState};
use crate::store::PatientStore;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the HTTP API until Ctrl-C
pub fn run(config: ServiceConfig) -> Result<()> {
    let scorer = config
        .scoring
        .scorer()
        .context("Invalid [scoring] configuration")?;
    let recommender = build_recommender(&config.ai)?;

    let store = PatientStore::open(&config.storage.path)
        .with_context(|| format!("Failed to open database {}", config.storage.path.display()))?;
    info!("Patient store: {}", config.storage.path.display());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = AppState::new(store, scorer, recommender);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::serve(state, addr))
}

/// LLM-backed recommender when configured and a key is available,
/// otherwise the fallback table only.
fn build_recommender(ai: &AiSection) -> Result<Recommender> {
    if !ai.enabled {
        info!("AI recommendations disabled, serving fallback recommendations");
        return Ok(Recommender::fallback_only());
    }

    let client_config = ai.client_config()?;
    match AiClient::from_env_with_config(client_config) {
        Ok(client) => {
            info!(
                "AI recommendations via {} ({})",
                client.backend(),
                client.model()
            );
            Ok(Recommender::new(Arc::new(LlmRecommender::new(client))))
        }
        Err(e) => {
            warn!("{}. Serving fallback recommendations.", e);
            Ok(Recommender::fallback_only())
        }
    }
}
