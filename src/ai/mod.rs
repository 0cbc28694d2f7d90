//! AI-phrased care recommendations
//!
//! This module provides LLM-generated care recommendations with support for
//! multiple backends (Anthropic, OpenAI, Gemini, Ollama). Uses BYOK (bring
//! your own key) - API keys are read from environment variables. Generation
//! failures never reach the caller: [`Recommender`] substitutes a fixed
//! per-tier table instead.
//!
//! # Environment Variables
//!
//! - `ANTHROPIC_API_KEY`: Required for the Anthropic backend
//! - `OPENAI_API_KEY`: Required for the OpenAI backend
//! - `GEMINI_API_KEY`: Required for the Gemini backend
//! - `OLLAMA_MODEL`: Optional model override for Ollama
//!
//! # Example
//!
//! ```rust,ignore
//! use careline::ai::{AiClient, LlmBackend, LlmRecommender, Recommender};
//!
//! let client = AiClient::from_env(LlmBackend::Gemini)?;
//! let recommender = Recommender::new(Arc::new(LlmRecommender::new(client)));
//! let set = recommender.recommend(&request, chrono::Utc::now());
//! ```

mod client;
mod prompts;
mod recommendations;

pub use client::{AiClient, AiConfig, LlmBackend, Message, Role};
pub use prompts::{PromptTemplate, RecommendationPromptBuilder};
pub use recommendations::{
    fallback_recommendations, parse_recommendations, CareTier, GeneratedRecommendations,
    LlmRecommender, RecommendationGenerator, RecommendationMetadata, RecommendationRequest,
    RecommendationSet, RecommendationSource, Recommender,
};

use thiserror::Error;

/// Errors that can occur in the AI module
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Missing API key: {env_var} not set. Get your key at {signup_url}")]
    MissingApiKey { env_var: String, signup_url: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type AiResult<T> = Result<T, AiError>;
