//! Care recommendations with a static fallback
//!
//! [`RecommendationGenerator`] is the capability seam: anything that can turn
//! a risk tier into 3–4 recommendations. [`LlmRecommender`] is the LLM-backed
//! implementation. [`Recommender`] wraps an optional generator and never
//! fails: any generator error is logged and replaced by the fixed table in
//! [`fallback_recommendations`].

use crate::ai::prompts::{PromptTemplate, RecommendationPromptBuilder};
use crate::ai::{AiClient, AiError, AiResult, Message};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const MIN_RECOMMENDATIONS: usize = 3;
const MAX_RECOMMENDATIONS: usize = 4;

/// Request for recommendations.
///
/// Fields are read leniently: a field of the wrong JSON type is treated as
/// absent, so any object gets an answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    /// Free-text tier as sent by the client (e.g. "High", "moderate")
    #[serde(default, deserialize_with = "lenient_text")]
    pub risk_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub patient_context: Option<serde_json::Value>,
}

impl RecommendationRequest {
    pub fn risk_level(&self) -> &str {
        self.risk_level.as_deref().unwrap_or_default()
    }

    pub fn tier(&self) -> CareTier {
        CareTier::parse(self.risk_level())
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

/// Tier key of the fallback table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CareTier {
    High,
    Medium,
    Standard,
}

impl CareTier {
    /// `high` and `medium`/`moderate` (any case) are recognised; anything
    /// else, including an empty string, is standard care.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => CareTier::High,
            "medium" | "moderate" => CareTier::Medium,
            _ => CareTier::Standard,
        }
    }
}

/// Recommendations as produced by a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRecommendations {
    pub category: String,
    pub recommendations: Vec<String>,
}

/// Which path produced a recommendation set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationSource {
    #[serde(rename = "ai-generated")]
    AiGenerated,
    #[serde(rename = "fallback")]
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationMetadata {
    pub source: RecommendationSource,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Response body of the recommendations endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSet {
    pub category: String,
    pub recommendations: Vec<String>,
    pub metadata: RecommendationMetadata,
}

/// Something that can phrase care recommendations
pub trait RecommendationGenerator: Send + Sync {
    /// Identifies the generator in logs and response metadata
    fn name(&self) -> String;

    fn generate(&self, request: &RecommendationRequest) -> AiResult<GeneratedRecommendations>;
}

/// Fixed recommendations used whenever generation is unavailable
pub fn fallback_recommendations(tier: CareTier) -> GeneratedRecommendations {
    let (category, items): (&str, &[&str]) = match tier {
        CareTier::High => (
            "High Risk - Intensive Follow-up",
            &[
                "Schedule a follow-up appointment within 7 days of discharge",
                "Arrange home health visits during the first two weeks after discharge",
                "Complete a pharmacist-led medication reconciliation before discharge",
                "Enroll the patient in a transitional care management program",
            ],
        ),
        CareTier::Medium => (
            "Moderate Risk - Structured Follow-up",
            &[
                "Schedule a follow-up appointment within 14 days of discharge",
                "Call the patient within 72 hours of discharge to check on recovery",
                "Review all medications with the patient and provide written instructions",
            ],
        ),
        CareTier::Standard => (
            "Low Risk - Standard Care",
            &[
                "Schedule a routine follow-up appointment within 30 days",
                "Provide written discharge instructions including warning signs",
                "Confirm the patient knows whom to contact with questions",
            ],
        ),
    };

    GeneratedRecommendations {
        category: category.to_string(),
        recommendations: items.iter().map(|s| s.to_string()).collect(),
    }
}

/// LLM-backed generator
pub struct LlmRecommender {
    client: AiClient,
}

impl LlmRecommender {
    pub fn new(client: AiClient) -> Self {
        Self { client }
    }
}

impl RecommendationGenerator for LlmRecommender {
    fn name(&self) -> String {
        format!("{}/{}", self.client.backend(), self.client.model())
    }

    fn generate(&self, request: &RecommendationRequest) -> AiResult<GeneratedRecommendations> {
        let prompt = RecommendationPromptBuilder::new(request).build();
        let response = self.client.generate(
            vec![Message::user(prompt)],
            Some(PromptTemplate::system_prompt()),
        )?;
        parse_recommendations(&response, request.tier())
    }
}

#[derive(Deserialize)]
struct RawRecommendations {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    recommendations: Vec<serde_json::Value>,
}

fn fenced_json() -> &'static Regex {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    // (?s) so the object may span lines
    FENCED.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"))
}

/// Pull a JSON object out of free-form model output
fn extract_json(response: &str) -> Option<&str> {
    if let Some(m) = fenced_json().captures(response).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

/// Parse model output into recommendations.
///
/// Requires at least three non-empty recommendations and keeps at most
/// four. A missing category takes the tier's fallback category.
pub fn parse_recommendations(response: &str, tier: CareTier) -> AiResult<GeneratedRecommendations> {
    let json = extract_json(response)
        .ok_or_else(|| AiError::ParseError("No JSON object in response".to_string()))?;

    let raw: RawRecommendations = serde_json::from_str(json)
        .map_err(|e| AiError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

    let recommendations: Vec<String> = raw
        .recommendations
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Object(obj) => obj
                .get("text")
                .or_else(|| obj.get("recommendation"))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .take(MAX_RECOMMENDATIONS)
        .collect();

    if recommendations.len() < MIN_RECOMMENDATIONS {
        return Err(AiError::ParseError(format!(
            "Expected at least {} recommendations, got {}",
            MIN_RECOMMENDATIONS,
            recommendations.len()
        )));
    }

    let category = raw
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| fallback_recommendations(tier).category);

    Ok(GeneratedRecommendations {
        category,
        recommendations,
    })
}

/// Never-failing recommendation service
#[derive(Clone, Default)]
pub struct Recommender {
    generator: Option<Arc<dyn RecommendationGenerator>>,
}

impl Recommender {
    pub fn new(generator: Arc<dyn RecommendationGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// A recommender that always serves the fallback table
    pub fn fallback_only() -> Self {
        Self { generator: None }
    }

    pub fn generator_name(&self) -> Option<String> {
        self.generator.as_ref().map(|g| g.name())
    }

    pub fn recommend(&self, request: &RecommendationRequest, now: DateTime<Utc>) -> RecommendationSet {
        let tier = request.tier();

        let Some(generator) = &self.generator else {
            debug!("No recommendation generator configured, using fallback");
            return Self::fallback(tier, now);
        };

        match generator.generate(request) {
            Ok(generated) => RecommendationSet {
                category: generated.category,
                recommendations: generated.recommendations,
                metadata: RecommendationMetadata {
                    source: RecommendationSource::AiGenerated,
                    generated_at: now,
                    model: Some(generator.name()),
                },
            },
            Err(e) => {
                warn!("Recommendation generation failed ({}), using fallback", e);
                Self::fallback(tier, now)
            }
        }
    }

    pub fn fallback(tier: CareTier, now: DateTime<Utc>) -> RecommendationSet {
        let generated = fallback_recommendations(tier);
        RecommendationSet {
            category: generated.category,
            recommendations: generated.recommendations,
            metadata: RecommendationMetadata {
                source: RecommendationSource::Fallback,
                generated_at: now,
                model: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Canned(AiResult<GeneratedRecommendations>);

    impl RecommendationGenerator for Canned {
        fn name(&self) -> String {
            "canned".to_string()
        }

        fn generate(&self, _request: &RecommendationRequest) -> AiResult<GeneratedRecommendations> {
            match &self.0 {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(AiError::ApiError {
                    status: 503,
                    message: e.to_string(),
                }),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
    }

    fn high() -> RecommendationRequest {
        RecommendationRequest {
            risk_level: Some("High".to_string()),
            risk_score: Some(80.0),
            patient_context: None,
        }
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!(CareTier::parse("HIGH"), CareTier::High);
        assert_eq!(CareTier::parse("medium"), CareTier::Medium);
        assert_eq!(CareTier::parse("Moderate"), CareTier::Medium);
        assert_eq!(CareTier::parse("low"), CareTier::Standard);
        assert_eq!(CareTier::parse(""), CareTier::Standard);
    }

    #[test]
    fn test_request_fields_are_lenient() {
        let req: RecommendationRequest =
            serde_json::from_str(r#"{"riskLevel": null, "riskScore": "80"}"#).unwrap();
        assert_eq!(req.risk_level(), "");
        assert_eq!(req.tier(), CareTier::Standard);
        assert_eq!(req.risk_score, Some(80.0));

        let req: RecommendationRequest =
            serde_json::from_str(r#"{"riskLevel": ["High"], "riskScore": {"value": 80}}"#).unwrap();
        assert!(req.risk_level.is_none());
        assert!(req.risk_score.is_none());

        let req: RecommendationRequest =
            serde_json::from_str(r#"{"riskLevel": "High", "riskScore": 72.5}"#).unwrap();
        assert_eq!(req.tier(), CareTier::High);
        assert_eq!(req.risk_score, Some(72.5));
    }

    #[test]
    fn test_fallback_table_sizes() {
        for tier in [CareTier::High, CareTier::Medium, CareTier::Standard] {
            let recs = fallback_recommendations(tier);
            assert!((3..=4).contains(&recs.recommendations.len()));
            assert!(!recs.category.is_empty());
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = r#"Here is the plan:
```json
{
  "category": "Cardiac follow-up",
  "recommendations": ["One", "Two", "Three", "Four", "Five"]
}
```
Hope this helps."#;
        let parsed = parse_recommendations(text, CareTier::High).unwrap();
        assert_eq!(parsed.category, "Cardiac follow-up");
        assert_eq!(parsed.recommendations, vec!["One", "Two", "Three", "Four"]);
    }

    #[test]
    fn test_parse_bare_json_and_object_items() {
        let text = r#"Sure! {"recommendations": [{"text": "A"}, "B", {"recommendation": "C"}, 7]}"#;
        let parsed = parse_recommendations(text, CareTier::Medium).unwrap();
        assert_eq!(parsed.recommendations, vec!["A", "B", "C"]);
        assert_eq!(parsed.category, "Moderate Risk - Structured Follow-up");
    }

    #[test]
    fn test_parse_rejects_short_or_missing_json() {
        assert!(parse_recommendations("no json here", CareTier::High).is_err());
        assert!(parse_recommendations(r#"{"recommendations": ["A", " "]}"#, CareTier::High).is_err());
        assert!(parse_recommendations("{not json}", CareTier::High).is_err());
    }

    #[test]
    fn test_recommender_uses_generator() {
        let generated = GeneratedRecommendations {
            category: "Plan".to_string(),
            recommendations: vec!["a".into(), "b".into(), "c".into()],
        };
        let recommender = Recommender::new(Arc::new(Canned(Ok(generated.clone()))));
        let set = recommender.recommend(&high(), now());
        assert_eq!(set.metadata.source, RecommendationSource::AiGenerated);
        assert_eq!(set.metadata.model.as_deref(), Some("canned"));
        assert_eq!(set.recommendations, generated.recommendations);
    }

    #[test]
    fn test_recommender_falls_back_on_error() {
        let recommender = Recommender::new(Arc::new(Canned(Err(AiError::ParseError(
            "garbage".to_string(),
        )))));
        let set = recommender.recommend(&high(), now());
        assert_eq!(set.metadata.source, RecommendationSource::Fallback);
        assert_eq!(set, Recommender::fallback(CareTier::High, now()));
    }

    #[test]
    fn test_recommender_without_generator() {
        let set = Recommender::fallback_only().recommend(&RecommendationRequest::default(), now());
        assert_eq!(set.metadata.source, RecommendationSource::Fallback);
        assert_eq!(set.category, "Low Risk - Standard Care");
    }

    #[test]
    fn test_source_serialization() {
        let set = Recommender::fallback(CareTier::Medium, now());
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["metadata"]["source"], "fallback");
        assert!(json["metadata"].get("model").is_none());
        assert_eq!(
            serde_json::to_value(RecommendationSource::AiGenerated).unwrap(),
            "ai-generated"
        );
    }
}
