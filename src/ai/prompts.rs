//! Prompt templates for care recommendation generation
//!
//! Contains the system prompt and a builder for the per-request prompt.

use crate::ai::recommendations::{CareTier, RecommendationRequest};

/// Longest patient context passed to the model, in bytes
const MAX_CONTEXT_LEN: usize = 2000;

/// System prompts
pub struct PromptTemplate;

impl PromptTemplate {
    pub fn system_prompt() -> &'static str {
        "You are an experienced hospital discharge-planning nurse. You write short, \
         concrete, actionable care recommendations aimed at preventing avoidable \
         30-day readmissions. You never diagnose, never prescribe specific drugs or \
         doses, and you always answer with JSON only."
    }

    /// Tier-specific emphasis for the recommendations
    pub fn tier_guidance(tier: CareTier) -> &'static str {
        match tier {
            CareTier::High => {
                "Focus on intensive transitional care: early follow-up, home support, \
                 medication reconciliation and close monitoring."
            }
            CareTier::Medium => {
                "Focus on structured follow-up: timely appointments, post-discharge \
                 contact and medication review."
            }
            CareTier::Standard => {
                "Focus on routine discharge care: standard follow-up, clear instructions \
                 and self-management education."
            }
        }
    }
}

/// Builder for recommendation prompts
pub struct RecommendationPromptBuilder<'a> {
    request: &'a RecommendationRequest,
}

impl<'a> RecommendationPromptBuilder<'a> {
    pub fn new(request: &'a RecommendationRequest) -> Self {
        Self { request }
    }

    pub fn build(self) -> String {
        let tier = self.request.tier();
        let score = self
            .request
            .risk_score
            .map(|s| format!("{:.0}/100", s))
            .unwrap_or_else(|| "not provided".to_string());

        let context_section = self
            .request
            .patient_context
            .as_ref()
            .filter(|ctx| !ctx.is_null())
            .map(|ctx| {
                let rendered = serde_json::to_string_pretty(ctx).unwrap_or_default();
                format!("\n## Patient Context\n{}\n", sanitize_text(&rendered))
            })
            .unwrap_or_default();

        format!(
            r#"# Readmission Care Plan

## Risk
- **Risk level**: {level}
- **Risk score**: {score}

## Guidance
{guidance}
{context_section}
## Task
Write 3 or 4 care recommendations, each a single sentence of at most 25 words.
Respond with JSON only, in exactly this shape:

{{
    "category": "Short label for this care plan (max 60 chars)",
    "recommendations": ["First recommendation", "Second recommendation", "Third recommendation"]
}}"#,
            level = sanitize_text(self.request.risk_level()),
            score = score,
            guidance = PromptTemplate::tier_guidance(tier),
            context_section = context_section,
        )
    }
}

/// Sanitize free text to prevent prompt injection
fn sanitize_text(text: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static INJECTION_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

    fn get_injection_patterns() -> &'static Vec<Regex> {
        INJECTION_PATTERNS.get_or_init(|| {
            vec![
                Regex::new(r"(?i)ignore\s+(all\s+)?previous\s+instructions?").expect("valid regex"),
                Regex::new(r"(?i)disregard\s+(all\s+)?previous").expect("valid regex"),
                Regex::new(r"(?i)forget\s+(all\s+)?previous").expect("valid regex"),
                Regex::new(r"(?i)<\s*/?\s*system\s*>").expect("valid regex"),
                Regex::new(r"(?i)reveal\s+(your\s+)?(api\s*key|secret|password|credential|prompt)")
                    .expect("valid regex"),
            ]
        })
    }

    let mut result = text.to_string();
    for pattern in get_injection_patterns().iter() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    if result.len() > MAX_CONTEXT_LEN {
        let mut cut = MAX_CONTEXT_LEN;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
        result.push_str("... [truncated]");
    }

    result
}
