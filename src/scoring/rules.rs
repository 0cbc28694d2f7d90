//! Declarative readmission rules
//!
//! Each rule is `(predicate, weight, label, exclusive group)`. The same
//! shape is used for the built-in table and for tables loaded from
//! `careline.toml`:
//!
//! ```toml
//! [[scoring.rules]]
//! id = "heart"
//! label = "Heart condition"
//! weight = 20
//! when = { condition_mentions = ["heart", "cardiac"] }
//! ```

use crate::models::PatientAssessmentInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// What a rule checks on the assessment input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePredicate {
    /// Age present and strictly greater than the limit
    AgeOver(u32),
    /// More than N prior hospital stays
    PriorStaysOver(usize),
    /// Any condition contains any keyword (case-insensitive substring)
    ConditionMentions(Vec<String>),
    /// More than N medications
    MedicationsOver(usize),
    /// Admission date present and whole days since admission strictly above N
    StayLongerThanDays(i64),
}

impl RulePredicate {
    pub fn matches(&self, input: &PatientAssessmentInput, now: DateTime<Utc>) -> bool {
        match self {
            RulePredicate::AgeOver(limit) => input.age.is_some_and(|age| age > *limit),
            RulePredicate::PriorStaysOver(n) => input.prior_stay_count() > *n,
            RulePredicate::ConditionMentions(keywords) => input.conditions().iter().any(|c| {
                let condition = c.to_lowercase();
                keywords.iter().any(|k| condition.contains(k.as_str()))
            }),
            RulePredicate::MedicationsOver(n) => input.medication_count() > *n,
            // num_days() truncates, which floors any positive elapsed time
            RulePredicate::StayLongerThanDays(days) => input
                .admission_date()
                .is_some_and(|admitted| (now - admitted).num_days() > *days),
        }
    }

    /// Keyword matching compares against lowercased conditions, so the
    /// keywords themselves are stored lowercased.
    fn normalized(self) -> Self {
        match self {
            RulePredicate::ConditionMentions(keywords) => RulePredicate::ConditionMentions(
                keywords.into_iter().map(|k| k.trim().to_lowercase()).collect(),
            ),
            other => other,
        }
    }

    /// Human-readable condition, used by `careline rules`
    pub fn describe(&self) -> String {
        match self {
            RulePredicate::AgeOver(n) => format!("age > {}", n),
            RulePredicate::PriorStaysOver(n) => format!("previous hospitalizations > {}", n),
            RulePredicate::ConditionMentions(keywords) => {
                format!("condition mentions {}", keywords.join(" | "))
            }
            RulePredicate::MedicationsOver(n) => format!("medications > {}", n),
            RulePredicate::StayLongerThanDays(n) => format!("days since admission > {}", n),
        }
    }
}

/// One scoring rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRule {
    pub id: String,
    /// Factor text reported when the rule fires
    pub label: String,
    pub weight: u32,
    /// Rules sharing a group fire at most once, first match in table order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub when: RulePredicate,
}

impl RiskRule {
    pub fn new(id: &str, label: &str, weight: u32, when: RulePredicate) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            weight,
            group: None,
            when,
        }
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }
}

/// The built-in readmission rule table
pub fn default_rules() -> Vec<RiskRule> {
    use RulePredicate::*;

    let keywords = |words: &[&str]| ConditionMentions(words.iter().map(|w| w.to_string()).collect());

    vec![
        RiskRule::new("age-over-65", "Age over 65", 20, AgeOver(65)).in_group("age"),
        RiskRule::new("age-over-50", "Age over 50", 10, AgeOver(50)).in_group("age"),
        RiskRule::new(
            "multiple-hospitalizations",
            "Multiple previous hospitalizations",
            25,
            PriorStaysOver(2),
        )
        .in_group("history"),
        RiskRule::new("prior-hospitalization", "Prior hospitalization", 15, PriorStaysOver(0))
            .in_group("history"),
        RiskRule::new("diabetes", "Diabetes", 15, keywords(&["diabet"])),
        RiskRule::new("heart", "Heart condition", 20, keywords(&["heart", "cardiac"])),
        RiskRule::new(
            "hypertension",
            "Hypertension",
            10,
            keywords(&["hypertension", "blood pressure"]),
        ),
        RiskRule::new(
            "respiratory",
            "Respiratory condition",
            15,
            keywords(&["respiratory", "copd", "asthma"]),
        ),
        RiskRule::new("polypharmacy", "Multiple medications (>5)", 15, MedicationsOver(5)),
        RiskRule::new(
            "extended-stay",
            "Extended hospital stay (>7 days)",
            10,
            StayLongerThanDays(7),
        ),
    ]
}

/// Problems with a configured rule table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    #[error("rule table is empty")]
    Empty,

    #[error("rule #{index} has an empty id")]
    MissingId { index: usize },

    #[error("rule '{id}' has an empty label")]
    MissingLabel { id: String },

    #[error("rule id '{id}' is used more than once")]
    DuplicateId { id: String },

    #[error("rule '{id}' has no usable condition keywords")]
    EmptyKeywords { id: String },

    #[error("max score must be between 1 and 100 (got {max_score})")]
    MaxScore { max_score: u32 },

    #[error("tier thresholds must satisfy 0 < moderate ({moderate}) < high ({high}) <= max score ({max_score})")]
    Thresholds {
        moderate: u32,
        high: u32,
        max_score: u32,
    },
}

/// Check a rule table and return it with keywords normalized
pub(crate) fn validate_rules(rules: Vec<RiskRule>) -> Result<Vec<RiskRule>, RuleSetError> {
    if rules.is_empty() {
        return Err(RuleSetError::Empty);
    }

    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(rules.len());

    for (index, mut rule) in rules.into_iter().enumerate() {
        rule.id = rule.id.trim().to_string();
        if rule.id.is_empty() {
            return Err(RuleSetError::MissingId { index: index + 1 });
        }
        if rule.label.trim().is_empty() {
            return Err(RuleSetError::MissingLabel { id: rule.id });
        }
        if !seen.insert(rule.id.clone()) {
            return Err(RuleSetError::DuplicateId { id: rule.id });
        }

        rule.when = rule.when.normalized();
        if let RulePredicate::ConditionMentions(keywords) = &rule.when {
            if keywords.is_empty() || keywords.iter().any(|k| k.is_empty()) {
                return Err(RuleSetError::EmptyKeywords { id: rule.id });
            }
        }
        checked.push(rule);
    }

    Ok(checked)
}

/// Whether a rule contributed to a particular assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Fired,
    /// Matched, but an earlier rule in the same group already fired
    Shadowed,
    Skipped,
}

/// Per-rule trace of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub id: String,
    pub label: String,
    pub weight: u32,
    pub status: RuleStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CurrentVisit, MedicalHistory, PriorVisit};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
    }

    fn with_conditions(conditions: &[&str]) -> PatientAssessmentInput {
        PatientAssessmentInput {
            medical_history: MedicalHistory {
                conditions: conditions.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_table_shape() {
        let rules = default_rules();
        assert_eq!(rules.len(), 10);
        let total: u32 = rules.iter().map(|r| r.weight).sum();
        // 10 of those points are shadowed by the age group and 15 by history
        assert_eq!(total, 155);
        assert!(validate_rules(rules).is_ok());
    }

    #[test]
    fn test_age_is_strictly_greater() {
        let p = RulePredicate::AgeOver(65);
        let at = |age| PatientAssessmentInput {
            age: Some(age),
            ..Default::default()
        };
        assert!(!p.matches(&at(65), now()));
        assert!(p.matches(&at(66), now()));
        assert!(!p.matches(&PatientAssessmentInput::default(), now()));
    }

    #[test]
    fn test_condition_keywords_are_case_insensitive_substrings() {
        let p = RulePredicate::ConditionMentions(vec!["COPD".to_string()]).normalized();
        assert!(p.matches(&with_conditions(&["Severe copd exacerbation"]), now()));
        assert!(!p.matches(&with_conditions(&["Pneumonia"]), now()));
        assert!(!p.matches(&with_conditions(&[]), now()));

        let bp = RulePredicate::ConditionMentions(vec!["blood pressure".to_string()]);
        assert!(bp.matches(&with_conditions(&["High Blood Pressure"]), now()));
    }

    #[test]
    fn test_prior_stays_and_medications_count_length() {
        let input = PatientAssessmentInput {
            previous_hospitalizations: vec![PriorVisit::default(); 3],
            medical_history: MedicalHistory {
                medications: vec!["x".to_string(); 6],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(RulePredicate::PriorStaysOver(2).matches(&input, now()));
        assert!(!RulePredicate::PriorStaysOver(3).matches(&input, now()));
        assert!(RulePredicate::MedicationsOver(5).matches(&input, now()));
        assert!(!RulePredicate::MedicationsOver(6).matches(&input, now()));
    }

    #[test]
    fn test_stay_length_floors_to_whole_days() {
        let admitted = |offset: Duration| PatientAssessmentInput {
            current_visit: Some(CurrentVisit {
                admission_date: Some(now() - offset),
                ..Default::default()
            }),
            ..Default::default()
        };
        let p = RulePredicate::StayLongerThanDays(7);
        assert!(!p.matches(&admitted(Duration::days(7)), now()));
        assert!(!p.matches(&admitted(Duration::days(8) - Duration::seconds(1)), now()));
        assert!(p.matches(&admitted(Duration::days(8)), now()));
        // Admission in the future never counts
        assert!(!p.matches(&admitted(Duration::days(-30)), now()));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_blanks() {
        let mut rules = default_rules();
        rules.push(RiskRule::new("diabetes", "Again", 1, RulePredicate::AgeOver(1)));
        assert_eq!(
            validate_rules(rules),
            Err(RuleSetError::DuplicateId {
                id: "diabetes".to_string()
            })
        );

        let blank_label = vec![RiskRule::new("a", " ", 1, RulePredicate::AgeOver(1))];
        assert!(matches!(
            validate_rules(blank_label),
            Err(RuleSetError::MissingLabel { .. })
        ));

        let blank_id = vec![RiskRule::new("", "x", 1, RulePredicate::AgeOver(1))];
        assert_eq!(
            validate_rules(blank_id),
            Err(RuleSetError::MissingId { index: 1 })
        );

        let no_keywords = vec![RiskRule::new(
            "k",
            "x",
            1,
            RulePredicate::ConditionMentions(vec!["  ".to_string()]),
        )];
        assert!(matches!(
            validate_rules(no_keywords),
            Err(RuleSetError::EmptyKeywords { .. })
        ));

        assert_eq!(validate_rules(vec![]), Err(RuleSetError::Empty));
    }

    #[test]
    fn test_rule_table_from_toml() {
        #[derive(Deserialize)]
        struct Table {
            rules: Vec<RiskRule>,
        }
        let table: Table = toml::from_str(
            r#"
[[rules]]
id = "elderly"
label = "Age over 80"
weight = 30
group = "age"
when = { age_over = 80 }

[[rules]]
id = "kidney"
label = "Kidney disease"
weight = 15
when = { condition_mentions = ["Renal", "kidney"] }
"#,
        )
        .unwrap();
        let rules = validate_rules(table.rules).unwrap();
        assert_eq!(rules[0].when, RulePredicate::AgeOver(80));
        assert_eq!(rules[0].group.as_deref(), Some("age"));
        assert_eq!(
            rules[1].when,
            RulePredicate::ConditionMentions(vec!["renal".to_string(), "kidney".to_string()])
        );
    }
}
