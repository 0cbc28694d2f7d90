//! Rule-table evaluator
//!
//! Pure and synchronous: the result depends only on the rule table, the
//! input and the `now` passed in, so one scorer is shared across requests.

use super::rules::{default_rules, validate_rules, RiskRule, RuleOutcome, RuleSetError, RuleStatus};
use crate::models::{PatientAssessmentInput, RiskAssessmentResult, RiskLevel, ASSESSMENT_NOTES};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Upper bound of the readmission score
pub const DEFAULT_MAX_SCORE: u32 = 100;

/// Score boundaries between tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierThresholds {
    /// Lowest Moderate score
    pub moderate: u32,
    /// Lowest High score
    pub high: u32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            moderate: 30,
            high: 60,
        }
    }
}

impl TierThresholds {
    pub fn level(&self, score: u32) -> RiskLevel {
        if score >= self.high {
            RiskLevel::High
        } else if score >= self.moderate {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

/// Readmission risk scorer over a validated rule table
#[derive(Debug, Clone)]
pub struct RiskScorer {
    rules: Vec<RiskRule>,
    tiers: TierThresholds,
    max_score: u32,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::standard()
    }
}

impl RiskScorer {
    /// Build a scorer from a custom table
    pub fn new(
        rules: Vec<RiskRule>,
        tiers: TierThresholds,
        max_score: u32,
    ) -> Result<Self, RuleSetError> {
        if max_score == 0 || max_score > DEFAULT_MAX_SCORE {
            return Err(RuleSetError::MaxScore { max_score });
        }
        if tiers.moderate == 0 || tiers.moderate >= tiers.high || tiers.high > max_score {
            return Err(RuleSetError::Thresholds {
                moderate: tiers.moderate,
                high: tiers.high,
                max_score,
            });
        }
        Ok(Self {
            rules: validate_rules(rules)?,
            tiers,
            max_score,
        })
    }

    /// The built-in rule table with 30/60 tiers
    pub fn standard() -> Self {
        Self {
            rules: default_rules(),
            tiers: TierThresholds::default(),
            max_score: DEFAULT_MAX_SCORE,
        }
    }

    pub fn rules(&self) -> &[RiskRule] {
        &self.rules
    }

    pub fn tiers(&self) -> TierThresholds {
        self.tiers
    }

    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    /// Evaluate every rule in order and report what each one did
    pub fn explain(&self, input: &PatientAssessmentInput, now: DateTime<Utc>) -> Vec<RuleOutcome> {
        let mut fired_groups: HashSet<&str> = HashSet::new();

        self.rules
            .iter()
            .map(|rule| {
                let status = if !rule.when.matches(input, now) {
                    RuleStatus::Skipped
                } else {
                    match rule.group.as_deref() {
                        Some(group) if !fired_groups.insert(group) => RuleStatus::Shadowed,
                        _ => RuleStatus::Fired,
                    }
                };
                RuleOutcome {
                    id: rule.id.clone(),
                    label: rule.label.clone(),
                    weight: rule.weight,
                    status,
                }
            })
            .collect()
    }

    /// Score an assessment input as of `now`
    pub fn score(&self, input: &PatientAssessmentInput, now: DateTime<Utc>) -> RiskAssessmentResult {
        let mut total: u32 = 0;
        let mut factors: Vec<String> = Vec::new();

        for outcome in self.explain(input, now) {
            if outcome.status != RuleStatus::Fired {
                continue;
            }
            total = total.saturating_add(outcome.weight);
            if !factors.contains(&outcome.label) {
                factors.push(outcome.label);
            }
        }

        let score = total.min(self.max_score);

        RiskAssessmentResult {
            readmission_risk: score,
            risk_level: self.tiers.level(score),
            factors,
            notes: ASSESSMENT_NOTES.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CurrentVisit, MedicalHistory, PriorVisit};
    use crate::scoring::RulePredicate;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
    }

    fn aged(age: u32) -> PatientAssessmentInput {
        PatientAssessmentInput {
            age: Some(age),
            ..Default::default()
        }
    }

    fn stays(n: usize) -> PatientAssessmentInput {
        PatientAssessmentInput {
            previous_hospitalizations: vec![PriorVisit::default(); n],
            ..Default::default()
        }
    }

    fn admitted_days_ago(days: i64) -> PatientAssessmentInput {
        PatientAssessmentInput {
            current_visit: Some(CurrentVisit {
                admission_date: Some(now() - Duration::days(days)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn everything() -> PatientAssessmentInput {
        PatientAssessmentInput {
            age: Some(82),
            previous_hospitalizations: vec![PriorVisit::default(); 4],
            medical_history: MedicalHistory {
                conditions: vec![
                    "Diabetes mellitus".to_string(),
                    "Heart failure".to_string(),
                    "Hypertension".to_string(),
                    "COPD".to_string(),
                ],
                medications: (0..7).map(|i| format!("med-{}", i)).collect(),
                allergies: vec![],
            },
            current_visit: Some(CurrentVisit {
                admission_date: Some(now() - Duration::days(8)),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_empty_input() {
        let result = RiskScorer::standard().score(&PatientAssessmentInput::default(), now());
        assert_eq!(result.readmission_risk, 0);
        assert!(result.factors.is_empty());
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.notes, ASSESSMENT_NOTES);
    }

    #[test]
    fn test_age_bands() {
        let scorer = RiskScorer::standard();

        let old = scorer.score(&aged(70), now());
        assert_eq!(old.readmission_risk, 20);
        assert_eq!(old.factors, vec!["Age over 65"]);

        let middle = scorer.score(&aged(55), now());
        assert_eq!(middle.readmission_risk, 10);
        assert_eq!(middle.factors, vec!["Age over 50"]);

        let young = scorer.score(&aged(40), now());
        assert_eq!(young.readmission_risk, 0);
        assert!(young.factors.is_empty());
    }

    #[test]
    fn test_hospitalization_bands() {
        let scorer = RiskScorer::standard();

        let many = scorer.score(&stays(3), now());
        assert_eq!(many.readmission_risk, 25);
        assert_eq!(many.factors, vec!["Multiple previous hospitalizations"]);

        let one = scorer.score(&stays(1), now());
        assert_eq!(one.readmission_risk, 15);
        assert_eq!(one.factors, vec!["Prior hospitalization"]);

        let two = scorer.score(&stays(2), now());
        assert_eq!(two.readmission_risk, 15);
    }

    #[test]
    fn test_conditions_fire_independently() {
        let input = PatientAssessmentInput {
            medical_history: MedicalHistory {
                conditions: vec!["Type 2 Diabetes".to_string(), "Cardiac arrhythmia".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let result = RiskScorer::standard().score(&input, now());
        assert_eq!(result.readmission_risk, 35);
        assert_eq!(result.factors, vec!["Diabetes", "Heart condition"]);
        assert_eq!(result.risk_level, RiskLevel::Moderate);
    }

    #[test]
    fn test_one_condition_matching_two_keywords_counts_once() {
        let input = PatientAssessmentInput {
            medical_history: MedicalHistory {
                conditions: vec!["Heart disease".to_string(), "cardiac arrest".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let result = RiskScorer::standard().score(&input, now());
        assert_eq!(result.readmission_risk, 20);
        assert_eq!(result.factors, vec!["Heart condition"]);
    }

    #[test]
    fn test_medication_boundary() {
        let scorer = RiskScorer::standard();
        let meds = |n: usize| PatientAssessmentInput {
            medical_history: MedicalHistory {
                medications: vec!["m".to_string(); n],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(scorer.score(&meds(5), now()).readmission_risk, 0);
        let six = scorer.score(&meds(6), now());
        assert_eq!(six.readmission_risk, 15);
        assert_eq!(six.factors, vec!["Multiple medications (>5)"]);
    }

    #[test]
    fn test_extended_stay_boundary() {
        let scorer = RiskScorer::standard();
        let eight = scorer.score(&admitted_days_ago(8), now());
        assert!(eight
            .factors
            .contains(&"Extended hospital stay (>7 days)".to_string()));
        let seven = scorer.score(&admitted_days_ago(7), now());
        assert!(seven.factors.is_empty());
    }

    #[test]
    fn test_everything_clamps_to_max() {
        let scorer = RiskScorer::standard();
        let input = everything();
        let raw: u32 = scorer
            .explain(&input, now())
            .iter()
            .filter(|o| o.status == RuleStatus::Fired)
            .map(|o| o.weight)
            .sum();
        assert_eq!(raw, 130);

        let result = scorer.score(&input, now());
        assert_eq!(result.readmission_risk, 100);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(
            result.factors,
            vec![
                "Age over 65",
                "Multiple previous hospitalizations",
                "Diabetes",
                "Heart condition",
                "Hypertension",
                "Respiratory condition",
                "Multiple medications (>5)",
                "Extended hospital stay (>7 days)",
            ]
        );
    }

    #[test]
    fn test_explain_marks_shadowed_group_members() {
        let outcomes = RiskScorer::standard().explain(&aged(70), now());
        assert_eq!(outcomes[0].status, RuleStatus::Fired);
        assert_eq!(outcomes[1].status, RuleStatus::Shadowed);
        assert!(outcomes[2..].iter().all(|o| o.status == RuleStatus::Skipped));
    }

    #[test]
    fn test_same_input_same_now_is_idempotent() {
        let scorer = RiskScorer::standard();
        let input = everything();
        assert_eq!(scorer.score(&input, now()), scorer.score(&input, now()));
    }

    #[test]
    fn test_tier_boundaries() {
        let tiers = TierThresholds::default();
        assert_eq!(tiers.level(0), RiskLevel::Low);
        assert_eq!(tiers.level(29), RiskLevel::Low);
        assert_eq!(tiers.level(30), RiskLevel::Moderate);
        assert_eq!(tiers.level(59), RiskLevel::Moderate);
        assert_eq!(tiers.level(60), RiskLevel::High);
        assert_eq!(tiers.level(100), RiskLevel::High);
    }

    #[test]
    fn test_custom_table_and_thresholds() {
        let rules = vec![
            RiskRule::new("renal", "Kidney disease", 40, RulePredicate::ConditionMentions(vec!["Renal".to_string()])),
            RiskRule::new("old", "Age over 80", 30, RulePredicate::AgeOver(80)),
        ];
        let scorer = RiskScorer::new(rules, TierThresholds { moderate: 20, high: 50 }, 60).unwrap();
        let input = PatientAssessmentInput {
            age: Some(85),
            medical_history: MedicalHistory {
                conditions: vec!["chronic renal failure".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let result = scorer.score(&input, now());
        assert_eq!(result.readmission_risk, 60);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.factors, vec!["Kidney disease", "Age over 80"]);
    }

    #[test]
    fn test_duplicate_labels_reported_once() {
        let rules = vec![
            RiskRule::new("a", "Frail", 5, RulePredicate::AgeOver(70)),
            RiskRule::new("b", "Frail", 5, RulePredicate::MedicationsOver(0)),
        ];
        let scorer = RiskScorer::new(rules, TierThresholds::default(), 100).unwrap();
        let input = PatientAssessmentInput {
            age: Some(75),
            medical_history: MedicalHistory {
                medications: vec!["m".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let result = scorer.score(&input, now());
        assert_eq!(result.readmission_risk, 10);
        assert_eq!(result.factors, vec!["Frail"]);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        for (moderate, high, max) in [(0, 60, 100), (60, 60, 100), (30, 120, 100)] {
            let err = RiskScorer::new(default_rules(), TierThresholds { moderate, high }, max);
            assert!(matches!(err, Err(RuleSetError::Thresholds { .. })));
        }
    }

    #[test]
    fn test_max_score_above_100_rejected() {
        for max in [0, 101, 150] {
            let err = RiskScorer::new(default_rules(), TierThresholds::default(), max);
            assert_eq!(err.unwrap_err(), RuleSetError::MaxScore { max_score: max });
        }
        assert!(RiskScorer::new(default_rules(), TierThresholds::default(), 100).is_ok());
    }
}
