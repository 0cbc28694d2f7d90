//! Readmission Risk Scoring
//!
//! Turns a patient's clinical and administrative attributes into a bounded
//! score, a coarse tier, and the list of rules that contributed.
//!
//! # Scoring Formula
//!
//! ```text
//! readmissionRisk = min(Σ weight(rule) for every fired rule, 100)
//!
//! Tier:
//!   score <  30  → Low
//!   score <  60  → Moderate
//!   score >= 60  → High
//! ```
//!
//! # Rules
//!
//! Rules are data, evaluated in table order. Rules sharing an exclusive
//! group fire at most once per group: the first match wins and later
//! members are shadowed. Everything else is independent.
//!
//! | Rule | Weight | Group |
//! |---|---|---|
//! | Age over 65 | +20 | age |
//! | Age over 50 | +10 | age |
//! | Multiple previous hospitalizations (>2) | +25 | history |
//! | Prior hospitalization (>0) | +15 | history |
//! | Diabetes | +15 | |
//! | Heart condition | +20 | |
//! | Hypertension | +10 | |
//! | Respiratory condition | +15 | |
//! | Multiple medications (>5) | +15 | |
//! | Extended hospital stay (>7 days) | +10 | |
//!
//! The highest reachable sum is 130 (one rule per group), which clamps to 100.
//!
//! # Example
//!
//! A 70 year old with type 2 diabetes and one prior stay:
//! 20 (age) + 15 (prior stay) + 15 (diabetes) = 50 → Moderate

mod rules;
mod scorer;

pub use rules::{default_rules, RiskRule, RuleOutcome, RulePredicate, RuleSetError, RuleStatus};
pub use scorer::{RiskScorer, TierThresholds, DEFAULT_MAX_SCORE};
