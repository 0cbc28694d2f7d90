//! `score` and `rules` command handlers

use crate::config::ServiceConfig;
use crate::models::{parse_timestamp, PatientAssessmentInput, RiskAssessmentResult, RiskLevel};
use crate::scoring::{RiskScorer, RuleOutcome, RuleStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use std::io::Read;
use std::path::Path;

/// Score one assessment input read from `file` or stdin
pub fn run(
    config: &ServiceConfig,
    file: Option<&Path>,
    now: Option<&str>,
    format: &str,
    explain: bool,
) -> Result<()> {
    let scorer = config
        .scoring
        .scorer()
        .context("Invalid [scoring] configuration")?;
    let now = match now {
        Some(raw) => parse_timestamp(raw)
            .with_context(|| format!("Invalid --now '{}' (expected RFC 3339)", raw))?,
        None => Utc::now(),
    };

    let input = read_input(file)?;
    let result = scorer.score(&input, now);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_result(&result);
    if explain {
        print_outcomes(&scorer.explain(&input, now));
    }
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<PatientAssessmentInput> {
    let (content, source) = match file {
        Some(path) if path != Path::new("-") => (
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            path.display().to_string(),
        ),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            (buf, "stdin".to_string())
        }
    };
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid assessment input in {}", source))
}

fn styled_level(level: RiskLevel) -> console::StyledObject<String> {
    let text = level.to_string();
    match level {
        RiskLevel::High => style(text).red().bold(),
        RiskLevel::Moderate => style(text).yellow().bold(),
        RiskLevel::Low => style(text).green().bold(),
    }
}

fn print_result(result: &RiskAssessmentResult) {
    println!("\n{}", style("Readmission Risk").bold());
    println!("{}", style("──────────────────────────────────────").dim());
    println!(
        "  Score: {}  {}",
        style(format!("{}/100", result.readmission_risk)).bold(),
        styled_level(result.risk_level)
    );

    if result.factors.is_empty() {
        println!("\n  No risk factors identified");
    } else {
        println!("\n  {}", style("Factors").bold());
        for factor in &result.factors {
            println!("  • {}", factor);
        }
    }
    println!("\n  {}", style(&result.notes).dim());
}

fn print_outcomes(outcomes: &[RuleOutcome]) {
    println!("\n  {}", style("Rules").bold());
    for outcome in outcomes {
        let (marker, weight) = match outcome.status {
            RuleStatus::Fired => (style("✓").green(), style(format!("+{:>3}", outcome.weight)).green()),
            RuleStatus::Shadowed => (style("~").yellow(), style(format!("({:>3})", outcome.weight)).dim()),
            RuleStatus::Skipped => (style("·").dim(), style(format!(" {:>3}", outcome.weight)).dim()),
        };
        println!("  {} {}  {:<28} {}", marker, weight, outcome.id, outcome.label);
    }
}

/// Print the rule table the service would score with
pub fn print_rules(config: &ServiceConfig, format: &str) -> Result<()> {
    let scorer = config
        .scoring
        .scorer()
        .context("Invalid [scoring] configuration")?;

    if format == "json" {
        let table = serde_json::json!({
            "tiers": scorer.tiers(),
            "maxScore": scorer.max_score(),
            "rules": scorer.rules(),
        });
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    print_rule_table(&scorer);
    Ok(())
}

fn print_rule_table(scorer: &RiskScorer) {
    let tiers = scorer.tiers();
    println!("\n{}", style("Scoring Rules").bold());
    println!("{}", style("──────────────────────────────────────").dim());
    for rule in scorer.rules() {
        let group = rule
            .group
            .as_deref()
            .map(|g| format!(" [{}]", g))
            .unwrap_or_default();
        println!(
            "  {:>3}  {:<28} {}{}",
            style(rule.weight).bold(),
            rule.id,
            rule.when.describe(),
            style(group).dim()
        );
    }
    println!(
        "\n  Tiers: Low < {} ≤ Moderate < {} ≤ High (max {})",
        tiers.moderate,
        tiers.high,
        scorer.max_score()
    );
}
