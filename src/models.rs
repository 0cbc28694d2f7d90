//! Core data models for careline
//!
//! These models are used throughout the codebase for representing
//! risk assessments, patient records, and the tenant that owns them.
//! JSON field names are camelCase on the wire.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Disclaimer attached to every risk assessment.
pub const ASSESSMENT_NOTES: &str = "This is a simplified risk assessment for demonstration purposes. \
Clinical decisions should not be based solely on this score.";

/// Hospital tenant that owns a set of patient records.
///
/// Used as the key prefix in the patient store, so it may not be blank
/// and may not contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HospitalId(String);

impl HospitalId {
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HospitalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a timestamp the way clients actually send them: RFC 3339,
/// a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a bare date
/// (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
    }
}

/// `null` reads the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ==================== Clinical sub-records ====================

/// A prior hospital stay. The scorer only counts these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorVisit {
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub discharge_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistory {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub medications: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allergies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentVisit {
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attending_physician: Option<String>,
}

// ==================== Risk assessment ====================

/// Attributes the readmission scorer looks at. Every field is optional;
/// absent fields simply do not trigger their rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientAssessmentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub previous_hospitalizations: Vec<PriorVisit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub medical_history: MedicalHistory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_visit: Option<CurrentVisit>,
}

impl PatientAssessmentInput {
    pub fn prior_stay_count(&self) -> usize {
        self.previous_hospitalizations.len()
    }

    pub fn medication_count(&self) -> usize {
        self.medical_history.medications.len()
    }

    pub fn conditions(&self) -> &[String] {
        &self.medical_history.conditions
    }

    pub fn admission_date(&self) -> Option<DateTime<Utc>> {
        self.current_visit.as_ref().and_then(|v| v.admission_date)
    }
}

/// Coarse bucket of the numeric readmission score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// The textual label stored on a patient record for this tier.
    pub fn record_label(&self) -> RiskLabel {
        match self {
            RiskLevel::Low => RiskLabel::Low,
            RiskLevel::Moderate => RiskLabel::Medium,
            RiskLevel::High => RiskLabel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Moderate => write!(f, "Moderate"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

/// Output of the readmission scorer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessmentResult {
    /// Clamped score, 0..=100
    pub readmission_risk: u32,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub notes: String,
}

/// Structured risk result persisted on a patient record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSnapshot {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl RiskSnapshot {
    pub fn from_assessment(result: &RiskAssessmentResult, at: DateTime<Utc>) -> Self {
        Self {
            score: result.readmission_risk,
            level: result.risk_level,
            factors: result.factors.clone(),
            last_updated: at,
        }
    }
}

// ==================== Patient record ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(()),
        }
    }
}

/// Textual risk label on a patient record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl FromStr for RiskLabel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(RiskLabel::Low),
            "Medium" => Ok(RiskLabel::Medium),
            "High" => Ok(RiskLabel::High),
            "Unknown" => Ok(RiskLabel::Unknown),
            _ => Err(()),
        }
    }
}

/// A persisted patient record. Always owned by exactly one hospital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub hospital_id: HospitalId,
    /// Hospital-assigned identifier (MRN)
    pub patient_id: String,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub diagnosis: String,
    /// Days
    pub length_of_stay: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub medical_history: MedicalHistory,
    #[serde(default, deserialize_with = "null_as_default")]
    pub previous_hospitalizations: Vec<PriorVisit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_visit: Option<CurrentVisit>,
    #[serde(default)]
    pub risk_label: RiskLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readmission_risk: Option<RiskSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Scoring view of this record, so a stored patient can be assessed
    /// without the caller resending its history.
    pub fn assessment_input(&self) -> PatientAssessmentInput {
        PatientAssessmentInput {
            age: Some(self.age),
            previous_hospitalizations: self.previous_hospitalizations.clone(),
            medical_history: self.medical_history.clone(),
            current_visit: self.current_visit.clone(),
        }
    }

    /// Attach a fresh assessment and keep the textual label in step with it.
    pub fn record_assessment(&mut self, result: &RiskAssessmentResult, at: DateTime<Utc>) {
        self.readmission_risk = Some(RiskSnapshot::from_assessment(result, at));
        self.risk_label = result.risk_level.record_label();
        self.updated_at = at;
    }
}

/// Field-level validation failures, reported together
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.join(", "))]
pub struct ValidationErrors(pub Vec<String>);

/// Client-supplied patient fields for create and update.
///
/// Enumerations and numbers arrive loosely typed so that bad values
/// surface as validation messages instead of body-parse failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDraft {
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub diagnosis: Option<String>,
    pub length_of_stay: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub discharge_date: Option<DateTime<Utc>>,
    pub medical_history: Option<MedicalHistory>,
    pub previous_hospitalizations: Option<Vec<PriorVisit>>,
    pub current_visit: Option<CurrentVisit>,
    pub risk_label: Option<String>,
}

const MAX_AGE: i64 = 150;

#[derive(Default)]
struct Checks {
    errors: Vec<String>,
}

impl Checks {
    fn text(&mut self, value: Option<String>, label: &str, required: bool) -> Option<String> {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => Some(v),
            Some(_) => {
                self.errors.push(format!("{} is required", label));
                None
            }
            None => {
                if required {
                    self.errors.push(format!("{} is required", label));
                }
                None
            }
        }
    }

    fn bounded(&mut self, value: Option<i64>, label: &str, max: i64, required: bool) -> Option<u32> {
        match value {
            Some(v) if (0..=max).contains(&v) => Some(v as u32),
            Some(v) => {
                self.errors
                    .push(format!("{} must be between 0 and {} (got {})", label, max, v));
                None
            }
            None => {
                if required {
                    self.errors.push(format!("{} is required", label));
                }
                None
            }
        }
    }

    fn gender(&mut self, value: Option<String>, required: bool) -> Option<Gender> {
        match value {
            Some(raw) => match raw.trim().parse::<Gender>() {
                Ok(g) => Some(g),
                Err(()) => {
                    self.errors.push(format!(
                        "Gender must be one of male, female, other (got '{}')",
                        raw
                    ));
                    None
                }
            },
            None => {
                if required {
                    self.errors.push("Gender is required".to_string());
                }
                None
            }
        }
    }

    fn risk_label(&mut self, value: Option<String>) -> Option<RiskLabel> {
        let raw = value?;
        match raw.trim().parse::<RiskLabel>() {
            Ok(label) => Some(label),
            Err(()) => {
                self.errors.push(format!(
                    "Risk label must be one of Low, Medium, High, Unknown (got '{}')",
                    raw
                ));
                None
            }
        }
    }

    fn dates(&mut self, admission: Option<DateTime<Utc>>, discharge: Option<DateTime<Utc>>) {
        if let (Some(a), Some(d)) = (admission, discharge) {
            if d < a {
                self.errors
                    .push("Discharge date cannot be before admission date".to_string());
            }
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

impl PatientDraft {
    /// Build a new record for `hospital`, checking every required field.
    pub fn into_patient(
        self,
        hospital: &HospitalId,
        now: DateTime<Utc>,
    ) -> Result<Patient, ValidationErrors> {
        let mut checks = Checks::default();
        let patient_id = checks.text(self.patient_id, "Patient ID", true);
        let name = checks.text(self.name, "Name", true);
        let age = checks.bounded(self.age, "Age", MAX_AGE, true);
        let gender = checks.gender(self.gender, true);
        let diagnosis = checks.text(self.diagnosis, "Diagnosis", true);
        let length_of_stay = checks.bounded(self.length_of_stay, "Length of stay", i64::from(u32::MAX), true);
        let risk_label = checks.risk_label(self.risk_label);
        checks.dates(self.admission_date, self.discharge_date);
        checks.finish()?;

        // finish() succeeded, so every required field is Some.
        match (patient_id, name, age, gender, diagnosis, length_of_stay) {
            (Some(patient_id), Some(name), Some(age), Some(gender), Some(diagnosis), Some(length_of_stay)) => {
                Ok(Patient {
                    id: Uuid::new_v4(),
                    hospital_id: hospital.clone(),
                    patient_id,
                    name,
                    age,
                    gender,
                    diagnosis,
                    length_of_stay,
                    admission_date: self.admission_date,
                    discharge_date: self.discharge_date,
                    medical_history: self.medical_history.unwrap_or_default(),
                    previous_hospitalizations: self.previous_hospitalizations.unwrap_or_default(),
                    current_visit: self.current_visit,
                    risk_label: risk_label.unwrap_or_default(),
                    readmission_risk: None,
                    created_at: now,
                    updated_at: now,
                })
            }
            _ => Err(ValidationErrors(vec!["Missing required fields".to_string()])),
        }
    }

    /// Merge the supplied fields onto an existing record. Fields left out
    /// of the draft keep their current value; supplied fields are validated
    /// with the same rules as on create.
    pub fn apply_to(self, patient: &mut Patient, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut checks = Checks::default();
        let patient_id = checks.text(self.patient_id, "Patient ID", false);
        let name = checks.text(self.name, "Name", false);
        let age = checks.bounded(self.age, "Age", MAX_AGE, false);
        let gender = checks.gender(self.gender, false);
        let diagnosis = checks.text(self.diagnosis, "Diagnosis", false);
        let length_of_stay = checks.bounded(self.length_of_stay, "Length of stay", i64::from(u32::MAX), false);
        let risk_label = checks.risk_label(self.risk_label);
        checks.dates(
            self.admission_date.or(patient.admission_date),
            self.discharge_date.or(patient.discharge_date),
        );
        checks.finish()?;

        if let Some(v) = patient_id {
            patient.patient_id = v;
        }
        if let Some(v) = name {
            patient.name = v;
        }
        if let Some(v) = age {
            patient.age = v;
        }
        if let Some(v) = gender {
            patient.gender = v;
        }
        if let Some(v) = diagnosis {
            patient.diagnosis = v;
        }
        if let Some(v) = length_of_stay {
            patient.length_of_stay = v;
        }
        if let Some(v) = risk_label {
            patient.risk_label = v;
        }
        if self.admission_date.is_some() {
            patient.admission_date = self.admission_date;
        }
        if self.discharge_date.is_some() {
            patient.discharge_date = self.discharge_date;
        }
        if let Some(v) = self.medical_history {
            patient.medical_history = v;
        }
        if let Some(v) = self.previous_hospitalizations {
            patient.previous_hospitalizations = v;
        }
        if self.current_visit.is_some() {
            patient.current_visit = self.current_visit;
        }
        patient.updated_at = now;
        Ok(())
    }
}
