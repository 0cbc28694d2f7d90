//! Tenant-scoped patient storage on redb
//!
//! Every record lives under the key `"{hospitalId}/{uuid}"` in a single
//! table, serialized as JSON. Callers never touch keys directly: all CRUD goes
//! through [`TenantPatients`], obtained from [`PatientStore::tenant`], so a
//! lookup can only ever see its own hospital's records.

use crate::models::{HospitalId, Patient, PatientDraft, RiskAssessmentResult, ValidationErrors};
use chrono::{DateTime, Utc};
use redb::{ReadableTable, TableDefinition};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// redb table definitions
const PATIENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("patients");

/// Errors from the patient store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Corrupt patient record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode patient record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationErrors> for StoreError {
    fn from(e: ValidationErrors) -> Self {
        StoreError::Validation(e.0)
    }
}

macro_rules! redb_error {
    ($($ty:ty),*) => {
        $(impl From<$ty> for StoreError {
            fn from(e: $ty) -> Self {
                StoreError::Database(e.into())
            }
        })*
    };
}

redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);

pub type StoreResult<T> = Result<T, StoreError>;

/// Patient database handle. Cheap to share behind an `Arc`; redb serializes
/// writers internally.
pub struct PatientStore {
    db: redb::Database,
}

impl PatientStore {
    /// Create or open a store at the given file path
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Opening patient store at {}", path.display());
        let db = redb::Database::create(path)?;
        Self::with_database(db)
    }

    /// Non-persistent store, for tests and dry runs
    pub fn in_memory() -> StoreResult<Self> {
        let db = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::with_database(db)
    }

    fn with_database(db: redb::Database) -> StoreResult<Self> {
        // Create the table up front so readers never see TableDoesNotExist
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(PATIENTS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Records belonging to one hospital
    pub fn tenant(&self, hospital: HospitalId) -> TenantPatients<'_> {
        TenantPatients {
            db: &self.db,
            hospital,
        }
    }
}

/// CRUD view over a single hospital's records
pub struct TenantPatients<'a> {
    db: &'a redb::Database,
    hospital: HospitalId,
}

impl TenantPatients<'_> {
    pub fn hospital(&self) -> &HospitalId {
        &self.hospital
    }

    fn key(&self, id: Uuid) -> String {
        format!("{}/{}", self.hospital, id)
    }

    /// All records for this hospital, newest first
    pub fn list(&self) -> StoreResult<Vec<Patient>> {
        let start = format!("{}/", self.hospital);
        // '0' is the byte after '/', so this bounds the prefix scan
        let end = format!("{}0", self.hospital);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PATIENTS_TABLE)?;

        let mut patients = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (key, value) = entry?;
            patients.push(decode(key.value(), value.value())?);
        }
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }

    pub fn get(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        let key = self.key(id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PATIENTS_TABLE)?;
        let found = table.get(key.as_str())?;
        found.map(|value| decode(&key, value.value())).transpose()
    }

    /// Validate and insert a new record. The id and timestamps are assigned
    /// here; the hospital is always this view's hospital.
    pub fn create(&self, draft: PatientDraft, now: DateTime<Utc>) -> StoreResult<Patient> {
        let patient = draft.into_patient(&self.hospital, now)?;
        self.put(&patient)?;
        debug!("Created patient {} for hospital {}", patient.id, self.hospital);
        Ok(patient)
    }

    /// Merge `draft` onto the stored record. `Ok(None)` when the record does
    /// not exist for this hospital.
    pub fn update(&self, id: Uuid, draft: PatientDraft, now: DateTime<Utc>) -> StoreResult<Option<Patient>> {
        self.modify(id, |patient| draft.apply_to(patient, now).map_err(StoreError::from))
    }

    /// `Ok(false)` when nothing was deleted
    pub fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let key = self.key(id);
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(PATIENTS_TABLE)?;
            let removed = table.remove(key.as_str())?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Write a fresh assessment back onto a stored record
    pub fn record_assessment(
        &self,
        id: Uuid,
        result: &RiskAssessmentResult,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Patient>> {
        self.modify(id, |patient| {
            patient.record_assessment(result, now);
            Ok(())
        })
    }

    /// Read-modify-write inside a single write transaction
    fn modify<F>(&self, id: Uuid, change: F) -> StoreResult<Option<Patient>>
    where
        F: FnOnce(&mut Patient) -> StoreResult<()>,
    {
        let key = self.key(id);
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(PATIENTS_TABLE)?;
            let existing = match table.get(key.as_str())? {
                Some(value) => Some(decode(&key, value.value())?),
                None => None,
            };
            let Some(mut patient) = existing else {
                return Ok(None);
            };
            change(&mut patient)?;
            let bytes = serde_json::to_vec(&patient)?;
            table.insert(key.as_str(), bytes.as_slice())?;
            patient
        };
        write_txn.commit()?;
        Ok(Some(updated))
    }

    fn put(&self, patient: &Patient) -> StoreResult<()> {
        let key = self.key(patient.id);
        let bytes = serde_json::to_vec(patient)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PATIENTS_TABLE)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

fn decode(key: &str, bytes: &[u8]) -> StoreResult<Patient> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MedicalHistory, RiskLabel, RiskLevel, ASSESSMENT_NOTES};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
    }

    fn hospital(name: &str) -> HospitalId {
        HospitalId::new(name).unwrap()
    }

    fn draft(name: &str) -> PatientDraft {
        PatientDraft {
            patient_id: Some(format!("MRN-{}", name)),
            name: Some(name.to_string()),
            age: Some(71),
            gender: Some("female".to_string()),
            diagnosis: Some("Heart failure".to_string()),
            length_of_stay: Some(6),
            medical_history: Some(MedicalHistory {
                conditions: vec!["Heart failure".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn assessment() -> RiskAssessmentResult {
        RiskAssessmentResult {
            readmission_risk: 40,
            risk_level: RiskLevel::Moderate,
            factors: vec!["Age over 65".to_string(), "Heart condition".to_string()],
            notes: ASSESSMENT_NOTES.to_string(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));

        let created = tenant.create(draft("Ada"), now()).unwrap();
        assert_eq!(created.hospital_id.as_str(), "st-mary");
        assert_eq!(created.created_at, now());

        let fetched = tenant.get(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(tenant.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_invalid_draft() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));

        let err = tenant.create(PatientDraft::default(), now()).unwrap_err();
        match err {
            StoreError::Validation(messages) => assert!(messages.contains(&"Name is required".to_string())),
            other => panic!("expected validation error, got {other}"),
        }
        assert!(tenant.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_newest_first() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));

        tenant.create(draft("Old"), now()).unwrap();
        tenant.create(draft("New"), now() + Duration::hours(1)).unwrap();

        let names: Vec<_> = tenant.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["New", "Old"]);
    }

    #[test]
    fn test_tenant_isolation() {
        let store = PatientStore::in_memory().unwrap();
        let a = store.tenant(hospital("alpha"));
        let b = store.tenant(hospital("beta"));
        // Shares a prefix with "alpha" to catch sloppy range bounds
        let a2 = store.tenant(hospital("alpha2"));

        let patient = a.create(draft("Ada"), now()).unwrap();
        a2.create(draft("Eve"), now()).unwrap();

        assert_eq!(a.list().unwrap().len(), 1);
        assert!(b.list().unwrap().is_empty());
        assert!(b.get(patient.id).unwrap().is_none());
        assert!(b.update(patient.id, draft("Mallory"), now()).unwrap().is_none());
        assert!(b.record_assessment(patient.id, &assessment(), now()).unwrap().is_none());
        assert!(!b.delete(patient.id).unwrap());

        assert_eq!(a.get(patient.id).unwrap().unwrap().name, "Ada");
    }

    #[test]
    fn test_update_merges_fields() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));
        let patient = tenant.create(draft("Ada"), now()).unwrap();

        let later = now() + Duration::days(1);
        let change = PatientDraft {
            diagnosis: Some("COPD".to_string()),
            ..Default::default()
        };
        let updated = tenant.update(patient.id, change, later).unwrap().unwrap();
        assert_eq!(updated.diagnosis, "COPD");
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_at, now());
        assert_eq!(tenant.get(patient.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn test_update_validation_leaves_record_untouched() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));
        let patient = tenant.create(draft("Ada"), now()).unwrap();

        let change = PatientDraft {
            age: Some(400),
            ..Default::default()
        };
        assert!(matches!(
            tenant.update(patient.id, change, now()),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(tenant.get(patient.id).unwrap().unwrap(), patient);
    }

    #[test]
    fn test_delete() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));
        let patient = tenant.create(draft("Ada"), now()).unwrap();

        assert!(tenant.delete(patient.id).unwrap());
        assert!(!tenant.delete(patient.id).unwrap());
        assert!(tenant.get(patient.id).unwrap().is_none());
    }

    #[test]
    fn test_record_assessment_syncs_label() {
        let store = PatientStore::in_memory().unwrap();
        let tenant = store.tenant(hospital("st-mary"));
        let patient = tenant.create(draft("Ada"), now()).unwrap();
        assert_eq!(patient.risk_label, RiskLabel::Unknown);

        let at = now() + Duration::minutes(5);
        let updated = tenant.record_assessment(patient.id, &assessment(), at).unwrap().unwrap();
        let snapshot = updated.readmission_risk.as_ref().unwrap();
        assert_eq!(snapshot.score, 40);
        assert_eq!(snapshot.last_updated, at);
        assert_eq!(updated.risk_label, RiskLabel::Medium);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("careline.redb");

        let id = {
            let store = PatientStore::open(&path).unwrap();
            store.tenant(hospital("st-mary")).create(draft("Ada"), now()).unwrap().id
        };

        let store = PatientStore::open(&path).unwrap();
        let patient = store.tenant(hospital("st-mary")).get(id).unwrap().unwrap();
        assert_eq!(patient.name, "Ada");
    }
}
