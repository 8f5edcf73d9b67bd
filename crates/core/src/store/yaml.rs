//! YAML file store.
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//!   conditions/
//!     conditions.lock # advisory lock shared by every process using the directory
//!     sequence.yaml   # next id to allocate
//!     1.yaml          # one document per condition, named by id
//!     2.yaml
//! ```
//!
//! Writers hold an exclusive lock on `conditions.lock` and readers a shared one, so
//! separate processes opening the same directory never allocate the same id.
//! The sequence file only ever moves forward, so a purged id is never allocated again.
//! Documents are parsed against a strict wire model (`deny_unknown_fields`); a document
//! that does not parse is skipped during listing and logged.

use super::ConditionStore;
use crate::condition::{
    Actor, AuditStamp, ClinicalStatus, CodedOrFreeText, Condition, ConditionId, EncounterId,
    PatientId, UserId, VerificationStatus, VoidInfo,
};
use crate::config::CoreConfig;
use crate::constants::{CONDITION_FILE_EXTENSION, LOCK_FILENAME, SEQUENCE_FILENAME};
use crate::error::{StoreError, StoreResult};
use crate::form_field::FormField;
use chrono::{DateTime, Utc};
use conditions_types::NonEmptyText;
use conditions_uuid::RecordUuid;
use fs2::FileExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores each condition as `<id>.yaml` under the configured conditions directory.
#[derive(Debug)]
pub struct YamlConditionStore {
    dir: PathBuf,
}

/// Held advisory lock on the store's lock file; released on drop.
struct DirLock {
    file: File,
}

impl DirLock {
    fn acquire(path: &Path, exclusive: bool) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(StoreError::Lock)?;

        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(StoreError::Lock)?;

        Ok(Self { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release condition store lock: {}", e);
        }
    }
}

impl YamlConditionStore {
    /// Opens the store, creating the conditions directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StorageDirCreation`] if the directory cannot be created.
    pub fn open(cfg: &CoreConfig) -> StoreResult<Self> {
        let dir = cfg.conditions_dir();
        fs::create_dir_all(&dir).map_err(StoreError::StorageDirCreation)?;
        tracing::debug!("opened condition store at {}", dir.display());

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_lock(&self) -> StoreResult<DirLock> {
        DirLock::acquire(&self.dir.join(LOCK_FILENAME), true)
    }

    fn read_lock(&self) -> StoreResult<DirLock> {
        DirLock::acquire(&self.dir.join(LOCK_FILENAME), false)
    }

    fn record_path(&self, id: ConditionId) -> PathBuf {
        self.dir.join(format!("{id}.{CONDITION_FILE_EXTENSION}"))
    }

    fn sequence_path(&self) -> PathBuf {
        self.dir.join(SEQUENCE_FILENAME)
    }

    /// Next id to allocate.
    ///
    /// When the sequence file is missing, falls back to one past the highest stored id.
    fn next_id(&self, existing: &[Condition]) -> StoreResult<u64> {
        match fs::read_to_string(self.sequence_path()) {
            Ok(text) => Ok(parse_yaml::<SequenceWire>(&text)?.next_id),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(existing
                .iter()
                .filter_map(|c| c.id)
                .map(|id| id.0 + 1)
                .max()
                .unwrap_or(1)),
            Err(e) => Err(StoreError::FileRead(e)),
        }
    }

    fn write_sequence(&self, next_id: u64) -> StoreResult<()> {
        let yaml = render_yaml(&SequenceWire { next_id })?;
        write_replacing(&self.sequence_path(), &yaml)
    }

    fn write_record(&self, condition: &Condition) -> StoreResult<()> {
        let wire = ConditionWire::from_domain(condition)?;
        let yaml = render_yaml(&wire)?;
        write_replacing(&self.record_path(wire.id), &yaml)
    }

    fn read_record(&self, id: ConditionId) -> StoreResult<Option<Condition>> {
        match fs::read_to_string(self.record_path(id)) {
            Ok(text) => parse_condition(&text).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::FileRead(e)),
        }
    }

    /// Reads every parseable condition document in the directory.
    fn scan(&self) -> StoreResult<Vec<Condition>> {
        let mut conditions = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(conditions),
            Err(e) => return Err(StoreError::FileRead(e)),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !is_condition_document(&path) {
                continue;
            }

            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!("failed to read condition file: {} - {}", path.display(), e);
                    continue;
                }
            };

            match parse_condition(&contents) {
                Ok(condition) => conditions.push(condition),
                Err(e) => {
                    tracing::warn!("failed to parse condition file: {} - {}", path.display(), e);
                }
            }
        }

        Ok(conditions)
    }
}

impl ConditionStore for YamlConditionStore {
    fn insert(&self, mut condition: Condition) -> StoreResult<Condition> {
        let _lock = self.write_lock()?;
        let existing = self.scan()?;

        if existing.iter().any(|c| c.uuid == condition.uuid) {
            return Err(StoreError::DuplicateUuid(condition.uuid.to_string()));
        }

        let id = self.next_id(&existing)?;
        condition.id = Some(ConditionId(id));

        self.write_sequence(id + 1)?;
        self.write_record(&condition)?;

        Ok(condition)
    }

    fn update(&self, condition: &Condition) -> StoreResult<()> {
        let id = condition.id.ok_or_else(|| {
            StoreError::InvalidRecord("cannot update a condition without an id".into())
        })?;

        let _lock = self.write_lock()?;
        if !self.record_path(id).is_file() {
            return Err(StoreError::Missing(id));
        }
        self.write_record(condition)
    }

    fn get(&self, id: ConditionId) -> StoreResult<Option<Condition>> {
        let _lock = self.read_lock()?;
        self.read_record(id)
    }

    fn get_by_uuid(&self, uuid: &RecordUuid) -> StoreResult<Option<Condition>> {
        let _lock = self.read_lock()?;
        Ok(self.scan()?.into_iter().find(|c| &c.uuid == uuid))
    }

    fn list_by_patient(&self, patient: PatientId) -> StoreResult<Vec<Condition>> {
        let _lock = self.read_lock()?;
        Ok(self
            .scan()?
            .into_iter()
            .filter(|c| c.patient == Some(patient))
            .collect())
    }

    fn list_by_encounter(&self, encounter: EncounterId) -> StoreResult<Vec<Condition>> {
        let _lock = self.read_lock()?;
        Ok(self
            .scan()?
            .into_iter()
            .filter(|c| c.encounter == Some(encounter))
            .collect())
    }

    fn delete(&self, id: ConditionId) -> StoreResult<bool> {
        let _lock = self.write_lock()?;
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::FileRemove(e)),
        }
    }
}

fn is_condition_document(path: &Path) -> bool {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == CONDITION_FILE_EXTENSION);
    let is_sequence = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == SEQUENCE_FILENAME);
    is_yaml && !is_sequence
}

/// Writes through a sibling temp file and a rename, so readers never see half a document.
fn write_replacing(path: &Path, contents: &str) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(StoreError::FileWrite)?;
    fs::rename(&tmp, path).map_err(StoreError::FileWrite)
}

fn render_yaml<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_yaml::to_string(value).map_err(StoreError::YamlSerialization)
}

fn parse_yaml<T: DeserializeOwned>(yaml_text: &str) -> StoreResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize::<_, T>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        StoreError::Schema {
            path,
            message: err.into_inner().to_string(),
        }
    })
}

fn parse_condition(yaml_text: &str) -> StoreResult<Condition> {
    parse_yaml::<ConditionWire>(yaml_text)?.into_domain()
}

// ============================================================================
// Wire model
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SequenceWire {
    next_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionWire {
    id: ConditionId,
    uuid: String,
    patient_id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encounter_id: Option<EncounterId>,
    #[serde(default)]
    condition: CodedOrFreeText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clinical_status: Option<ClinicalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification_status: Option<VerificationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    onset_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    form_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    form_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<StampWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    changed: Option<StampWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voided: Option<VoidWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StampWire {
    user_id: UserId,
    user_name: String,
    at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct VoidWire {
    reason: String,
    user_id: UserId,
    user_name: String,
    at: DateTime<Utc>,
}

impl StampWire {
    fn from_domain(stamp: &AuditStamp) -> Self {
        Self {
            user_id: stamp.by.user_id,
            user_name: stamp.by.name.to_string(),
            at: stamp.at,
        }
    }

    fn into_domain(self) -> StoreResult<AuditStamp> {
        Ok(AuditStamp {
            by: actor(self.user_id, &self.user_name)?,
            at: self.at,
        })
    }
}

impl ConditionWire {
    fn from_domain(condition: &Condition) -> StoreResult<Self> {
        let id = condition
            .id
            .ok_or_else(|| StoreError::InvalidRecord("condition has no id".into()))?;
        let patient_id = condition
            .patient
            .ok_or_else(|| StoreError::InvalidRecord(format!("condition {id} has no patient")))?;

        Ok(Self {
            id,
            uuid: condition.uuid.to_string(),
            patient_id,
            encounter_id: condition.encounter,
            condition: condition.condition.clone(),
            clinical_status: condition.clinical_status,
            verification_status: condition.verification_status,
            onset_date: condition.onset_date,
            end_date: condition.end_date,
            end_reason: condition.end_reason.clone(),
            additional_detail: condition.additional_detail.clone(),
            form_namespace: condition.form_field.namespace().map(str::to_owned),
            form_path: condition.form_field.path().map(str::to_owned),
            created: condition.created.as_ref().map(StampWire::from_domain),
            changed: condition.changed.as_ref().map(StampWire::from_domain),
            voided: condition.void.as_ref().map(|v| VoidWire {
                reason: v.reason.to_string(),
                user_id: v.by.user_id,
                user_name: v.by.name.to_string(),
                at: v.at,
            }),
        })
    }

    fn into_domain(self) -> StoreResult<Condition> {
        let uuid = RecordUuid::parse(&self.uuid)
            .map_err(|e| StoreError::InvalidRecord(format!("condition {}: {e}", self.id)))?;
        let form_field =
            FormField::new(self.form_namespace.as_deref(), self.form_path.as_deref())
                .map_err(|e| StoreError::InvalidRecord(format!("condition {}: {e}", self.id)))?;

        let void = match self.voided {
            Some(v) => Some(VoidInfo {
                reason: NonEmptyText::new(&v.reason).map_err(|e| {
                    StoreError::InvalidRecord(format!("condition {} void reason: {e}", self.id))
                })?,
                by: actor(v.user_id, &v.user_name)?,
                at: v.at,
            }),
            None => None,
        };

        Ok(Condition {
            id: Some(self.id),
            uuid,
            patient: Some(self.patient_id),
            encounter: self.encounter_id,
            condition: self.condition,
            clinical_status: self.clinical_status,
            verification_status: self.verification_status,
            onset_date: self.onset_date,
            end_date: self.end_date,
            end_reason: self.end_reason,
            additional_detail: self.additional_detail,
            form_field,
            created: self.created.map(StampWire::into_domain).transpose()?,
            changed: self.changed.map(StampWire::into_domain).transpose()?,
            void,
        })
    }
}

fn actor(user_id: UserId, user_name: &str) -> StoreResult<Actor> {
    let name = NonEmptyText::new(user_name)
        .map_err(|e| StoreError::InvalidRecord(format!("user {user_id}: {e}")))?;
    Ok(Actor::new(user_id, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConceptId;
    use tempfile::TempDir;

    fn test_store(temp_dir: &TempDir) -> YamlConditionStore {
        let cfg = CoreConfig::new(temp_dir.path().to_path_buf()).expect("config should build");
        YamlConditionStore::open(&cfg).expect("store should open")
    }

    fn test_actor() -> Actor {
        Actor::new(UserId(1), NonEmptyText::new("Super User").unwrap())
    }

    fn full_condition() -> Condition {
        let mut condition = Condition::for_patient(PatientId(2));
        condition.encounter = Some(EncounterId(2039));
        condition.condition = CodedOrFreeText::coded(ConceptId(5497));
        condition.clinical_status = Some(ClinicalStatus::Active);
        condition.verification_status = Some(VerificationStatus::Confirmed);
        condition.onset_date = Some(Utc::now());
        condition.additional_detail = Some("since childhood".into());
        condition
            .set_form_field(Some("my ns"), Some("my path"))
            .expect("valid form field");
        condition.created = Some(AuditStamp {
            by: test_actor(),
            at: Utc::now(),
        });
        condition
    }

    #[test]
    fn open_creates_conditions_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);
        assert!(store.dir().is_dir(), "conditions directory should exist");
    }

    #[test]
    fn insert_writes_document_and_sequence() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        let saved = store.insert(full_condition()).expect("insert should succeed");
        assert_eq!(saved.id(), Some(ConditionId(1)));

        assert!(store.dir().join("1.yaml").is_file(), "document should exist");
        let sequence =
            fs::read_to_string(store.dir().join(SEQUENCE_FILENAME)).expect("should read sequence");
        assert!(sequence.contains("next_id: 2"));
    }

    #[test]
    fn records_survive_reopening_the_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let saved = test_store(&temp_dir)
            .insert(full_condition())
            .expect("insert should succeed");

        let reopened = test_store(&temp_dir);
        let loaded = reopened
            .get(saved.id().unwrap())
            .expect("get should succeed")
            .expect("record should exist");

        assert_eq!(loaded, saved);
        assert_eq!(
            loaded.form_namespace_and_path().as_deref(),
            Some("my ns^my path")
        );
    }

    #[test]
    fn void_details_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        let mut saved = store.insert(full_condition()).unwrap();
        saved.void = Some(VoidInfo {
            reason: NonEmptyText::new("Entered in error").unwrap(),
            by: test_actor(),
            at: Utc::now(),
        });
        store.update(&saved).expect("update should succeed");

        let loaded = store.get(saved.id().unwrap()).unwrap().unwrap();
        assert!(loaded.is_voided());
        assert_eq!(loaded.void_reason().map(|r| r.as_str()), Some("Entered in error"));
        assert_eq!(loaded.voided_by(), Some(&test_actor()));
    }

    #[test]
    fn purged_ids_are_not_reused_across_restarts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        let first = store.insert(full_condition()).unwrap();
        assert!(store.delete(first.id().unwrap()).unwrap());
        assert!(store.get(first.id().unwrap()).unwrap().is_none());

        let reopened = test_store(&temp_dir);
        let second = reopened.insert(full_condition()).unwrap();
        assert_eq!(second.id(), Some(ConditionId(2)));
    }

    #[test]
    fn missing_sequence_falls_back_to_highest_id() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        store.insert(full_condition()).unwrap();
        store.insert(full_condition()).unwrap();
        fs::remove_file(store.dir().join(SEQUENCE_FILENAME)).expect("should remove sequence");

        let third = store.insert(full_condition()).unwrap();
        assert_eq!(third.id(), Some(ConditionId(3)));
    }

    #[test]
    fn insert_rejects_duplicate_uuid() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        let condition = full_condition();
        store.insert(condition.clone()).unwrap();
        let err = store.insert(condition).expect_err("duplicate uuid");
        assert!(matches!(err, StoreError::DuplicateUuid(_)));
    }

    #[test]
    fn listing_skips_unparseable_documents() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        store.insert(full_condition()).unwrap();
        fs::write(store.dir().join("99.yaml"), "invalid: yaml: content: [[[")
            .expect("should write invalid yaml");
        fs::write(store.dir().join("100.yaml"), "id: 100\nunexpected_field: true\n")
            .expect("should write unknown field");

        let conditions = store
            .list_by_patient(PatientId(2))
            .expect("listing should succeed");
        assert_eq!(conditions.len(), 1, "only the valid document should be listed");
    }

    #[test]
    fn separate_store_instances_never_share_an_id() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let per_writer = 40;

        let ids: Vec<ConditionId> = std::thread::scope(|scope| {
            let writers: Vec<_> = (0..2)
                .map(|_| {
                    let store = test_store(&temp_dir);
                    scope.spawn(move || {
                        (0..per_writer)
                            .map(|_| {
                                store
                                    .insert(full_condition())
                                    .expect("insert should succeed")
                                    .id()
                                    .expect("inserted condition should have an id")
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            writers
                .into_iter()
                .flat_map(|writer| writer.join().expect("writer thread panicked"))
                .collect()
        });

        let distinct: std::collections::BTreeSet<_> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), 2 * per_writer, "every insert should get its own id");

        let stored = test_store(&temp_dir)
            .list_by_patient(PatientId(2))
            .expect("listing should succeed");
        assert_eq!(stored.len(), 2 * per_writer, "no document should be overwritten");
    }

    #[test]
    fn get_reports_schema_path_for_bad_document() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        fs::write(
            store.dir().join("5.yaml"),
            "id: 5\nuuid: abc\npatient_id: not-a-number\n",
        )
        .expect("should write document");

        let err = store.get(ConditionId(5)).expect_err("schema mismatch");
        match err {
            StoreError::Schema { path, .. } => assert_eq!(path, "patient_id"),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn update_of_missing_record_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        let mut condition = full_condition();
        condition.id = Some(ConditionId(8));
        let err = store.update(&condition).expect_err("nothing to update");
        assert!(matches!(err, StoreError::Missing(ConditionId(8))));
    }

    #[test]
    fn list_by_encounter_filters_on_encounter() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir);

        store.insert(full_condition()).unwrap();
        let mut other = full_condition();
        other.encounter = None;
        store.insert(other).unwrap();

        let linked = store.list_by_encounter(EncounterId(2039)).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].encounter, Some(EncounterId(2039)));
    }
}
