//! Durable record of the daily totals.
//!
//! The record is loaded once at startup, overwritten whole on every save, and
//! zeroed when the stored date is not today's. Saves go through a temporary
//! file and a rename, so a reader never sees half a record.
//!
//! Storage and the calendar are both behind traits so tests can swap in an
//! in-memory store and a settable clock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PersistenceError;

/// Persisted key/value layout.
///
/// Field names on disk are `gpsTotalMeters`, `arTotalMeters`, `totalSteps`
/// and `lastSaveDate` (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedRecord {
    pub gps_total_meters: f64,
    pub ar_total_meters: f64,
    pub total_steps: i64,
    pub last_save_date: Option<NaiveDate>,
}

impl PersistedRecord {
    /// A zeroed record stamped with `date`.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            last_save_date: Some(date),
            ..Self::default()
        }
    }

    /// Step count as the engine's unsigned type. Negative values become 0.
    pub fn steps(&self) -> u64 {
        u64::try_from(self.total_steps).unwrap_or(0)
    }

    /// Replace negative or non-finite totals with zero.
    fn sanitized(mut self) -> Self {
        if !self.gps_total_meters.is_finite() || self.gps_total_meters < 0.0 {
            self.gps_total_meters = 0.0;
        }
        if !self.ar_total_meters.is_finite() || self.ar_total_meters < 0.0 {
            self.ar_total_meters = 0.0;
        }
        if self.total_steps < 0 {
            self.total_steps = 0;
        }
        self
    }
}

/// Settings for when the engine asks for a save outside of the fixed checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Save once fused distance moved this much (meters) since the last save.
    pub save_distance_delta_m: f64,
    /// Save once the step count moved this much since the last save.
    pub save_step_delta: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_distance_delta_m: 25.0,
            save_step_delta: 50,
        }
    }
}

// ============================================================================
// STORAGE BACKENDS
// ============================================================================

/// Raw storage for a single record.
pub trait RecordStore {
    /// Read the record. `Ok(None)` means nothing has been stored yet.
    fn read(&self) -> Result<Option<PersistedRecord>, PersistenceError>;

    /// Replace the stored record as a whole.
    fn write(&mut self, record: &PersistedRecord) -> Result<(), PersistenceError>;

    /// Remove the stored record.
    fn clear(&mut self) -> Result<(), PersistenceError>;
}

/// JSON file store with write-to-temp-then-rename saves.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "record".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordStore for JsonFileStore {
    fn read(&self) -> Result<Option<PersistedRecord>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn write(&mut self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(record).map_err(PersistenceError::Encode)?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-memory store holding the serialized record.
///
/// Clones share the same slot, which lets tests "restart" an engine against
/// the same storage. Raw contents can be injected to simulate corruption.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored bytes verbatim.
    pub fn set_raw(&self, contents: impl Into<String>) {
        *self.slot.lock() = Some(contents.into());
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    /// Make every subsequent write fail (simulates a full disk).
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl RecordStore for MemoryStore {
    fn read(&self) -> Result<Option<PersistedRecord>, PersistenceError> {
        let slot = self.slot.lock();
        let Some(contents) = slot.as_deref() else {
            return Ok(None);
        };
        serde_json::from_str(contents)
            .map(Some)
            .map_err(|source| PersistenceError::Corrupt {
                path: PathBuf::from("<memory>"),
                source,
            })
    }

    fn write(&mut self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        if *self.fail_writes.lock() {
            return Err(PersistenceError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "writes disabled"),
            });
        }
        let json = serde_json::to_string(record).map_err(PersistenceError::Encode)?;
        *self.slot.lock() = Some(json);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

// ============================================================================
// CALENDAR
// ============================================================================

/// Source of the current calendar date.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Settable date for tests and replays. Clones share the date.
#[derive(Debug, Clone)]
pub struct FixedClock {
    date: Arc<Mutex<NaiveDate>>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Arc::new(Mutex::new(date)),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock() = date;
    }

    /// Move the date forward by `days`.
    pub fn advance_days(&self, days: u64) {
        let mut date = self.date.lock();
        if let Some(next) = date.checked_add_days(Days::new(days)) {
            *date = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock()
    }
}

// ============================================================================
// PERSISTENCE STORE
// ============================================================================

/// Result of [`PersistenceStore::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// Totals to resume from (zeroed if a rollover happened).
    pub record: PersistedRecord,
    /// Stored date was missing or not today; counters were reset.
    pub rolled_over: bool,
    /// Stored data could not be read and was treated as a first run.
    pub recovered: bool,
}

/// Loads, saves and rolls over the daily record.
pub struct PersistenceStore {
    store: Box<dyn RecordStore>,
    clock: Box<dyn Clock>,
}

impl PersistenceStore {
    pub fn new(store: Box<dyn RecordStore>, clock: Box<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// JSON file at `path`, dated by the local clock.
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonFileStore::new(path)), Box::new(LocalClock))
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Read the stored record and apply the daily reset.
    ///
    /// Never fails: a missing or unreadable record is a first run. When the
    /// stored date is not today, the zeroed record is written back at once.
    pub fn load(&mut self) -> LoadOutcome {
        let today = self.today();

        let (stored, recovered) = match self.store.read() {
            Ok(record) => (record.map(PersistedRecord::sanitized), false),
            Err(e) => {
                warn!(error = %e, "stored record unreadable, starting fresh");
                (None, true)
            }
        };

        match stored {
            Some(record) if record.last_save_date == Some(today) => {
                info!(
                    gps_total_m = record.gps_total_meters,
                    ar_total_m = record.ar_total_meters,
                    total_steps = record.total_steps,
                    "record loaded"
                );
                LoadOutcome {
                    record,
                    rolled_over: false,
                    recovered,
                }
            }
            stored => {
                let previous = stored.as_ref().and_then(|r| r.last_save_date);
                info!(?previous, %today, "new day, resetting totals");
                let record = PersistedRecord::empty(today);
                if let Err(e) = self.store.write(&record) {
                    warn!(error = %e, "failed to persist reset record");
                }
                LoadOutcome {
                    record,
                    rolled_over: true,
                    recovered,
                }
            }
        }
    }

    /// Write the totals stamped with the day they were accumulated on.
    pub fn save(
        &mut self,
        date: NaiveDate,
        gps_total_m: f64,
        ar_total_m: f64,
        total_steps: u64,
    ) -> Result<PersistedRecord, PersistenceError> {
        let record = PersistedRecord {
            gps_total_meters: gps_total_m,
            ar_total_meters: ar_total_m,
            total_steps: i64::try_from(total_steps).unwrap_or(i64::MAX),
            last_save_date: Some(date),
        };
        self.store.write(&record)?;
        Ok(record)
    }

    /// The stored record as-is, without applying the daily reset.
    pub fn peek(&self) -> Result<Option<PersistedRecord>, PersistenceError> {
        self.store.read()
    }

    /// Delete the stored record.
    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn memory_store(clock: &FixedClock) -> (PersistenceStore, MemoryStore) {
        let backing = MemoryStore::new();
        let store = PersistenceStore::new(Box::new(backing.clone()), Box::new(clock.clone()));
        (store, backing)
    }

    #[test]
    fn test_record_layout_on_disk() {
        let record = PersistedRecord {
            gps_total_meters: 12.5,
            ar_total_meters: 3.25,
            total_steps: 42,
            last_save_date: Some(date(2024, 3, 9)),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["gpsTotalMeters"], 12.5);
        assert_eq!(json["arTotalMeters"], 3.25);
        assert_eq!(json["totalSteps"], 42);
        assert_eq!(json["lastSaveDate"], "2024-03-09");
    }

    #[test]
    fn test_first_run_resets_and_saves() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, backing) = memory_store(&clock);

        let outcome = store.load();
        assert!(outcome.rolled_over);
        assert!(!outcome.recovered);
        assert_eq!(outcome.record, PersistedRecord::empty(date(2024, 5, 1)));
        assert!(backing.raw().unwrap().contains("2024-05-01"));
    }

    #[test]
    fn test_daily_reset_round_trip() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, _backing) = memory_store(&clock);
        store.save(date(2024, 5, 1), 300.0, 120.0, 500).unwrap();

        clock.advance_days(1);
        let outcome = store.load();
        assert!(outcome.rolled_over);
        assert_eq!(outcome.record.total_steps, 0);
        assert_eq!(outcome.record.gps_total_meters, 0.0);
        assert_eq!(outcome.record.ar_total_meters, 0.0);

        let stored = store.peek().unwrap().unwrap();
        assert_eq!(stored.last_save_date, Some(date(2024, 5, 2)));
        assert_eq!(stored.total_steps, 0);
    }

    #[test]
    fn test_record_keeps_the_date_it_was_saved_for() {
        let clock = FixedClock::new(date(2024, 5, 2));
        let (mut store, _backing) = memory_store(&clock);
        store.save(date(2024, 5, 1), 300.0, 120.0, 500).unwrap();

        let stored = store.peek().unwrap().unwrap();
        assert_eq!(stored.last_save_date, Some(date(2024, 5, 1)));
        let outcome = store.load();
        assert!(outcome.rolled_over);
        assert_eq!(outcome.record.steps(), 0);
    }

    #[test]
    fn test_same_day_load_keeps_totals() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, _backing) = memory_store(&clock);
        let saved = store.save(date(2024, 5, 1), 300.0, 120.0, 500).unwrap();

        let outcome = store.load();
        assert!(!outcome.rolled_over);
        assert_eq!(outcome.record, saved);
        assert_eq!(outcome.record.steps(), 500);
    }

    #[test]
    fn test_corrupt_record_is_first_run() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, backing) = memory_store(&clock);
        backing.set_raw("{not json");

        let outcome = store.load();
        assert!(outcome.recovered);
        assert!(outcome.rolled_over);
        assert_eq!(outcome.record.total_steps, 0);
        // Fresh record replaced the garbage.
        assert!(store.peek().unwrap().is_some());
    }

    #[test]
    fn test_negative_values_are_sanitized() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, backing) = memory_store(&clock);
        backing.set_raw(
            r#"{"gpsTotalMeters":-4.0,"arTotalMeters":2.0,"totalSteps":-9,"lastSaveDate":"2024-05-01"}"#,
        );
        let outcome = store.load();
        assert!(!outcome.rolled_over);
        assert_eq!(outcome.record.gps_total_meters, 0.0);
        assert_eq!(outcome.record.ar_total_meters, 2.0);
        assert_eq!(outcome.record.total_steps, 0);
    }

    #[test]
    fn test_missing_fields_default() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, backing) = memory_store(&clock);
        backing.set_raw(r#"{"totalSteps":7,"lastSaveDate":"2024-05-01"}"#);
        let outcome = store.load();
        assert_eq!(outcome.record.steps(), 7);
        assert_eq!(outcome.record.gps_total_meters, 0.0);
    }

    #[test]
    fn test_failed_write_is_reported() {
        let clock = FixedClock::new(date(2024, 5, 1));
        let (mut store, backing) = memory_store(&clock);
        backing.set_fail_writes(true);
        assert!(store.save(date(2024, 5, 1), 1.0, 1.0, 1).is_err());
        // Load still succeeds in memory.
        let outcome = store.load();
        assert!(outcome.rolled_over);
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("walk.json");
        let clock = FixedClock::new(date(2024, 5, 1));
        let mut store = PersistenceStore::new(Box::new(JsonFileStore::new(&path)), Box::new(clock));

        assert!(store.peek().unwrap().is_none());
        store.save(date(2024, 5, 1), 10.0, 5.0, 20).unwrap();
        assert!(path.exists());
        assert!(!path.with_file_name("walk.json.tmp").exists());

        let outcome = store.load();
        assert!(!outcome.rolled_over);
        assert_eq!(outcome.record.steps(), 20);

        store.clear().unwrap();
        assert!(!path.exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_json_file_store_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.json");
        std::fs::write(&path, "garbage").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.read(), Err(PersistenceError::Corrupt { .. })));
    }
}
