use crate::client::{PlantsClientError, ReadingSource};
use crate::models::plants::{PlantId, RawReading};
use log::debug;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::Path;

/// Per-cycle tally of what the harvester fetched and what it skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub fetched: usize,
    pub timed_out: usize,
    pub transport: usize,
    pub http_status: usize,
    pub error_body: usize,
    pub malformed: usize,
}

impl HarvestReport {
    pub fn skipped(&self) -> usize {
        self.timed_out + self.transport + self.http_status + self.error_body + self.malformed
    }

    fn record_skip(&mut self, err: &PlantsClientError) {
        match err {
            PlantsClientError::Timeout(_) => self.timed_out += 1,
            PlantsClientError::Transport(_) => self.transport += 1,
            PlantsClientError::Http { .. } => self.http_status += 1,
            PlantsClientError::Api { .. } => self.error_body += 1,
            PlantsClientError::Malformed { .. } => self.malformed += 1,
        }
    }
}

/// One-shot pass over the plant ID space, yielding valid readings in ID order.
///
/// Failed items are counted and skipped; they never end the iteration.
pub struct Harvest<'a, S: ReadingSource + ?Sized> {
    source: &'a S,
    ids: RangeInclusive<u32>,
    report: HarvestReport,
}

pub fn harvest<S: ReadingSource + ?Sized>(source: &S, ids: RangeInclusive<u32>) -> Harvest<'_, S> {
    Harvest {
        source,
        ids,
        report: HarvestReport::default(),
    }
}

impl<S: ReadingSource + ?Sized> Harvest<'_, S> {
    pub fn report(&self) -> &HarvestReport {
        &self.report
    }
}

impl<S: ReadingSource + ?Sized> Iterator for Harvest<'_, S> {
    type Item = RawReading;

    fn next(&mut self) -> Option<RawReading> {
        for id in self.ids.by_ref() {
            match self.source.fetch(PlantId(i64::from(id))) {
                Ok(reading) => {
                    self.report.fetched += 1;
                    return Some(reading);
                }
                Err(e) => {
                    debug!("Harvest: skipping plant {}: {}", id, e);
                    self.report.record_skip(&e);
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.ids.size_hint().1)
    }
}

/// Persist a harvested batch as a JSON array for the cleaning stage.
pub fn write_handoff(path: &Path, readings: &[RawReading]) -> Result<(), String> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| format!("failed to create {}: {}", dir.display(), e))?;
    }
    let file = fs::File::create(path).map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, readings)
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
    writer.flush().map_err(|e| format!("failed to flush {}: {}", path.display(), e))
}

/// Read the handoff file back and remove it.
pub fn take_handoff(path: &Path) -> Result<Vec<RawReading>, String> {
    let file = fs::File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let readings: Vec<RawReading> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
    fs::remove_file(path).map_err(|e| format!("failed to remove {}: {}", path.display(), e))?;
    Ok(readings)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::plants::BotanistDetails;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    pub(crate) fn sample_reading(plant_id: i64) -> RawReading {
        RawReading {
            plant_id: PlantId(plant_id),
            name: format!("Plant {}", plant_id),
            scientific_name: json!([format!("Plantus numerus {}", plant_id)]),
            cycle: Some("Perennial".to_string()),
            botanist: BotanistDetails {
                name: "Gertrude Jekyll".to_string(),
                email: Some("gertrude.jekyll@lnhm.co.uk".to_string()),
                phone: Some("001-481-273-3691x127".to_string()),
            },
            recording_taken: "2023-08-29 13:45:43".to_string(),
            last_watered: "Mon, 28 Aug 2023 14:56:18 GMT".to_string(),
            temperature: 12.5,
            soil_moisture: 30.25,
            sunlight: json!(["full sun"]),
        }
    }

    /// Scripted source; IDs without a script entry answer 404.
    pub(crate) struct ScriptedSource {
        pub answers: BTreeMap<i64, fn(i64) -> Result<RawReading, PlantsClientError>>,
        pub calls: RefCell<Vec<i64>>,
    }

    impl ScriptedSource {
        pub(crate) fn new() -> Self {
            ScriptedSource {
                answers: BTreeMap::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub(crate) fn answer(mut self, id: i64, f: fn(i64) -> Result<RawReading, PlantsClientError>) -> Self {
            self.answers.insert(id, f);
            self
        }
    }

    impl ReadingSource for ScriptedSource {
        fn fetch(&self, plant_id: PlantId) -> Result<RawReading, PlantsClientError> {
            self.calls.borrow_mut().push(plant_id.0);
            match self.answers.get(&plant_id.0) {
                Some(f) => f(plant_id.0),
                None => Err(PlantsClientError::Http {
                    status: 404,
                    message: "plant not found".to_string(),
                }),
            }
        }
    }

    pub(crate) fn ok(id: i64) -> Result<RawReading, PlantsClientError> {
        Ok(sample_reading(id))
    }

    fn on_loan(_: i64) -> Result<RawReading, PlantsClientError> {
        Err(PlantsClientError::Api {
            message: "plant on loan to another museum".to_string(),
        })
    }

    fn timeout(_: i64) -> Result<RawReading, PlantsClientError> {
        Err(PlantsClientError::Timeout("timeout: global".to_string()))
    }

    #[test]
    fn collects_valid_readings_in_id_order() {
        let source = ScriptedSource::new().answer(4, ok).answer(0, ok).answer(2, ok);
        let mut run = harvest(&source, 0..=5);
        let ids: Vec<i64> = run.by_ref().map(|r| r.plant_id.0).collect();

        assert_eq!(ids, vec![0, 2, 4]);
        assert_eq!(*source.calls.borrow(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(run.report().fetched, 3);
        assert_eq!(run.report().http_status, 3);
    }

    #[test]
    fn item_failures_are_counted_not_fatal() {
        let source = ScriptedSource::new()
            .answer(0, ok)
            .answer(1, on_loan)
            .answer(2, timeout)
            .answer(3, ok);
        let mut run = harvest(&source, 0..=3);
        let batch: Vec<RawReading> = run.by_ref().collect();

        assert_eq!(batch.len(), 2);
        let report = run.report();
        assert_eq!(report.error_body, 1);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.skipped(), 2);
    }

    #[test]
    fn empty_batch_is_valid() {
        let source = ScriptedSource::new();
        let mut run = harvest(&source, 0..=2);
        assert_eq!(run.by_ref().count(), 0);
        assert_eq!(run.report().skipped(), 3);
        assert_eq!(run.next(), None);
    }

    #[test]
    fn handoff_round_trip_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("live_plants.json");
        let batch = vec![sample_reading(1), sample_reading(7)];

        write_handoff(&path, &batch).expect("write handoff");
        assert!(path.is_file());

        let back = take_handoff(&path).expect("take handoff");
        assert_eq!(back, batch);
        assert!(!path.exists());
    }

    #[test]
    fn missing_handoff_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(take_handoff(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn buffered_write_failure_is_reported() {
        // every write to /dev/full fails with ENOSPC once the buffer is flushed
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let err = write_handoff(full, &[sample_reading(1)]).unwrap_err();
        assert!(err.contains("/dev/full"), "error was {}", err);
    }
}
