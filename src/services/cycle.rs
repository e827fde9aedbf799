//! The recurring harvest, clean, filter, load and sweep cycle, and the
//! scheduler that repeats it on a fixed wall-clock cadence.

use crate::client::{PlantsClient, PlantsClientError, ReadingSource};
use crate::config::Config;
use crate::services::extract::{harvest, take_handoff, write_handoff, HarvestReport};
use crate::services::ingest::{self, LoadReport};
use crate::services::outliers::{OutlierFilter, OutlierReport};
use crate::services::retention;
use crate::services::transform::{clean, CleanReading, CleanReport};
use diesel::prelude::*;
use diesel::PgConnection;
use log::{error, info, warn};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub harvest: HarvestReport,
    pub clean: CleanReport,
    pub outliers: OutlierReport,
    pub load: LoadReport,
    pub swept: usize,
}

/// One unit of scheduled work.
pub trait Cycle {
    fn run_cycle(&mut self) -> Result<CycleReport, String>;
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Harvest the ID space, round-trip the batch through the handoff file and
/// clean it. Touches the network and the filesystem, never the database.
pub fn extract_and_clean<S: ReadingSource + ?Sized>(
    source: &S,
    ids: RangeInclusive<u32>,
    handoff_path: &Path,
) -> Result<(Vec<CleanReading>, HarvestReport, CleanReport), String> {
    let mut run = harvest(source, ids);
    let batch: Vec<_> = run.by_ref().collect();
    let harvest_report = run.report().clone();

    write_handoff(handoff_path, &batch)?;
    drop(batch);
    let batch = take_handoff(handoff_path)?;

    let (rows, clean_report) = clean(batch);
    Ok((rows, harvest_report, clean_report))
}

/// Filter cleaned rows against trailing averages, load them and sweep.
pub fn filter_and_store(
    conn: &mut PgConnection,
    rows: Vec<CleanReading>,
    config: &Config,
) -> Result<(OutlierReport, LoadReport, usize), String> {
    let averages = ingest::trailing_averages(conn, config.trailing_window)?;
    let filter = OutlierFilter {
        tolerance: config.outlier_tolerance,
        missing_baseline: config.missing_baseline,
    };
    let (kept, outlier_report) = filter.filter(rows, &averages);
    let load_report = ingest::load(conn, &kept)?;
    let swept = retention::sweep(conn, config.retention)?;
    Ok((outlier_report, load_report, swept))
}

/// Production cycle: the plants API in, PostgreSQL out, with a fresh
/// connection per cycle.
pub struct EtlCycle {
    config: Config,
    client: PlantsClient,
}

impl EtlCycle {
    pub fn new(config: Config) -> Self {
        let client = PlantsClient::new(config.api_base_url.clone(), config.request_timeout);
        EtlCycle { config, client }
    }

    fn plant_ids(&self) -> RangeInclusive<u32> {
        if !self.config.discover_plant_count {
            return 0..=self.config.plant_id_max;
        }
        plant_id_range(self.config.plant_id_max, self.client.plants_on_display())
    }
}

/// ID range to harvest given the configured bound and a discovered plant count.
///
/// The count only widens the range: IDs have gaps, so a count below the
/// configured bound says nothing about which IDs exist.
pub fn plant_id_range(
    plant_id_max: u32,
    discovered: Result<Option<u32>, PlantsClientError>,
) -> RangeInclusive<u32> {
    match discovered {
        Ok(Some(count)) if count > 0 => 0..=plant_id_max.max(count),
        Ok(_) => {
            warn!("Cycle: API reported no plant count; using PLANT_ID_MAX={}", plant_id_max);
            0..=plant_id_max
        }
        Err(e) => {
            warn!(
                "Cycle: plant count discovery failed ({}); using PLANT_ID_MAX={}",
                e, plant_id_max
            );
            0..=plant_id_max
        }
    }
}

impl Cycle for EtlCycle {
    fn run_cycle(&mut self) -> Result<CycleReport, String> {
        let ids = self.plant_ids();
        let (rows, harvest, clean) = extract_and_clean(&self.client, ids, &self.config.handoff_path)?;

        let mut conn = PgConnection::establish(&self.config.database_url)
            .map_err(|e| format!("DB connection failed: {}", e))?;
        let (outliers, load, swept) = filter_and_store(&mut conn, rows, &self.config)?;

        let report = CycleReport {
            harvest,
            clean,
            outliers,
            load,
            swept,
        };
        info!(
            "Cycle: fetched={} skipped={} (timeout={}, transport={}, http={}, error_body={}, malformed={}) \
             cleaned={} dropped={} outliers={} admitted_without_baseline={} held={} \
             inserted botanists={} plants={} recordings={} unlinked={} swept={}",
            report.harvest.fetched,
            report.harvest.skipped(),
            report.harvest.timed_out,
            report.harvest.transport,
            report.harvest.http_status,
            report.harvest.error_body,
            report.harvest.malformed,
            report.clean.kept,
            report.clean.dropped(),
            report.outliers.out_of_band,
            report.outliers.admitted_without_baseline,
            report.outliers.held_without_baseline,
            report.load.botanists_inserted,
            report.load.plants_inserted,
            report.load.recordings_inserted,
            report.load.plants_unlinked + report.load.recordings_unlinked,
            report.swept
        );
        Ok(report)
    }
}

/// Time to sleep after a cycle so that wake-ups land on `start + k * interval`.
///
/// `tick` is the slot the next cycle is due in. Returns the sleep and the slot
/// after that. An overrun sleeps zero and re-anchors to the next boundary
/// instead of replaying missed slots.
pub fn next_sleep(start: Instant, now: Instant, interval: Duration, tick: u32) -> (Duration, u32) {
    let deadline = start + interval.saturating_mul(tick);
    if now < deadline {
        return (deadline - now, tick.saturating_add(1));
    }
    let elapsed = now.saturating_duration_since(start).as_nanos();
    let passed = u32::try_from(elapsed / interval.as_nanos().max(1)).unwrap_or(u32::MAX);
    (Duration::ZERO, passed.saturating_add(1))
}

pub struct Scheduler<C: Clock> {
    clock: C,
    interval: Duration,
    cancel: Arc<AtomicBool>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(config: &Config, clock: C, cancel: Arc<AtomicBool>) -> Self {
        Scheduler {
            clock,
            interval: config.cycle_interval,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Repeat `cycle` until cancelled; returns the number of cycles run.
    ///
    /// A failed cycle is logged and the next one starts on schedule.
    pub fn run(&self, cycle: &mut impl Cycle) -> u64 {
        let start = self.clock.now();
        let mut tick: u32 = 1;
        let mut iterations: u64 = 0;

        while !self.cancelled() {
            let cycle_start = self.clock.now();
            match cycle.run_cycle() {
                Ok(_) => info!(
                    "Cycle {} finished in {:.1}s",
                    iterations + 1,
                    self.clock.now().duration_since(cycle_start).as_secs_f64()
                ),
                Err(e) => error!("Cycle {} failed: {}; retrying next cycle", iterations + 1, e),
            }
            iterations += 1;

            let (pause, next_tick) = next_sleep(start, self.clock.now(), self.interval, tick);
            if pause.is_zero() {
                warn!(
                    "Cycle {} overran the {}s interval; starting the next one now",
                    iterations,
                    self.interval.as_secs()
                );
            }
            tick = next_tick;

            if self.cancelled() {
                break;
            }
            self.clock.sleep(pause);
        }

        info!("Scheduler stopped after {} cycle(s)", iterations);
        iterations
    }
}
