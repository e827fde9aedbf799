//! Loading of cleaned readings into botanist, plant and recording.
//!
//! Dependency order is botanist, then plant, then recording. Each step is one
//! multi-row statement that commits on its own; a failure in a later step does
//! not undo an earlier one. References are resolved with one lookup per table
//! before inserting, and rows whose parent is missing are dropped and counted.

use crate::db::models::{NewBotanist, NewPlant, NewRecording};
use crate::models::plants::PlantId;
use crate::schema;
use crate::services::transform::CleanReading;
use crate::utils::round_to;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Nullable};
use diesel::PgConnection;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

const MEASUREMENT_DECIMALS: i32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub botanists_inserted: usize,
    pub plants_inserted: usize,
    pub plants_unlinked: usize,
    pub recordings_inserted: usize,
    pub recordings_unlinked: usize,
}

/// Run the three upserts in dependency order.
pub fn load(conn: &mut PgConnection, rows: &[CleanReading]) -> Result<LoadReport, String> {
    let botanists_inserted = upsert_botanists(conn, rows)?;
    let (plants_inserted, plants_unlinked) = upsert_plants(conn, rows)?;
    let (recordings_inserted, recordings_unlinked) = insert_recordings(conn, rows)?;
    Ok(LoadReport {
        botanists_inserted,
        plants_inserted,
        plants_unlinked,
        recordings_inserted,
        recordings_unlinked,
    })
}

/// Insert botanists by name; an existing name keeps its first-seen details.
pub fn upsert_botanists(conn: &mut PgConnection, rows: &[CleanReading]) -> Result<usize, String> {
    let mut seen = BTreeSet::new();
    let new_rows: Vec<NewBotanist> = rows
        .iter()
        .filter(|r| seen.insert(r.botanist_name.as_str()))
        .map(|r| NewBotanist {
            botanist_name: r.botanist_name.clone(),
            email: r.email.clone(),
            phone: r.phone.clone(),
        })
        .collect();
    if new_rows.is_empty() {
        return Ok(0);
    }

    use schema::botanist::dsl as B;

    diesel::insert_into(B::botanist)
        .values(&new_rows)
        .on_conflict(B::botanist_name)
        .do_nothing()
        .execute(conn)
        .map_err(|e| format!("insert botanist rows failed: {}", e))
}

/// Insert plants by API identifier, linked to their botanist by exact name.
///
/// Returns `(inserted, unlinked)`.
pub fn upsert_plants(conn: &mut PgConnection, rows: &[CleanReading]) -> Result<(usize, usize), String> {
    use schema::botanist::dsl as B;
    use schema::plant::dsl as P;

    let mut seen = BTreeSet::new();
    let candidates: Vec<&CleanReading> = rows.iter().filter(|r| seen.insert(r.plant_id)).collect();
    if candidates.is_empty() {
        return Ok((0, 0));
    }

    let names: Vec<String> = candidates
        .iter()
        .map(|r| r.botanist_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let botanist_ids: BTreeMap<String, i64> = B::botanist
        .filter(B::botanist_name.eq_any(names))
        .select((B::botanist_name, B::id))
        .load::<(String, i64)>(conn)
        .map_err(|e| format!("fetch botanist ids failed: {}", e))?
        .into_iter()
        .collect();

    let mut unlinked = 0;
    let new_rows: Vec<NewPlant> = candidates
        .into_iter()
        .filter_map(|r| match botanist_ids.get(&r.botanist_name) {
            Some(&botanist_id) => Some(NewPlant {
                general_name: r.general_name.clone(),
                scientific_name: r.scientific_name.clone(),
                cycle: r.cycle.clone(),
                plant_id: r.plant_id.0,
                botanist_id,
            }),
            None => {
                warn!(
                    "Load: plant {} dropped, botanist {:?} not in storage",
                    r.plant_id.0, r.botanist_name
                );
                unlinked += 1;
                None
            }
        })
        .collect();
    if new_rows.is_empty() {
        return Ok((0, unlinked));
    }

    let inserted = diesel::insert_into(P::plant)
        .values(&new_rows)
        .on_conflict(P::plant_id)
        .do_nothing()
        .execute(conn)
        .map_err(|e| format!("insert plant rows failed: {}", e))?;
    Ok((inserted, unlinked))
}

/// Append one recording per row; recordings are never deduplicated.
///
/// Returns `(inserted, unlinked)`.
pub fn insert_recordings(conn: &mut PgConnection, rows: &[CleanReading]) -> Result<(usize, usize), String> {
    use schema::plant::dsl as P;
    use schema::recording::dsl as R;

    if rows.is_empty() {
        return Ok((0, 0));
    }

    let external_ids: Vec<i64> = rows
        .iter()
        .map(|r| r.plant_id.0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let plant_ids: BTreeMap<i64, i64> = P::plant
        .filter(P::plant_id.eq_any(external_ids))
        .select((P::plant_id, P::id))
        .load::<(i64, i64)>(conn)
        .map_err(|e| format!("fetch plant ids failed: {}", e))?
        .into_iter()
        .collect();

    let mut unlinked = 0;
    let new_rows: Vec<NewRecording> = rows
        .iter()
        .filter_map(|r| match plant_ids.get(&r.plant_id.0) {
            Some(&plant_id) => Some(NewRecording {
                recorded: r.recorded_at.with_timezone(&Utc),
                temperature: round_to(r.temperature, MEASUREMENT_DECIMALS),
                soil_moisture: round_to(r.soil_moisture, MEASUREMENT_DECIMALS),
                watered: r.watered_at.with_timezone(&Utc),
                sunlight: r.sunlight.column_value(),
                plant_id,
            }),
            None => {
                warn!("Load: recording dropped, plant {} not in storage", r.plant_id.0);
                unlinked += 1;
                None
            }
        })
        .collect();
    if new_rows.is_empty() {
        return Ok((0, unlinked));
    }

    let inserted = diesel::insert_into(R::recording)
        .values(&new_rows)
        .execute(conn)
        .map_err(|e| format!("insert recording rows failed: {}", e))?;
    Ok((inserted, unlinked))
}

#[derive(QueryableByName)]
struct TrailingAverage {
    #[diesel(sql_type = BigInt)]
    plant_id: i64,
    #[diesel(sql_type = Nullable<Double>)]
    average: Option<f64>,
}

/// Mean temperature per plant (by API identifier) over the trailing `window`,
/// measured against the database clock.
pub fn trailing_averages(conn: &mut PgConnection, window: Duration) -> Result<BTreeMap<PlantId, f64>, String> {
    let rows = diesel::sql_query(
        "SELECT p.plant_id, AVG(r.temperature) AS average \
         FROM recording r \
         JOIN plant p ON p.id = r.plant_id \
         WHERE r.recorded > NOW() - make_interval(secs => $1) \
         GROUP BY p.plant_id \
         ORDER BY p.plant_id",
    )
    .bind::<Double, _>(window.as_secs_f64())
    .load::<TrailingAverage>(conn)
    .map_err(|e| format!("fetch trailing averages failed: {}", e))?;

    Ok(rows
        .into_iter()
        .filter_map(|row| row.average.map(|avg| (PlantId(row.plant_id), avg)))
        .collect())
}
