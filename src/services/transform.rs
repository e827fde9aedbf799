//! Normalisation of harvested readings into typed, timezone-aware rows.
//!
//! Pure and deterministic: no I/O, surviving rows keep their input order.
//!
//! The two timestamps follow different rules because the API reports them
//! differently:
//! - `recording_taken` is UTC without an offset; it is converted to London time.
//! - `last_watered` is London wall-clock time carrying a misleading `GMT` suffix;
//!   it is localised (interpreted as London time), not converted.

use crate::models::plants::{PlantId, RawReading, Sunlight};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::London;
use chrono_tz::Tz;
use log::debug;
use serde_json::Value;

pub const MIN_PLAUSIBLE_TEMP_C: f64 = -10.0;
pub const MAX_PLAUSIBLE_TEMP_C: f64 = 60.0;

const RECORDING_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"];
const WATERED_FORMATS: [&str; 2] = ["%a, %d %b %Y %H:%M:%S GMT", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq)]
pub struct CleanReading {
    pub plant_id: PlantId,
    pub general_name: String,
    pub scientific_name: Option<String>,
    pub cycle: Option<String>,
    pub botanist_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub recorded_at: DateTime<Tz>,
    pub temperature: f64,
    pub soil_moisture: f64,
    pub watered_at: DateTime<Tz>,
    pub sunlight: Sunlight,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub kept: usize,
    pub bad_timestamp: usize,
    pub negative_moisture: usize,
    pub implausible_temperature: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.bad_timestamp + self.negative_moisture + self.implausible_temperature
    }
}

pub fn clean(batch: Vec<RawReading>) -> (Vec<CleanReading>, CleanReport) {
    let mut report = CleanReport::default();
    let mut rows = Vec::with_capacity(batch.len());

    for raw in batch {
        let id = raw.plant_id.0;
        let (Some(recorded_at), Some(watered_at)) = (
            parse_recording_taken(&raw.recording_taken),
            parse_last_watered(&raw.last_watered),
        ) else {
            debug!(
                "Clean: plant {} has unusable timestamps ({:?}, {:?})",
                id, raw.recording_taken, raw.last_watered
            );
            report.bad_timestamp += 1;
            continue;
        };
        if !moisture_is_valid(raw.soil_moisture) {
            debug!("Clean: plant {} soil moisture {} rejected", id, raw.soil_moisture);
            report.negative_moisture += 1;
            continue;
        }
        if !temperature_is_plausible(raw.temperature) {
            debug!("Clean: plant {} temperature {} rejected", id, raw.temperature);
            report.implausible_temperature += 1;
            continue;
        }

        rows.push(CleanReading {
            plant_id: raw.plant_id,
            general_name: raw.name,
            scientific_name: first_name(&raw.scientific_name),
            cycle: raw.cycle,
            botanist_name: raw.botanist.name,
            email: raw.botanist.email,
            phone: raw.botanist.phone,
            recorded_at,
            temperature: raw.temperature,
            soil_moisture: raw.soil_moisture,
            watered_at,
            sunlight: classify_sunlight(&raw.sunlight),
        });
    }

    report.kept = rows.len();
    (rows, report)
}

/// Map the API's free-text sunlight list onto [`Sunlight`].
///
/// Any `part*` entry wins over `full sun`, which wins over `full shade`.
/// Non-list input is unrecognised.
pub fn classify_sunlight(value: &Value) -> Sunlight {
    let Value::Array(items) = value else {
        return Sunlight::Unrecognized;
    };
    let entries: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .collect();

    if entries.iter().any(|s| s.starts_with("part")) {
        Sunlight::PartialSun
    } else if entries.iter().any(|s| s == "full sun") {
        Sunlight::FullSun
    } else if entries.iter().any(|s| s == "full shade") {
        Sunlight::FullShade
    } else {
        Sunlight::Unrecognized
    }
}

pub fn parse_recording_taken(text: &str) -> Option<DateTime<Tz>> {
    let naive = parse_naive(text, &RECORDING_FORMATS)?;
    Some(Utc.from_utc_datetime(&naive).with_timezone(&London))
}

pub fn parse_last_watered(text: &str) -> Option<DateTime<Tz>> {
    let naive = parse_naive(text, &WATERED_FORMATS)?;
    match London.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        // autumn fold: the earlier of the two instants
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        // spring gap
        LocalResult::None => None,
    }
}

fn parse_naive(text: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    let text = text.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn moisture_is_valid(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn temperature_is_plausible(value: f64) -> bool {
    value.is_finite() && (MIN_PLAUSIBLE_TEMP_C..=MAX_PLAUSIBLE_TEMP_C).contains(&value)
}

fn first_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::extract::tests::sample_reading;
    use serde_json::json;

    #[test]
    fn sunlight_priorities() {
        assert_eq!(classify_sunlight(&json!(["part shade"])), Sunlight::PartialSun);
        assert_eq!(classify_sunlight(&json!(["part sun"])), Sunlight::PartialSun);
        assert_eq!(classify_sunlight(&json!(["part sun/part shade"])), Sunlight::PartialSun);
        // partial takes priority
        assert_eq!(classify_sunlight(&json!(["part sun", "full sun"])), Sunlight::PartialSun);
        assert_eq!(classify_sunlight(&json!(["full shade", "full sun"])), Sunlight::FullSun);
        assert_eq!(classify_sunlight(&json!(["Full Sun"])), Sunlight::FullSun);
        assert_eq!(classify_sunlight(&json!(["full shade"])), Sunlight::FullShade);
    }

    #[test]
    fn unrecognised_sunlight() {
        assert_eq!(classify_sunlight(&json!(["unknown"])), Sunlight::Unrecognized);
        assert_eq!(classify_sunlight(&json!(["very sunny"])), Sunlight::Unrecognized);
        assert_eq!(classify_sunlight(&json!(["extremely sunny", "very hot"])), Sunlight::Unrecognized);
        assert_eq!(classify_sunlight(&json!("sunny")), Sunlight::Unrecognized);
        assert_eq!(classify_sunlight(&json!(5)), Sunlight::Unrecognized);
        assert_eq!(classify_sunlight(&Value::Null), Sunlight::Unrecognized);
        assert_eq!(classify_sunlight(&json!([])), Sunlight::Unrecognized);
    }

    #[test]
    fn timestamps_use_london_time() {
        let recorded = parse_recording_taken("2023-08-29 13:45:43").expect("recording_taken");
        let watered = parse_last_watered("Mon, 28 Aug 2023 14:56:18 GMT").expect("last_watered");

        assert_eq!(recorded.format("%Y-%m-%d %H:%M:%S%:z").to_string(), "2023-08-29 14:45:43+01:00");
        assert_eq!(watered.format("%Y-%m-%d %H:%M:%S%:z").to_string(), "2023-08-28 14:56:18+01:00");
    }

    #[test]
    fn winter_timestamps_have_zero_offset() {
        let recorded = parse_recording_taken("2023-12-01 09:00:00").unwrap();
        assert_eq!(recorded.to_rfc3339(), "2023-12-01T09:00:00+00:00");
    }

    #[test]
    fn spring_gap_is_unparseable_and_fold_takes_earliest() {
        // clocks went forward at 01:00 on 26 March 2023
        assert!(parse_last_watered("Sun, 26 Mar 2023 01:30:00 GMT").is_none());
        // clocks went back at 02:00 BST on 29 October 2023
        let fold = parse_last_watered("Sun, 29 Oct 2023 01:30:00 GMT").unwrap();
        assert_eq!(fold.to_rfc3339(), "2023-10-29T01:30:00+01:00");
    }

    #[test]
    fn flattens_botanist_and_names() {
        let (rows, report) = clean(vec![sample_reading(3)]);
        assert_eq!(report.kept, 1);
        let row = &rows[0];
        assert_eq!(row.botanist_name, "Gertrude Jekyll");
        assert_eq!(row.email.as_deref(), Some("gertrude.jekyll@lnhm.co.uk"));
        assert_eq!(row.phone.as_deref(), Some("001-481-273-3691x127"));
        assert_eq!(row.general_name, "Plant 3");
        assert_eq!(row.scientific_name.as_deref(), Some("Plantus numerus 3"));
        assert_eq!(row.sunlight, Sunlight::FullSun);
    }

    #[test]
    fn drops_negative_moisture_and_keeps_order() {
        let mut dry = sample_reading(2);
        dry.soil_moisture = -0.5;
        let mut zero = sample_reading(4);
        zero.soil_moisture = 0.0;
        let batch = vec![sample_reading(1), dry, sample_reading(3), zero];

        let (rows, report) = clean(batch);
        let ids: Vec<i64> = rows.iter().map(|r| r.plant_id.0).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(report.negative_moisture, 1);
        assert!(rows.iter().all(|r| r.soil_moisture >= 0.0));
    }

    #[test]
    fn moisture_filter_is_idempotent() {
        let mut wet = sample_reading(1);
        wet.soil_moisture = 99.0;
        let mut dry = sample_reading(2);
        dry.soil_moisture = -12.0;
        let (once, _) = clean(vec![wet, dry]);

        let survivors: Vec<RawReading> = once
            .iter()
            .map(|r| {
                let mut raw = sample_reading(r.plant_id.0);
                raw.soil_moisture = r.soil_moisture;
                raw
            })
            .collect();
        let (twice, report) = clean(survivors);
        assert_eq!(twice, once);
        assert_eq!(report.dropped(), 0);
    }

    #[test]
    fn drops_implausible_temperature_and_bad_timestamps() {
        let mut hot = sample_reading(1);
        hot.temperature = 612.0;
        let mut nan = sample_reading(2);
        nan.temperature = f64::NAN;
        let mut garbled = sample_reading(3);
        garbled.recording_taken = "yesterday".to_string();

        let (rows, report) = clean(vec![hot, nan, garbled, sample_reading(4)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(report.implausible_temperature, 2);
        assert_eq!(report.bad_timestamp, 1);
    }
}
