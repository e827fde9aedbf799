//! Wire types for the plants API and the closed enumerations derived from them.
//!
//! Notes
//! - `RawReading` mirrors one `GET /plants/{id}` body. Keys the cleaner needs are
//!   mandatory; a body missing any of them fails to deserialize and is skipped.
//! - `sunlight` and `scientific_name` stay as `serde_json::Value` because the API
//!   reports them as lists of free text, and occasionally as something else.

use crate::utils::serde_enum_name;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlantId(pub i64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotanistDetails {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub plant_id: PlantId,
    /// General (common) name of the plant.
    pub name: String,
    #[serde(default)]
    pub scientific_name: Value,
    #[serde(default)]
    pub cycle: Option<String>,
    pub botanist: BotanistDetails,
    /// UTC timestamp without offset, e.g. `2023-08-29 13:45:43`.
    pub recording_taken: String,
    /// Local London time rendered with a misleading `GMT` suffix,
    /// e.g. `Mon, 28 Aug 2023 14:56:18 GMT`.
    pub last_watered: String,
    pub temperature: f64,
    pub soil_moisture: f64,
    #[serde(default)]
    pub sunlight: Value,
}

/// Body of `GET /`, used to size the plant ID space.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSummary {
    #[serde(default)]
    pub plants_on_display: Option<u32>,
}

/// Sunlight requirement after normalisation of the API's free text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sunlight {
    PartialSun,
    FullSun,
    FullShade,
    /// Anything else, including non-list input. Stored as NULL.
    Unrecognized,
}

impl Sunlight {
    /// Value for the nullable `recording.sunlight` column.
    pub fn column_value(self) -> Option<String> {
        match self {
            Sunlight::Unrecognized => None,
            other => serde_enum_name(&other),
        }
    }
}
