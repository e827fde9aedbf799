//! Diesel model structs for the botanist, plant and recording tables.
//!
//! `plant.plant_id` holds the identifier assigned by the plants API, while
//! `recording.plant_id` references the storage key `plant.id`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::botanist)]
pub struct Botanist {
    pub id: i64,
    pub botanist_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::botanist)]
pub struct NewBotanist {
    pub botanist_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::plant)]
#[diesel(belongs_to(Botanist))]
pub struct Plant {
    pub id: i64,
    pub general_name: String,
    pub scientific_name: Option<String>,
    pub cycle: Option<String>,
    pub plant_id: i64,
    pub botanist_id: i64,
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::plant)]
pub struct NewPlant {
    pub general_name: String,
    pub scientific_name: Option<String>,
    pub cycle: Option<String>,
    pub plant_id: i64,
    pub botanist_id: i64,
}

// Append-only; rows leave only through the retention sweep.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::recording)]
#[diesel(belongs_to(Plant))]
pub struct Recording {
    pub id: i64,
    pub recorded: DateTime<Utc>,
    pub temperature: f64,
    pub soil_moisture: f64,
    pub watered: DateTime<Utc>,
    pub sunlight: Option<String>,
    pub plant_id: i64,
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::recording)]
pub struct NewRecording {
    pub recorded: DateTime<Utc>,
    pub temperature: f64,
    pub soil_moisture: f64,
    pub watered: DateTime<Utc>,
    pub sunlight: Option<String>,
    pub plant_id: i64,
}
