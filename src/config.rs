//! Runtime configuration, read once from the environment at startup.
//! Defaults target a local PostgreSQL and the public plants API.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://data-eng-plants-api.herokuapp.com";
pub const DEFAULT_PLANT_ID_MAX: u32 = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CYCLE_SECS: u64 = 60;
pub const DEFAULT_TRAILING_WINDOW_SECS: u64 = 15 * 60;
pub const DEFAULT_OUTLIER_TOLERANCE: f64 = 0.25;
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_HANDOFF_PATH: &str = "data/live_plants.json";

/// What the outlier filter does with a plant that has no trailing average yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MissingBaseline {
    /// Keep the reading; it becomes the plant's first baseline sample.
    Admit,
    /// Drop the reading until a baseline exists.
    Hold,
}

impl FromStr for MissingBaseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admit" => Ok(MissingBaseline::Admit),
            "hold" => Ok(MissingBaseline::Hold),
            other => Err(format!("expected `admit` or `hold`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub api_base_url: String,
    /// Inclusive upper bound of the plant ID space `0..=plant_id_max`.
    pub plant_id_max: u32,
    /// Ask the API how many plants are on display before each harvest.
    pub discover_plant_count: bool,
    pub request_timeout: Duration,
    pub cycle_interval: Duration,
    pub trailing_window: Duration,
    /// Accepted deviation from the trailing average, as a fraction of it.
    pub outlier_tolerance: f64,
    pub missing_baseline: MissingBaseline,
    pub retention: Duration,
    pub handoff_path: PathBuf,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => compose_conninfo(
                &get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                &get("DB_PORT").unwrap_or_else(|| "5432".to_string()),
                &get("DB_NAME").unwrap_or_else(|| "plants".to_string()),
                &get("DB_USERNAME")
                    .or_else(|| get("DB_USER"))
                    .unwrap_or_else(|| "postgres".to_string()),
                &get("DB_PASSWORD").unwrap_or_else(|| "postgres".to_string()),
            ),
        };

        let plant_id_max = parse_or(&get, "PLANT_ID_MAX", DEFAULT_PLANT_ID_MAX)?;
        let request_timeout_secs = parse_or(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let cycle_secs = parse_or(&get, "CYCLE_INTERVAL_SECS", DEFAULT_CYCLE_SECS)?;
        let trailing_secs = parse_or(&get, "TRAILING_WINDOW_SECS", DEFAULT_TRAILING_WINDOW_SECS)?;
        let retention_secs = parse_or(&get, "RETENTION_SECS", DEFAULT_RETENTION_SECS)?;
        let outlier_tolerance = parse_or(&get, "OUTLIER_TOLERANCE", DEFAULT_OUTLIER_TOLERANCE)?;
        let missing_baseline = parse_or(&get, "OUTLIER_MISSING_BASELINE", MissingBaseline::Admit)?;

        if request_timeout_secs == 0 {
            return Err("REQUEST_TIMEOUT_SECS must be greater than zero".to_string());
        }
        if cycle_secs == 0 {
            return Err("CYCLE_INTERVAL_SECS must be greater than zero".to_string());
        }
        if !(0.0..1.0).contains(&outlier_tolerance) {
            return Err("OUTLIER_TOLERANCE must be in [0, 1)".to_string());
        }

        Ok(Config {
            database_url,
            api_base_url: get("PLANTS_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            plant_id_max,
            discover_plant_count: flag(&get, "DISCOVER_PLANT_COUNT", false),
            request_timeout: Duration::from_secs(request_timeout_secs),
            cycle_interval: Duration::from_secs(cycle_secs),
            trailing_window: Duration::from_secs(trailing_secs),
            outlier_tolerance,
            missing_baseline,
            retention: Duration::from_secs(retention_secs),
            handoff_path: PathBuf::from(get("HANDOFF_PATH").unwrap_or_else(|| DEFAULT_HANDOFF_PATH.to_string())),
            run_migrations: flag(&get, "RUN_MIGRATIONS", true),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| format!("{} is invalid ({}): {}", key, raw, e)),
        None => Ok(default),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    get(key)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// libpq keyword/value connection string; values are always quoted.
fn compose_conninfo(host: &str, port: &str, dbname: &str, user: &str, password: &str) -> String {
    format!(
        "host={} port={} dbname={} user={} password={}",
        quote_conninfo(host),
        quote_conninfo(port),
        quote_conninfo(dbname),
        quote_conninfo(user),
        quote_conninfo(password)
    )
}

fn quote_conninfo(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
