pub mod models {
    pub mod plants;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    #[cfg(test)]
    pub mod testing;
}
pub mod schema;
pub mod utils;
pub mod services {
    pub mod cycle;
    pub mod extract;
    pub mod ingest;
    pub mod outliers;
    pub mod retention;
    pub mod transform;
}

use crate::config::Config;
use crate::services::cycle::{Cycle, EtlCycle, Scheduler, SystemClock};
use crate::services::retention;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info, warn};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum RunMode {
    /// Cycle forever on the configured cadence.
    #[default]
    Loop,
    Once,
    SweepOnly,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    env_file: Option<PathBuf>,
    mode: RunMode,
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn connect(cfg: &Config) -> Result<PgConnection, String> {
    let conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");
    Ok(conn)
}

fn run(mode: RunMode) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (api={}, plant_ids=0..={}, discover_count={}, interval={}s, timeout={}s, window={}s, tolerance={}, missing_baseline={:?}, retention={}s, handoff={})",
        cfg.api_base_url,
        cfg.plant_id_max,
        cfg.discover_plant_count,
        cfg.cycle_interval.as_secs(),
        cfg.request_timeout.as_secs(),
        cfg.trailing_window.as_secs(),
        cfg.outlier_tolerance,
        cfg.missing_baseline,
        cfg.retention.as_secs(),
        cfg.handoff_path.display()
    );

    // 2) Bootstrap the schema
    if cfg.run_migrations {
        let mut conn = connect(&cfg)?;
        apply_database_migrations(&mut conn)?;
    }

    // 3) Sweep once, run one cycle, or loop (steady cadence)
    match mode {
        RunMode::SweepOnly => {
            let mut conn = connect(&cfg)?;
            let removed = retention::sweep(&mut conn, cfg.retention)?;
            info!("Removed {} recording(s) older than {}s", removed, cfg.retention.as_secs());
        }
        RunMode::Once => {
            EtlCycle::new(cfg).run_cycle()?;
        }
        RunMode::Loop => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                info!("Interrupt received; stopping after the current cycle");
                flag.store(true, Ordering::SeqCst);
            }) {
                warn!("Could not install interrupt handler: {}", e);
            }
            info!("Starting cycle loop: interval={}s", cfg.cycle_interval.as_secs());
            let scheduler = Scheduler::new(&cfg, SystemClock, cancel);
            scheduler.run(&mut EtlCycle::new(cfg));
        }
    }

    Ok(())
}

fn parse_cli(args: impl IntoIterator<Item = OsString>) -> Result<CliOptions, String> {
    let mut args = args.into_iter();
    let mut opts = CliOptions::default();

    fn set_env_file(opts: &mut CliOptions, path: PathBuf) -> Result<(), String> {
        if opts.env_file.is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
        opts.env_file = Some(path);
        Ok(())
    }

    fn set_mode(opts: &mut CliOptions, mode: RunMode) -> Result<(), String> {
        if opts.mode != RunMode::Loop {
            return Err("`--once` and `--sweep-only` are mutually exclusive".to_string());
        }
        opts.mode = mode;
        Ok(())
    }

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                set_env_file(&mut opts, PathBuf::from(value))?;
            }
            Some(s) if s.starts_with("--env-file=") => {
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                set_env_file(&mut opts, PathBuf::from(path_str))?;
            }
            Some("--once") => set_mode(&mut opts, RunMode::Once)?,
            Some("--sweep-only") => set_mode(&mut opts, RunMode::SweepOnly)?,
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    Ok(opts)
}

/// Load `.env` entries; variables already set in the process win.
fn load_env(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenv::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    dotenv::from_path(&default_path).map_err(|e| format!("failed to load {}: {}", default_path.display(), e))?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn main() {
    let (mode, loaded_env) = match parse_cli(std::env::args_os().skip(1))
        .and_then(|opts| load_env(opts.env_file).map(|loaded| (opts.mode, loaded)))
    {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "plant-monitor {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(mode) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
