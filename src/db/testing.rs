//! Database access for tests that need PostgreSQL.
//!
//! Set `TEST_DATABASE_URL` to run them; each connection lives inside a test
//! transaction that is rolled back when it is dropped.

use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use std::sync::Mutex;

static MIGRATED: Mutex<bool> = Mutex::new(false);

pub fn test_connection() -> Option<PgConnection> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping database test");
        return None;
    };
    let mut conn = PgConnection::establish(&url).expect("connect to TEST_DATABASE_URL");
    {
        let mut migrated = MIGRATED.lock().unwrap_or_else(|e| e.into_inner());
        if !*migrated {
            conn.run_pending_migrations(crate::MIGRATIONS).expect("apply migrations");
            *migrated = true;
        }
    }
    conn.begin_test_transaction().expect("begin test transaction");
    Some(conn)
}
