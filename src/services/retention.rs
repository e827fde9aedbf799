use diesel::prelude::*;
use diesel::sql_types::Double;
use diesel::PgConnection;
use std::time::Duration;

/// Delete recordings older than `max_age` relative to the database clock.
pub fn sweep(conn: &mut PgConnection, max_age: Duration) -> Result<usize, String> {
    diesel::sql_query("DELETE FROM recording WHERE recorded < NOW() - make_interval(secs => $1)")
        .bind::<Double, _>(max_age.as_secs_f64())
        .execute(conn)
        .map_err(|e| format!("retention sweep failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewRecording;
    use crate::db::testing::test_connection;
    use crate::schema;
    use crate::services::ingest::load;
    use crate::services::ingest::tests::{recordings_for, row};
    use chrono::{Duration as ChronoDuration, Utc};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn removes_only_expired_recordings() {
        let Some(mut conn) = test_connection() else { return };
        load(&mut conn, &[row(930_001, "Test Botanist Retention")]).unwrap();

        use schema::plant::dsl as P;
        use schema::recording::dsl as R;
        let plant_pk: i64 = P::plant
            .filter(P::plant_id.eq(930_001))
            .select(P::id)
            .first(&mut conn)
            .unwrap();
        let now = Utc::now();
        let aged: Vec<NewRecording> = [25, 23]
            .into_iter()
            .map(|hours_ago| NewRecording {
                recorded: now - ChronoDuration::hours(hours_ago),
                temperature: 18.0,
                soil_moisture: 40.0,
                watered: now,
                sunlight: Some("full_shade".to_string()),
                plant_id: plant_pk,
            })
            .collect();
        diesel::insert_into(R::recording).values(&aged).execute(&mut conn).unwrap();
        assert_eq!(recordings_for(&mut conn, 930_001).len(), 3);

        sweep(&mut conn, DAY).unwrap();
        let left = recordings_for(&mut conn, 930_001);
        assert_eq!(left.len(), 2);
        let cutoff = now - ChronoDuration::hours(24);
        assert!(left.iter().all(|r| r.recorded > cutoff));

        // nothing left to expire
        let before = recordings_for(&mut conn, 930_001).len();
        sweep(&mut conn, DAY).unwrap();
        assert_eq!(recordings_for(&mut conn, 930_001).len(), before);
    }
}
