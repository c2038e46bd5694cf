//! Create sample SQLite database with demo flight data

use std::path::Path;

use rusqlite::{Connection, Result};

const STATES: [&str; 8] = ["CA", "NY", "TX", "FL", "IL", "WA", "GA", "CO"];
const CARRIERS: [&str; 6] = ["AA", "UA", "DL", "WN", "AS", "B6"];

/// Create and populate the `flights` table
pub fn create_sample_database(path: &Path) -> Result<()> {
    let mut conn = Connection::open(path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS flights (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dest_state TEXT,
            carrier TEXT,
            dep_time TIMESTAMP,
            dep_delay REAL,
            arr_delay REAL,
            distance REAL
        );
        DELETE FROM flights;
        ",
    )?;

    tracing::info!(path = %path.display(), "generating flight data");
    let tx = conn.transaction()?;
    generate_flights(&tx, 5000)?;
    tx.commit()?;

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_flights_dep_time ON flights(dep_time);
        CREATE INDEX IF NOT EXISTS idx_flights_carrier ON flights(carrier);
        ",
    )?;
    Ok(())
}

fn generate_flights(conn: &Connection, count: i64) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO flights (dest_state, carrier, dep_time, dep_delay, arr_delay, distance)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    let mut rng = 42u32;
    let base_time = chrono::NaiveDate::from_ymd_opt(2008, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    for i in 0..count {
        let dep_time = base_time + chrono::Duration::minutes(i * 7 + (random_int(&mut rng) % 7) as i64);
        let dest_state = STATES[random_int(&mut rng) as usize % STATES.len()];
        let carrier = CARRIERS[random_int(&mut rng) as usize % CARRIERS.len()];

        // Mostly on time, with a long tail of late departures
        let dep_delay = if random_float(&mut rng) < 0.7 {
            random_float(&mut rng) * 15.0 - 5.0
        } else {
            random_float(&mut rng).powi(2) * 180.0
        };
        let arr_delay = dep_delay + random_float(&mut rng) * 20.0 - 10.0;
        let distance = 150.0 + random_float(&mut rng) * 2500.0;

        stmt.execute((
            dest_state,
            carrier,
            dep_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            dep_delay,
            arr_delay,
            distance,
        ))?;
    }
    Ok(())
}

fn random_float(seed: &mut u32) -> f64 {
    (random_int(seed) as f64) / (u32::MAX as f64)
}

fn random_int(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}
