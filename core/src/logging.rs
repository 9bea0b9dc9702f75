//! Structured diagnostics.
//!
//! Events go to the `log` facade for whoever installed a logger and, when a
//! database is attached, into the `event_log` table so the UI can show an
//! activity history.

use r2d2_sqlite::rusqlite::{params, Connection};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::DbPool;

/// Rows kept in `event_log`; older ones are pruned as new ones arrive.
pub const EVENT_LOG_RETENTION: usize = 5_000;

pub fn log_event(
    conn: &Connection,
    level: &str,
    code: Option<&str>,
    module: &str,
    message: &str,
    explain: Option<&str>,
    data: Option<Value>,
) -> rusqlite::Result<()> {
    let id = Uuid::new_v4().to_string();
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    let data_str = data.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO event_log (id, ts, level, code, module, message, explain, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, ts, level, code, module, message, explain, data_str],
    )?;
    Ok(())
}

/// Delete all but the newest `keep` rows. Returns how many were removed.
pub fn prune_events(conn: &Connection, keep: usize) -> rusqlite::Result<usize> {
    let keep = i64::try_from(keep).unwrap_or(i64::MAX);
    conn.execute(
        "DELETE FROM event_log WHERE id IN (SELECT id FROM event_log ORDER BY ts DESC, rowid DESC LIMIT -1 OFFSET ?1)",
        params![keep],
    )
}

/// Persist an event from async code without blocking the caller.
///
/// Must be called from within a tokio runtime. The table is capped at
/// [`EVENT_LOG_RETENTION`] rows. Failures to write are
/// reported through `log` and otherwise dropped.
pub fn spawn_event(
    pool: &DbPool,
    level: &'static str,
    code: &'static str,
    module: &'static str,
    message: &'static str,
    explain: Option<&'static str>,
    data: Value,
) {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let result = pool
            .get()
            .map_err(|err| err.to_string())
            .and_then(|conn| {
                log_event(&conn, level, Some(code), module, message, explain, Some(data))
                    .and_then(|()| prune_events(&conn, EVENT_LOG_RETENTION))
                    .map_err(|err| err.to_string())
            });
        if let Err(err) = result {
            log::debug!(target: "prism::logging", "event {code} not persisted: {err}");
        }
    });
}
