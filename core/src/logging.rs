use r2d2_sqlite::rusqlite::{params, Connection};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::DbPool;

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

/// Structured event destined for the `log` facade and, when a database is
/// configured, the `event_log` table.
pub struct EventRecord<'a> {
    pub level: log::Level,
    pub code: &'a str,
    pub module: &'a str,
    pub message: &'a str,
    pub explain: Option<&'a str>,
    pub data: Option<Value>,
}

/// Emit `record` through `log` and persist it when `pool` is present.
/// Persistence failures are reported through `log` only.
pub fn record(pool: Option<&DbPool>, record: EventRecord<'_>) {
    match &record.data {
        Some(data) => log::log!(
            target: record.module,
            record.level,
            "[{}] {} {}",
            record.code,
            record.message,
            data
        ),
        None => log::log!(target: record.module, record.level, "[{}] {}", record.code, record.message),
    }

    let Some(pool) = pool else {
        return;
    };
    let level = record.level.as_str().to_lowercase();
    match pool.get() {
        Ok(conn) => {
            if let Err(err) = log_event(
                &conn,
                &level,
                Some(record.code),
                record.module,
                record.message,
                record.explain,
                record.data,
            ) {
                log::warn!("failed to persist event {}: {err}", record.code);
            }
        }
        Err(err) => log::warn!("event log unavailable: {err}"),
    }
}

/// Like [`record`], but when a pool is present and a tokio runtime is
/// running the database write is moved onto the blocking pool.
pub fn emit(pool: Option<&DbPool>, event: EventRecord<'static>) {
    match (pool, tokio::runtime::Handle::try_current()) {
        (Some(pool), Ok(handle)) => {
            let pool = pool.clone();
            handle.spawn_blocking(move || record(Some(&pool), event));
        }
        (pool, _) => record(pool, event),
    }
}
