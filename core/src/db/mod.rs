use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_db(db_path: PathBuf) -> Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    enable_wal(&db_path)?;
    let mgr = SqliteConnectionManager::file(&db_path)
        .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
    let pool = Pool::new(mgr)?;
    {
        let conn = pool.get()?;
        apply_migrations(&conn)?;
    }
    Ok(pool)
}

// WAL is persistent in the database file, so it is switched on once before
// the pool opens its connections. Readers then never block the writer.
fn enable_wal(db_path: &Path) -> Result<()> {
    let conn = Connection::open(db_path)?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("failed to enable WAL journal")?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("database stayed in {mode} journal mode");
    }
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    let migrations: &[(&str, &str)] = &[
        (
            "0001_sessions.sql",
            include_str!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/../migrations/0001_sessions.sql"
            )),
        ),
        (
            "0002_event_log.sql",
            include_str!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/../migrations/0002_event_log.sql"
            )),
        ),
    ];

    for (name, sql) in migrations {
        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration {name}"))?;
    }
    Ok(())
}
