//! Durable storage for the display state
//!
//! The in-memory copy held by the coordinator is authoritative while the
//! process runs; the store only has to bring it back after a restart.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, SyncError};
use crate::state::{DisplayState, FormattingInput};

/// Load/save contract for the single display state
pub trait StateStore: Send + Sync {
    /// Last persisted state, or defaults. Never fails: unreadable storage is
    /// logged and treated as empty.
    fn load(&self) -> DisplayState;

    /// Persist the full state in one atomic write
    fn save(&self, state: &DisplayState) -> Result<()>;
}

/// Columns added after the first schema; older databases get them via ALTER TABLE
const MIGRATED_COLUMNS: &[(&str, &str)] = &[
    ("prize_text", "TEXT DEFAULT ''"),
    ("text_color", "TEXT DEFAULT '#FFFFFF'"),
    ("text_style", "TEXT DEFAULT 'bold'"),
    ("display_text_size", "INTEGER DEFAULT 72"),
    ("timer_size", "INTEGER DEFAULT 48"),
    ("columns", "INTEGER DEFAULT 1"),
    ("prize_size", "INTEGER DEFAULT 32"),
    ("updated_at", "TEXT"),
];

/// SQLite-backed store keeping one `settings` row (id = 1)
pub struct SqliteStateStore {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn, db_path)
    }

    /// Open `db_path`, moving an unusable file aside and starting a fresh
    /// database in its place.
    ///
    /// The damaged file is kept as `<name>.corrupt-<timestamp>` next to the
    /// original.
    pub fn open_or_recover<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        match Self::new(db_path) {
            Err(SyncError::Storage(e)) if db_path.is_file() => {
                let aside = corrupt_path(db_path);
                tracing::error!(
                    "Display state database {} is unusable ({}), moving it to {}",
                    db_path.display(),
                    e,
                    aside.display()
                );
                std::fs::rename(db_path, &aside)?;
                Self::new(db_path)
            }
            result => result,
        }
    }

    /// Database that lives only as long as the store
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        let store = Self {
            db_path,
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY,
                passport_text TEXT DEFAULT '',
                logo_path TEXT DEFAULT ''
            )",
            [],
        )?;

        let existing: Vec<String> = {
            let mut stmt = conn.prepare("PRAGMA table_info(settings)")?;
            let names = stmt.query_map([], |row| row.get::<_, String>("name"))?;
            names.collect::<rusqlite::Result<_>>()?
        };

        for (column, decl) in MIGRATED_COLUMNS {
            if !existing.iter().any(|name| name == column) {
                conn.execute(&format!("ALTER TABLE settings ADD COLUMN {} {}", column, decl), [])?;
                tracing::debug!("Added settings column {}", column);
            }
        }

        Ok(())
    }

    fn read_state(&self) -> Result<Option<DisplayState>> {
        let conn = self.lock();
        let state = conn
            .query_row(
                "SELECT passport_text, prize_text, logo_path, text_color, text_style,
                        display_text_size, timer_size, columns, prize_size, updated_at
                 FROM settings WHERE id = 1",
                [],
                |row| Self::row_to_state(row),
            )
            .optional()?;
        Ok(state)
    }

    /// Convert database row to DisplayState; NULL or out-of-range values
    /// degrade to defaults
    fn row_to_state(row: &Row) -> rusqlite::Result<DisplayState> {
        let formatting = FormattingInput {
            color: row.get("text_color")?,
            style: row.get("text_style")?,
            display_text_size: row.get("display_text_size")?,
            timer_size: row.get("timer_size")?,
            columns: row.get("columns")?,
            prize_size: row.get("prize_size")?,
        }
        .resolve();

        let updated_at: Option<String> = row.get("updated_at")?;

        Ok(DisplayState {
            text: row.get::<_, Option<String>>("passport_text")?.unwrap_or_default(),
            prize_text: row.get::<_, Option<String>>("prize_text")?.unwrap_or_default(),
            formatting,
            logo_path: row.get::<_, Option<String>>("logo_path")?.unwrap_or_default(),
            updated_at: updated_at.as_deref().and_then(parse_timestamp),
        })
    }
}

fn corrupt_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
    db_path.with_file_name(name)
}

/// RFC 3339, or a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` taken as UTC (SQLite
/// `CURRENT_TIMESTAMP` and older databases)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> DisplayState {
        match self.read_state() {
            Ok(Some(state)) => state,
            Ok(None) => DisplayState::default(),
            Err(e) => {
                tracing::warn!(
                    "Failed to read display state from {}: {}. Using defaults",
                    self.db_path.display(),
                    e
                );
                DisplayState::default()
            }
        }
    }

    fn save(&self, state: &DisplayState) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let updated_at = state.updated_at.unwrap_or_else(Utc::now).to_rfc3339();
        let f = &state.formatting;

        tx.execute(
            "INSERT INTO settings (
                id, passport_text, prize_text, logo_path, text_color, text_style,
                display_text_size, timer_size, columns, prize_size, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                passport_text = excluded.passport_text,
                prize_text = excluded.prize_text,
                logo_path = excluded.logo_path,
                text_color = excluded.text_color,
                text_style = excluded.text_style,
                display_text_size = excluded.display_text_size,
                timer_size = excluded.timer_size,
                columns = excluded.columns,
                prize_size = excluded.prize_size,
                updated_at = excluded.updated_at",
            params![
                state.text,
                state.prize_text,
                state.logo_path,
                f.color,
                f.style.as_str(),
                f.base_text_size_px,
                f.timer_size_px,
                f.columns,
                f.prize_size_px,
                updated_at,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}

/// Non-durable store, used for `--ephemeral` runs and tests
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<DisplayState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: DisplayState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> DisplayState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }

    fn save(&self, state: &DisplayState) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }
}
