use crate::error::{EcoError, Result};
use crate::models::achievement::UnlockedAchievements;
use crate::models::classroom::Classroom;
use crate::models::issue::IssueSet;
use crate::models::progression::{ProgressStats, ProgressionState};
use crate::store::{ClassroomStore, ProgressionStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DB_SCHEMA_VERSION: i64 = 2;

pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        // Written by a newer build; keep going for forward-compatible changes.
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS progression (
            user_id TEXT PRIMARY KEY,
            total_points INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 1,
            previous_issues_json TEXT NOT NULL DEFAULT '[]',
            stats_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS unlocked_achievements (
            user_id TEXT NOT NULL,
            achievement_id TEXT NOT NULL,
            unlocked_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, achievement_id)
        );

        CREATE TABLE IF NOT EXISTS classrooms (
            classroom_id TEXT PRIMARY KEY,
            pin TEXT,
            created_at INTEGER NOT NULL,
            classroom_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT 0
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_unlocked_achievements_user ON unlocked_achievements(user_id);
        CREATE INDEX IF NOT EXISTS idx_classrooms_updated_at ON classrooms(updated_at);
        ",
    )
}

/// SQLite-backed store for progression, achievements and classrooms.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens `<workspace>/.ecolens/state.db`, creating it when missing.
    pub fn open(workspace_path: &str) -> Result<Self> {
        let dir = Path::new(workspace_path).join(".ecolens");
        std::fs::create_dir_all(&dir)
            .map_err(|e| EcoError::Persistence(format!("Failed to create .ecolens directory: {e}")))?;
        let conn = Connection::open(dir.join("state.db"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EcoError::Persistence("Connection lock poisoned".to_string()))
    }
}

impl ProgressionStore for SqliteStore {
    fn load_progression(&self, user_id: &str) -> Result<Option<ProgressionState>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT total_points, level, previous_issues_json, stats_json FROM progression WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((total_points, level, issues_json, stats_json)) = row else {
            return Ok(None);
        };

        let previous_issues: IssueSet = serde_json::from_str(&issues_json)?;
        let stats: ProgressStats = serde_json::from_str(&stats_json)?;

        Ok(Some(ProgressionState {
            total_points: total_points.max(0) as u64,
            level: level.max(1) as u32,
            previous_issues,
            stats,
        }))
    }

    fn save_progression(&self, user_id: &str, state: &ProgressionState) -> Result<()> {
        let issues_json = serde_json::to_string(&state.previous_issues)?;
        let stats_json = serde_json::to_string(&state.stats)?;
        let now = chrono::Utc::now().timestamp();

        self.conn()?.execute(
            "
            INSERT INTO progression (user_id, total_points, level, previous_issues_json, stats_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                total_points = excluded.total_points,
                level = excluded.level,
                previous_issues_json = excluded.previous_issues_json,
                stats_json = excluded.stats_json,
                updated_at = excluded.updated_at
            ",
            params![
                user_id,
                state.total_points as i64,
                state.level as i64,
                issues_json,
                stats_json,
                now,
            ],
        )?;
        Ok(())
    }

    fn load_achievements(&self, user_id: &str) -> Result<UnlockedAchievements> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT achievement_id FROM unlocked_achievements WHERE user_id = ?1 ORDER BY unlocked_at ASC",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids.into_iter().collect())
    }

    /// Grants are append-only; an empty set is an explicit reset.
    fn save_achievements(&self, user_id: &str, unlocked: &UnlockedAchievements) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        if unlocked.is_empty() {
            tx.execute(
                "DELETE FROM unlocked_achievements WHERE user_id = ?1",
                params![user_id],
            )?;
        } else {
            let now = chrono::Utc::now().timestamp();
            for id in unlocked.iter() {
                tx.execute(
                    "INSERT OR IGNORE INTO unlocked_achievements (user_id, achievement_id, unlocked_at) VALUES (?1, ?2, ?3)",
                    params![user_id, id, now],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl ClassroomStore for SqliteStore {
    fn load_classroom(&self, classroom_id: &str) -> Result<Option<Classroom>> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT classroom_json FROM classrooms WHERE classroom_id = ?1",
                params![classroom_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|raw| serde_json::from_str::<Classroom>(&raw).map_err(EcoError::from))
            .transpose()
    }

    fn save_classroom(&self, classroom: &Classroom) -> Result<()> {
        let json = serde_json::to_string(classroom)?;
        let now = chrono::Utc::now().timestamp();

        self.conn()?.execute(
            "
            INSERT INTO classrooms (classroom_id, pin, created_at, classroom_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(classroom_id) DO UPDATE SET
                pin = excluded.pin,
                classroom_json = excluded.classroom_json,
                updated_at = excluded.updated_at
            ",
            params![
                classroom.classroom_id,
                classroom.pin.as_deref(),
                classroom.created_at_ms,
                json,
                now,
            ],
        )?;
        Ok(())
    }
}
