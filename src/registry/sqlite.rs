use super::{EntityClass, EntityRecord, ObstacleRecord, PlacementRow, Registry, RegistrySession};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};

/// SQLite-backed entity registry.
///
/// # Schema
/// ```sql
/// CREATE TABLE agents (
///     uuid TEXT PRIMARY KEY,
///     name TEXT, owner_key TEXT,
///     location TEXT, position TEXT,
///     perm_url TEXT,                   -- endpoint probed by the sweeper
///     last_update TEXT
/// );
/// CREATE TABLE positions (            -- cubes
///     uuid TEXT PRIMARY KEY,
///     name TEXT, object_type TEXT, object_class TEXT,
///     location TEXT, position TEXT,
///     perm_url TEXT,
///     last_update TEXT
/// );
/// CREATE TABLE obstacles (
///     uuid TEXT PRIMARY KEY,
///     name TEXT, position TEXT,
///     last_update TEXT                 -- RFC 3339 or "YYYY-MM-DD HH:MM:SS" (UTC)
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    path: PathBuf,
}

impl SqliteRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Registry for SqliteRegistry {
    type Session = SqliteSession;

    fn open(&self) -> Result<SqliteSession> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open registry {}", self.path.display()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                owner_key TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                position TEXT NOT NULL DEFAULT '',
                perm_url TEXT NOT NULL DEFAULT '',
                last_update TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS positions (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                object_type TEXT NOT NULL DEFAULT '',
                object_class TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                position TEXT NOT NULL DEFAULT '',
                perm_url TEXT NOT NULL DEFAULT '',
                last_update TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS obstacles (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                position TEXT NOT NULL DEFAULT '',
                last_update TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .context("Failed to create registry schema")?;

        Ok(SqliteSession { conn })
    }
}

/// One open registry connection; closed on drop
pub struct SqliteSession {
    conn: Connection,
}

fn table(class: EntityClass) -> &'static str {
    match class {
        EntityClass::Agent => "agents",
        EntityClass::Cube => "positions",
        EntityClass::Obstacle => "obstacles",
    }
}

/// Parse a stored timestamp; SQL-style datetimes are taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl RegistrySession for SqliteSession {
    fn list_endpoints(&self, class: EntityClass) -> Result<Vec<EntityRecord>> {
        if class == EntityClass::Obstacle {
            bail!("obstacles have no endpoint");
        }

        let sql = format!("SELECT uuid, perm_url FROM {} ORDER BY name", table(class));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare {} query", class.label()))?;

        let records = stmt
            .query_map([], |row| {
                Ok(EntityRecord {
                    id: row.get(0)?,
                    endpoint: row.get(1)?,
                })
            })
            .with_context(|| format!("Failed to query {}", class.label()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read {} rows", class.label()))?;

        Ok(records)
    }

    fn list_obstacles(&self) -> Result<Vec<ObstacleRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, last_update FROM obstacles ORDER BY name")
            .context("Failed to prepare obstacles query")?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let last_update: String = row.get(1)?;
                Ok((id, last_update))
            })
            .context("Failed to query obstacles")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read obstacle rows")?;

        Ok(rows
            .into_iter()
            .map(|(id, raw)| ObstacleRecord {
                last_update: parse_timestamp(&raw),
                id,
            })
            .collect())
    }

    fn delete(&self, class: EntityClass, ids: &[String]) -> Result<Option<usize>> {
        if ids.is_empty() {
            return Ok(Some(0));
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM {} WHERE uuid IN ({})",
            table(class),
            placeholders
        );

        let removed = self
            .conn
            .execute(&sql, params_from_iter(ids.iter()))
            .with_context(|| format!("Failed to delete {}", class.label()))?;

        Ok(Some(removed))
    }

    fn list_placements(&self, class: EntityClass) -> Result<Vec<PlacementRow>> {
        let sql = match class {
            EntityClass::Agent => {
                "SELECT owner_key, name, owner_key, location, position \
                 FROM agents ORDER BY name"
            }
            EntityClass::Cube => {
                "SELECT uuid, name, object_type || '/' || object_class, location, position \
                 FROM positions WHERE object_type <> 'Bot Controller' ORDER BY name"
            }
            EntityClass::Obstacle => bail!("obstacles have no placement"),
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare {} placement query", class.label()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(PlacementRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    detail: row.get(2)?,
                    location: row.get(3)?,
                    position: row.get(4)?,
                })
            })
            .with_context(|| format!("Failed to query {} placements", class.label()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read {} placement rows", class.label()))?;

        Ok(rows)
    }
}
