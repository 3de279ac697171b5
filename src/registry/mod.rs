//! Entity registry access.
//!
//! The registry is the persistent list of agents, cubes and obstacles that
//! in-world scripts register themselves into. This crate only reads and
//! deletes rows; it never creates them.
//!
//! Access goes through short-lived sessions: callers open a session, use it
//! for one pass, and drop it. Nothing is cached between sessions.

pub mod location;
mod sqlite;

pub use location::{parse_position, parse_region, LocationError, Position};
pub use sqlite::{SqliteRegistry, SqliteSession};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Registered entity classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    Agent,
    Cube,
    Obstacle,
}

impl EntityClass {
    /// Plural name used in logs and status messages
    pub fn label(self) -> &'static str {
        match self {
            EntityClass::Agent => "agents",
            EntityClass::Cube => "cubes",
            EntityClass::Obstacle => "obstacles",
        }
    }
}

/// A probeable entity: agent or cube
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: String,
    pub endpoint: String,
}

/// A passive entity, only tracked by when it was last seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleRecord {
    pub id: String,
    /// None when the stored timestamp could not be parsed
    pub last_update: Option<DateTime<Utc>>,
}

/// Raw name/location row, as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementRow {
    pub id: String,
    pub name: String,
    /// Object type/class for cubes, owner key for agents
    pub detail: String,
    pub location: String,
    pub position: String,
}

/// Placement with location strings parsed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub id: String,
    pub name: String,
    pub detail: String,
    pub region: String,
    pub position: Position,
}

impl TryFrom<PlacementRow> for Placement {
    type Error = LocationError;

    fn try_from(row: PlacementRow) -> Result<Self, Self::Error> {
        let region = parse_region(&row.location)?;
        let position = parse_position(&row.position)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            detail: row.detail,
            region,
            position,
        })
    }
}

/// Opens registry sessions.
pub trait Registry: Send + Sync {
    type Session: RegistrySession + Send;

    /// Open a session; failure means the registry is unreachable right now
    fn open(&self) -> Result<Self::Session>;
}

/// Read/delete operations within one session.
///
/// Delete operations return the number of rows removed, or `None` when the
/// backend cannot report it.
pub trait RegistrySession {
    /// `{id, endpoint}` for every agent or cube, ordered by name
    fn list_endpoints(&self, class: EntityClass) -> Result<Vec<EntityRecord>>;

    /// Every obstacle with its last update time, ordered by name
    fn list_obstacles(&self) -> Result<Vec<ObstacleRecord>>;

    /// Delete rows of `class` whose id is in `ids`
    fn delete(&self, class: EntityClass, ids: &[String]) -> Result<Option<usize>>;

    /// Name and location rows for agents (keyed by owner) or cubes
    /// (excluding bot controllers), ordered by name
    fn list_placements(&self, class: EntityClass) -> Result<Vec<PlacementRow>>;
}
