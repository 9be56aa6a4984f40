use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{AgentError, Result};

/// Opaque key/value attributes attached to an entity.
pub type Attributes = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Phenomenon,
    Location,
    Person,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phenomenon => "phenomenon",
            Self::Location => "location",
            Self::Person => "person",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "phenomenon" => Ok(Self::Phenomenon),
            "location" => Ok(Self::Location),
            "person" => Ok(Self::Person),
            other => Err(AgentError::InvalidRecord(format!("unknown entity type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub content: String,
    pub source: Option<String>,
    pub salience: f64,
    pub timestamp: DateTime<Utc>,
    pub success_outcome: bool,
}

/// Fact contents before the store assigns an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub content: String,
    pub source: Option<String>,
    pub salience: f64,
    pub success_outcome: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub attributes: Attributes,
    pub timestamp: DateTime<Utc>,
}

/// Directed edge between two stored entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub entity1_id: i64,
    pub entity2_id: i64,
    pub relation_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Relation joined with the names and types of both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationView {
    pub entity1: String,
    pub entity1_type: EntityType,
    pub relation_type: String,
    pub entity2: String,
    pub entity2_type: EntityType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LtmStats {
    pub total_facts: usize,
    pub total_entities: usize,
    pub total_relations: usize,
}

/// Fixed-width UTC timestamp; lexical order equals chronological order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AgentError::InvalidRecord(format!("bad timestamp '{}': {}", raw, e)))
}
