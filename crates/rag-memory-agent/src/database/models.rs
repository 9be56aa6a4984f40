use sqlx::FromRow;

use crate::memory::types::{parse_timestamp, Attributes, Entity, Fact, RelationView};
use crate::utils::error::{AgentError, Result};

#[derive(Debug, Clone, FromRow)]
pub struct FactRow {
    pub id: i64,
    pub content: String,
    pub source: Option<String>,
    pub salience: f64,
    pub timestamp: String,
    pub success_outcome: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct EntityRow {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub entity_type: String,
    pub attributes: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RelationViewRow {
    pub entity1_name: String,
    pub entity1_type: String,
    pub relation_type: String,
    pub entity2_name: String,
    pub entity2_type: String,
    pub timestamp: String,
}

impl TryFrom<FactRow> for Fact {
    type Error = AgentError;

    fn try_from(row: FactRow) -> Result<Self> {
        Ok(Fact {
            id: row.id,
            content: row.content,
            source: row.source,
            salience: row.salience,
            timestamp: parse_timestamp(&row.timestamp)?,
            success_outcome: row.success_outcome,
        })
    }
}

impl TryFrom<EntityRow> for Entity {
    type Error = AgentError;

    fn try_from(row: EntityRow) -> Result<Self> {
        let attributes = match row.attributes.as_deref() {
            Some(raw) => serde_json::from_str::<Attributes>(raw)?,
            None => Attributes::new(),
        };

        Ok(Entity {
            id: row.id,
            name: row.name,
            entity_type: row.entity_type.parse()?,
            attributes,
            timestamp: parse_timestamp(&row.timestamp)?,
        })
    }
}

impl TryFrom<RelationViewRow> for RelationView {
    type Error = AgentError;

    fn try_from(row: RelationViewRow) -> Result<Self> {
        Ok(RelationView {
            entity1: row.entity1_name,
            entity1_type: row.entity1_type.parse()?,
            relation_type: row.relation_type,
            entity2: row.entity2_name,
            entity2_type: row.entity2_type.parse()?,
            timestamp: parse_timestamp(&row.timestamp)?,
        })
    }
}

/// Empty attribute maps are stored as NULL.
pub fn encode_attributes(attributes: &Attributes) -> Result<Option<String>> {
    if attributes.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(attributes)?))
}
