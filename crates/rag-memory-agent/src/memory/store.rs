use async_trait::async_trait;

use super::types::{Attributes, Entity, EntityType, Fact, NewFact, RelationView};
use crate::utils::error::Result;

/// Durable facts/entities/relations store behind long-term memory.
///
/// Implementations own their persistence and must create their schema on
/// first use. Entity names are the only natural key.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Pure insert, no deduplication.
    async fn save_fact(&self, fact: &NewFact) -> Result<i64>;

    /// Facts with `salience >= min_salience`, newest first.
    async fn get_facts(&self, limit: usize, min_salience: f64) -> Result<Vec<Fact>>;

    /// Insert, or update type/attributes/timestamp of the entity already
    /// stored under `name`. The returned id is stable for a given name.
    async fn save_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        attributes: &Attributes,
    ) -> Result<i64>;

    async fn get_entity(&self, name: &str) -> Result<Option<Entity>>;

    /// Every entity, newest first.
    async fn get_all_entities(&self) -> Result<Vec<Entity>>;

    /// Append a relation between two existing entity ids.
    async fn insert_relation(
        &self,
        entity1_id: i64,
        entity2_id: i64,
        relation_type: &str,
    ) -> Result<i64>;

    /// Resolve both endpoints by name and append the relation.
    ///
    /// Returns `Ok(None)` without writing anything when either name is
    /// unknown.
    async fn save_relation(
        &self,
        entity1_name: &str,
        entity2_name: &str,
        relation_type: &str,
    ) -> Result<Option<i64>> {
        let Some(entity1) = self.get_entity(entity1_name).await? else {
            return Ok(None);
        };
        let Some(entity2) = self.get_entity(entity2_name).await? else {
            return Ok(None);
        };

        self.insert_relation(entity1.id, entity2.id, relation_type)
            .await
            .map(Some)
    }

    /// Relations joined with endpoint names and types, newest first.
    async fn get_entity_relations(&self, limit: usize) -> Result<Vec<RelationView>>;

    /// Delete relations, then entities, then facts.
    async fn clear(&self) -> Result<()>;
}
