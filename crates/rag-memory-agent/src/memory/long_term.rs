use std::sync::Arc;
use tracing::{debug, warn};

use super::store::KnowledgeStore;
use super::types::{Attributes, Entity, EntityType, Fact, LtmStats, NewFact, RelationView};
use crate::config::MemoryConfig;
use crate::database::SqliteKnowledgeStore;
use crate::utils::error::{AgentError, Result};

/// Cross-session memory of facts, entities and relations.
///
/// Records are validated here before they reach the backing store.
#[derive(Clone)]
pub struct LongTermMemory {
    store: Arc<dyn KnowledgeStore>,
}

impl LongTermMemory {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Opens (creating if needed) the SQLite store at `config.ltm_db_path`.
    pub async fn open(config: &MemoryConfig) -> Result<Self> {
        let store = SqliteKnowledgeStore::open(config).await?;
        Ok(Self::new(Arc::new(store)))
    }

    pub async fn save_fact(
        &self,
        content: &str,
        source: Option<&str>,
        salience: f64,
        success_outcome: bool,
    ) -> Result<i64> {
        if !(0.0..=1.0).contains(&salience) {
            return Err(AgentError::InvalidRecord(format!(
                "salience must be within [0, 1], got {}",
                salience
            )));
        }

        let fact = NewFact {
            content: content.to_string(),
            source: source.map(str::to_string),
            salience,
            success_outcome,
        };
        let id = self.store.save_fact(&fact).await?;
        debug!(fact_id = id, salience, "Saved fact");
        Ok(id)
    }

    pub async fn get_facts(&self, limit: usize, min_salience: f64) -> Result<Vec<Fact>> {
        self.store.get_facts(limit, min_salience).await
    }

    pub async fn save_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        attributes: &Attributes,
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(AgentError::InvalidRecord("entity name must not be empty".to_string()));
        }
        self.store.save_entity(name, entity_type, attributes).await
    }

    pub async fn get_entity(&self, name: &str) -> Result<Option<Entity>> {
        self.store.get_entity(name).await
    }

    pub async fn get_all_entities(&self) -> Result<Vec<Entity>> {
        self.store.get_all_entities().await
    }

    /// Returns `Ok(None)` and writes nothing when either endpoint is unknown.
    pub async fn save_relation(
        &self,
        entity1_name: &str,
        entity2_name: &str,
        relation_type: &str,
    ) -> Result<Option<i64>> {
        if relation_type.trim().is_empty() {
            return Err(AgentError::InvalidRecord("relation type must not be empty".to_string()));
        }

        let id = self
            .store
            .save_relation(entity1_name, entity2_name, relation_type)
            .await?;

        if id.is_none() {
            warn!(
                entity1 = entity1_name,
                entity2 = entity2_name,
                relation_type,
                "Relation refused: endpoint entity not found"
            );
        }
        Ok(id)
    }

    pub async fn get_entity_relations(&self, limit: usize) -> Result<Vec<RelationView>> {
        self.store.get_entity_relations(limit).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Facts and relations are counted from a sample of at most
    /// `sample_limit` rows; entities are counted in full.
    pub async fn stats(&self, sample_limit: usize) -> Result<LtmStats> {
        let facts = self.store.get_facts(sample_limit, 0.0).await?;
        let entities = self.store.get_all_entities().await?;
        let relations = self.store.get_entity_relations(sample_limit).await?;

        Ok(LtmStats {
            total_facts: facts.len(),
            total_entities: entities.len(),
            total_relations: relations.len(),
        })
    }
}
