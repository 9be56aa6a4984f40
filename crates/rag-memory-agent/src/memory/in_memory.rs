use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::store::KnowledgeStore;
use super::types::{Attributes, Entity, EntityType, Fact, NewFact, Relation, RelationView};
use crate::utils::error::{AgentError, Result};

#[derive(Default)]
struct State {
    facts: Vec<Fact>,
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    next_fact_id: i64,
    next_entity_id: i64,
    next_relation_id: i64,
}

/// Process-local `KnowledgeStore`; contents are lost on drop.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    state: Mutex<State>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn save_fact(&self, fact: &NewFact) -> Result<i64> {
        let mut state = self.state.lock();
        state.next_fact_id += 1;
        let id = state.next_fact_id;
        state.facts.push(Fact {
            id,
            content: fact.content.clone(),
            source: fact.source.clone(),
            salience: fact.salience,
            timestamp: Utc::now(),
            success_outcome: fact.success_outcome,
        });
        Ok(id)
    }

    async fn get_facts(&self, limit: usize, min_salience: f64) -> Result<Vec<Fact>> {
        let state = self.state.lock();
        let mut facts: Vec<Fact> = state
            .facts
            .iter()
            .filter(|f| f.salience >= min_salience)
            .cloned()
            .collect();
        facts.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        facts.truncate(limit);
        Ok(facts)
    }

    async fn save_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        attributes: &Attributes,
    ) -> Result<i64> {
        let mut state = self.state.lock();
        let now = Utc::now();

        if let Some(existing) = state.entities.iter_mut().find(|e| e.name == name) {
            existing.entity_type = entity_type;
            existing.attributes = attributes.clone();
            existing.timestamp = now;
            return Ok(existing.id);
        }

        state.next_entity_id += 1;
        let id = state.next_entity_id;
        state.entities.push(Entity {
            id,
            name: name.to_string(),
            entity_type,
            attributes: attributes.clone(),
            timestamp: now,
        });
        Ok(id)
    }

    async fn get_entity(&self, name: &str) -> Result<Option<Entity>> {
        let state = self.state.lock();
        Ok(state.entities.iter().find(|e| e.name == name).cloned())
    }

    async fn get_all_entities(&self) -> Result<Vec<Entity>> {
        let state = self.state.lock();
        let mut entities = state.entities.clone();
        entities.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(entities)
    }

    async fn insert_relation(
        &self,
        entity1_id: i64,
        entity2_id: i64,
        relation_type: &str,
    ) -> Result<i64> {
        let mut state = self.state.lock();

        // Mirrors the foreign keys of the SQL schema
        for id in [entity1_id, entity2_id] {
            if !state.entities.iter().any(|e| e.id == id) {
                return Err(AgentError::InvalidRecord(format!(
                    "relation endpoint {} does not exist",
                    id
                )));
            }
        }

        state.next_relation_id += 1;
        let id = state.next_relation_id;
        state.relations.push(Relation {
            id,
            entity1_id,
            entity2_id,
            relation_type: relation_type.to_string(),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn get_entity_relations(&self, limit: usize) -> Result<Vec<RelationView>> {
        let state = self.state.lock();
        let mut relations: Vec<&Relation> = state.relations.iter().collect();
        relations.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));

        let views = relations
            .into_iter()
            .filter_map(|r| {
                let e1 = state.entities.iter().find(|e| e.id == r.entity1_id)?;
                let e2 = state.entities.iter().find(|e| e.id == r.entity2_id)?;
                Some(RelationView {
                    entity1: e1.name.clone(),
                    entity1_type: e1.entity_type,
                    relation_type: r.relation_type.clone(),
                    entity2: e2.name.clone(),
                    entity2_type: e2.entity_type,
                    timestamp: r.timestamp,
                })
            })
            .take(limit)
            .collect();

        Ok(views)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.relations.clear();
        state.entities.clear();
        state.facts.clear();
        Ok(())
    }
}
