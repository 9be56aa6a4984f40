use super::models::{encode_attributes, EntityRow, FactRow, RelationViewRow};
use super::{schema, DbPool};
use crate::config::MemoryConfig;
use crate::memory::store::KnowledgeStore;
use crate::memory::types::{format_timestamp, Attributes, Entity, EntityType, Fact, NewFact, RelationView};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// SQLite-backed `KnowledgeStore`.
///
/// Each operation checks a connection out of the pool for its own duration;
/// no transaction spans more than one call.
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: DbPool,
}

impl SqliteKnowledgeStore {
    pub async fn new(pool: DbPool) -> Result<Self> {
        schema::ensure_schema(pool.get_pool()).await?;
        Ok(Self { pool })
    }

    pub async fn open(config: &MemoryConfig) -> Result<Self> {
        let pool = DbPool::new(config).await?;
        Self::new(pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    // ==================== Facts ====================

    async fn save_fact(&self, fact: &NewFact) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO facts (content, source, salience, timestamp, success_outcome)
               VALUES (?1, ?2, ?3, ?4, ?5)"#
        )
        .bind(&fact.content)
        .bind(&fact.source)
        .bind(fact.salience)
        .bind(format_timestamp(&Utc::now()))
        .bind(fact.success_outcome)
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_facts(&self, limit: usize, min_salience: f64) -> Result<Vec<Fact>> {
        let rows = sqlx::query_as::<_, FactRow>(
            r#"SELECT id, content, source, salience, timestamp, success_outcome
               FROM facts
               WHERE salience >= ?1
               ORDER BY timestamp DESC, id DESC
               LIMIT ?2"#
        )
        .bind(min_salience)
        .bind(sql_limit(limit))
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(Fact::try_from).collect()
    }

    // ==================== Entities ====================

    async fn save_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        attributes: &Attributes,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO entities (name, type, attributes, timestamp)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT (name)
               DO UPDATE SET
                   type = excluded.type,
                   attributes = excluded.attributes,
                   timestamp = excluded.timestamp
               RETURNING id"#
        )
        .bind(name)
        .bind(entity_type.as_str())
        .bind(encode_attributes(attributes)?)
        .bind(format_timestamp(&Utc::now()))
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!(entity = name, id, "Upserted entity");
        Ok(id)
    }

    async fn get_entity(&self, name: &str) -> Result<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"SELECT id, name, type, attributes, timestamp
               FROM entities
               WHERE name = ?1"#
        )
        .bind(name)
        .fetch_optional(self.pool.get_pool())
        .await?;

        row.map(Entity::try_from).transpose()
    }

    async fn get_all_entities(&self) -> Result<Vec<Entity>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            r#"SELECT id, name, type, attributes, timestamp
               FROM entities
               ORDER BY timestamp DESC, id DESC"#
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(Entity::try_from).collect()
    }

    // ==================== Relations ====================

    async fn insert_relation(
        &self,
        entity1_id: i64,
        entity2_id: i64,
        relation_type: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO entity_relations (entity1_id, entity2_id, relation_type, timestamp)
               VALUES (?1, ?2, ?3, ?4)"#
        )
        .bind(entity1_id)
        .bind(entity2_id)
        .bind(relation_type)
        .bind(format_timestamp(&Utc::now()))
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_entity_relations(&self, limit: usize) -> Result<Vec<RelationView>> {
        let rows = sqlx::query_as::<_, RelationViewRow>(
            r#"SELECT
                   e1.name AS entity1_name,
                   e1.type AS entity1_type,
                   er.relation_type,
                   e2.name AS entity2_name,
                   e2.type AS entity2_type,
                   er.timestamp
               FROM entity_relations er
               JOIN entities e1 ON er.entity1_id = e1.id
               JOIN entities e2 ON er.entity2_id = e2.id
               ORDER BY er.timestamp DESC, er.id DESC
               LIMIT ?1"#
        )
        .bind(sql_limit(limit))
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(RelationView::try_from).collect()
    }

    async fn clear(&self) -> Result<()> {
        let mut transaction = self.pool.get_pool().begin().await?;

        sqlx::query("DELETE FROM entity_relations")
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM entities")
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM facts")
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        debug!("Cleared long-term memory store");

        Ok(())
    }
}
