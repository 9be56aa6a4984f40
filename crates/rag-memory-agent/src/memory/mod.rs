pub mod extractor;
pub mod in_memory;
pub mod long_term;
pub mod short_term;
pub mod store;
pub mod types;

pub use extractor::{EntityExtractor, ExtractedEntity, ExtractedRelation};
pub use in_memory::InMemoryKnowledgeStore;
pub use long_term::LongTermMemory;
pub use short_term::{ConversationTurn, Role, ShortTermMemory};
pub use store::KnowledgeStore;
pub use types::{Attributes, Entity, EntityType, Fact, LtmStats, NewFact, Relation, RelationView};
