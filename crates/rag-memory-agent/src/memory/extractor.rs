use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;
use tracing::{debug, warn};

use super::types::{Attributes, EntityType};

static PHENOMENON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(green flash|fata morgana|brocken spectre|circumzenithal arc|blood falls|blood rain|lake nyos|gravity hill|skyquake|morning glory cloud|naga fireball|catatumbo lightning|brinicle|sailing stones)\b",
    )
    .expect("phenomenon pattern is valid")
});

static LOCATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|at|near|from)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\b")
        .expect("location pattern is valid")
});

static PERSON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][a-z]+\s+[A-Z][a-z]+)\b").expect("person pattern is valid")
});

const MAX_LOCATION_WORDS: usize = 3;

pub const OCCURS_IN: &str = "occurs_in";
pub const STUDIED: &str = "studied";

/// `{P}` is the phenomenon, `{L}` the location.
const OCCURS_IN_TEMPLATES: [&str; 3] = [
    r"{P}.*(?:occurs?|found|seen|visible|observed|appears?|happens?).*(?:in|at|near|over).*{L}",
    r"{P}.*(?:in|at|near|from).*{L}",
    r"(?:in|at|near).*{L}.*{P}",
];

/// `{H}` is the person, `{P}` the phenomenon.
const STUDIED_TEMPLATES: [&str; 3] = [
    r"{H}.*(?:studied|discovered|researched|investigated|observed|documented).*{P}",
    r"{P}.*(?:studied|discovered|researched) by.*{H}",
    r"{H}.*(?:studies|discovers|researches).*{P}",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
}

/// Heuristic entity and relation extraction.
///
/// This is string co-occurrence, not parsing: false positives and false
/// negatives are expected.
#[derive(Debug, Default, Clone)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Phenomena claim their spans first, then locations, then persons
    /// (searched only in text not already claimed).
    pub fn extract_entities(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut entities: Vec<ExtractedEntity> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut claimed: Vec<Range<usize>> = Vec::new();

        let mut push = |entities: &mut Vec<ExtractedEntity>,
                        name: String,
                        entity_type: EntityType,
                        attributes: Attributes| {
            if seen.insert(name.clone()) {
                entities.push(ExtractedEntity { name, entity_type, attributes });
            }
        };

        for m in PHENOMENON_PATTERN.find_iter(text) {
            claimed.push(m.range());
            let attributes = Attributes::from([("mentioned_in".to_string(), json!("conversation"))]);
            push(&mut entities, title_case(m.as_str()), EntityType::Phenomenon, attributes);
        }

        for caps in LOCATION_PATTERN.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            if m.as_str().split_whitespace().count() > MAX_LOCATION_WORDS {
                continue;
            }
            if overlaps(&claimed, &m.range()) {
                continue;
            }
            claimed.push(m.range());
            push(&mut entities, m.as_str().to_string(), EntityType::Location, Attributes::new());
        }

        let masked = mask(text, &claimed);
        for caps in PERSON_PATTERN.captures_iter(&masked) {
            let Some(m) = caps.get(1) else { continue };
            push(&mut entities, m.as_str().to_string(), EntityType::Person, Attributes::new());
        }

        debug!(count = entities.len(), "Extracted entities");
        entities
    }

    /// Tests each (phenomenon, location) and (person, phenomenon) pair
    /// against the co-occurrence templates; the first matching template
    /// emits the relation. Output is sorted and free of duplicates.
    pub fn extract_relations(
        &self,
        text: &str,
        entities: &[ExtractedEntity],
    ) -> Vec<ExtractedRelation> {
        let text_lower = text.to_lowercase();
        let of_type = |wanted: EntityType| -> Vec<&str> {
            entities
                .iter()
                .filter(|e| e.entity_type == wanted)
                .map(|e| e.name.as_str())
                .collect()
        };
        let phenomena = of_type(EntityType::Phenomenon);
        let locations = of_type(EntityType::Location);
        let persons = of_type(EntityType::Person);

        let mut relations = BTreeSet::new();

        for phenomenon in &phenomena {
            let p = regex::escape(&phenomenon.to_lowercase());

            for location in &locations {
                let l = regex::escape(&location.to_lowercase());
                let matched = OCCURS_IN_TEMPLATES.iter().any(|template| {
                    matches_template(&text_lower, &template.replace("{P}", &p).replace("{L}", &l))
                });
                if matched {
                    relations.insert(ExtractedRelation {
                        source: phenomenon.to_string(),
                        target: location.to_string(),
                        relation_type: OCCURS_IN.to_string(),
                    });
                }
            }

            for person in &persons {
                let h = regex::escape(&person.to_lowercase());
                let matched = STUDIED_TEMPLATES.iter().any(|template| {
                    matches_template(&text_lower, &template.replace("{H}", &h).replace("{P}", &p))
                });
                if matched {
                    relations.insert(ExtractedRelation {
                        source: person.to_string(),
                        target: phenomenon.to_string(),
                        relation_type: STUDIED.to_string(),
                    });
                }
            }
        }

        debug!(count = relations.len(), "Extracted relations");
        relations.into_iter().collect()
    }
}

fn matches_template(text: &str, pattern: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            warn!(pattern, error = %e, "Skipping relation template that failed to compile");
            false
        }
    }
}

fn overlaps(claimed: &[Range<usize>], range: &Range<usize>) -> bool {
    claimed.iter().any(|c| c.start < range.end && range.start < c.end)
}

/// Replaces claimed spans with underscores, keeping byte offsets intact.
fn mask(text: &str, claimed: &[Range<usize>]) -> String {
    text.char_indices()
        .map(|(i, ch)| {
            if claimed.iter().any(|c| c.contains(&i)) {
                "_".repeat(ch.len_utf8())
            } else {
                ch.to_string()
            }
        })
        .collect()
}

/// Upper-cases the first letter of every alphabetic run, lower-cases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}
