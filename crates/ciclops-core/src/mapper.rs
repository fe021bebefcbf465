//! Concept mapper: line-item label to taxonomy leaf
//!
//! Resolution order:
//! 1. Correction memory (stored confidence)
//! 2. Keyword taxonomy (baseline confidence)
//! 3. Unmapped (`unknown`, confidence 0)
//!
//! The first source that yields a result wins. Between two `record` calls on
//! the memory, `map` is a pure function of the label.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::{CorrectionMemory, MemoryKey};
use crate::models::{MappedLineItem, MappingSource, RawLineItem};
use crate::normalize;
use crate::taxonomy::Category;

/// Keywords this short only match whole tokens ("gas" must not hit "gastos")
const SHORT_KEYWORD_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Confidence assigned to keyword taxonomy matches
    pub taxonomy_confidence: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            taxonomy_confidence: 0.7,
        }
    }
}

/// Result of mapping one label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMapping {
    pub category: Category,
    pub confidence: f64,
    pub source: MappingSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_key: Option<MemoryKey>,
}

impl CategoryMapping {
    fn unmapped() -> Self {
        Self {
            category: Category::Unknown,
            confidence: 0.0,
            source: MappingSource::Unmapped,
            memory_key: None,
        }
    }
}

struct Keyword {
    phrase: String,
    chars: usize,
    category: Category,
    /// Position of the leaf in taxonomy order
    order: usize,
}

pub struct ConceptMapper {
    memory: Arc<CorrectionMemory>,
    keywords: Vec<Keyword>,
    config: MapperConfig,
}

impl ConceptMapper {
    pub fn new(memory: Arc<CorrectionMemory>) -> Self {
        Self::with_config(memory, MapperConfig::default())
    }

    pub fn with_config(memory: Arc<CorrectionMemory>, config: MapperConfig) -> Self {
        let keywords = Category::leaves()
            .iter()
            .enumerate()
            .flat_map(|(order, category)| {
                category.keywords().iter().map(move |kw| {
                    // Keywords go through the same normalization as labels
                    let phrase = normalize::phrase(kw);
                    Keyword {
                        chars: phrase.chars().count(),
                        phrase,
                        category: *category,
                        order,
                    }
                })
            })
            .filter(|k| !k.phrase.is_empty())
            .collect();

        Self {
            memory,
            keywords,
            config,
        }
    }

    pub fn memory(&self) -> &Arc<CorrectionMemory> {
        &self.memory
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Map a label to a category
    pub fn map(&self, label: &str) -> CategoryMapping {
        if let Some(correction) = self.memory.lookup(label) {
            if let Some(category) = correction.category() {
                return CategoryMapping {
                    category,
                    confidence: correction.confidence,
                    source: MappingSource::Memory,
                    memory_key: Some(correction.key),
                };
            }
        }

        match self.keyword_match(label) {
            Some(category) => CategoryMapping {
                category,
                confidence: self.config.taxonomy_confidence,
                source: MappingSource::Taxonomy,
                memory_key: None,
            },
            None => CategoryMapping::unmapped(),
        }
    }

    /// Best keyword match: longest keyword, then taxonomy order
    pub fn keyword_match(&self, label: &str) -> Option<Category> {
        let haystack = normalize::phrase(label);
        if haystack.is_empty() {
            return None;
        }
        self.keywords
            .iter()
            .filter(|k| normalize::contains_keyword(&haystack, &k.phrase, SHORT_KEYWORD_CHARS))
            .min_by(|a, b| b.chars.cmp(&a.chars).then(a.order.cmp(&b.order)))
            .map(|k| k.category)
    }

    /// Map every item, preserving order
    pub fn map_items(&self, items: &[RawLineItem]) -> Vec<MappedLineItem> {
        let mapped: Vec<MappedLineItem> = items
            .iter()
            .map(|item| {
                let mapping = self.map(&item.label);
                MappedLineItem {
                    label: item.label.clone(),
                    amount: item.amount,
                    source_row: item.source_row,
                    category: mapping.category,
                    mapping_confidence: mapping.confidence,
                    mapping_source: mapping.source,
                    memory_key: mapping.memory_key,
                }
            })
            .collect();

        let unmapped = mapped
            .iter()
            .filter(|m| m.mapping_source == MappingSource::Unmapped)
            .count();
        debug!(items = mapped.len(), unmapped, "Mapped line items");
        mapped
    }
}
