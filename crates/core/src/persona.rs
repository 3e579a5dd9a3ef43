//! Persona profiles: the per-dataset configuration that decides id prefixes,
//! how content is measured and which segmentation strategy applies.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{ContentMeasure, ValidationOptions};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    HistoricalPoet,
    ContemporaryEntrepreneur,
    HistoricalMonarch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    /// Primary, allusion and annotation chunks per document.
    StructureAware,
    /// Overlapping word windows over the full text.
    FixedWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaProfile {
    pub id: String,
    /// Prefix for document and chunk ids.
    pub tag: String,
    pub display_name: String,
    pub resource_type: ResourceType,
    pub language: String,
    pub era: String,
    pub measure: ContentMeasure,
    pub strategy: SegmentationStrategy,
    pub content_category: String,
    pub source_database: String,
}

impl PersonaProfile {
    pub const BUILT_IN: [&'static str; 3] = ["du_fu", "elon_musk", "queen_elizabeth_ii"];

    pub fn preset(id: &str) -> Result<Self, PipelineError> {
        let profile = match id {
            "du_fu" => Self {
                id: "du_fu".to_string(),
                tag: "dufu".to_string(),
                display_name: "Du Fu (杜甫)".to_string(),
                resource_type: ResourceType::HistoricalPoet,
                language: "Classical Chinese".to_string(),
                era: "712-770 CE".to_string(),
                measure: ContentMeasure::Characters,
                strategy: SegmentationStrategy::StructureAware,
                content_category: "poetry".to_string(),
                source_database: "CNKGraph.Writings.xml".to_string(),
            },
            "elon_musk" => Self {
                id: "elon_musk".to_string(),
                tag: "musk".to_string(),
                display_name: "Elon Musk".to_string(),
                resource_type: ResourceType::ContemporaryEntrepreneur,
                language: "English".to_string(),
                era: "1971-present".to_string(),
                measure: ContentMeasure::Words,
                strategy: SegmentationStrategy::FixedWindow,
                content_category: "biography".to_string(),
                source_database: "Wikipedia".to_string(),
            },
            "queen_elizabeth_ii" => Self {
                id: "queen_elizabeth_ii".to_string(),
                tag: "qe2".to_string(),
                display_name: "Queen Elizabeth II".to_string(),
                resource_type: ResourceType::HistoricalMonarch,
                language: "English".to_string(),
                era: "1926-2022 CE".to_string(),
                measure: ContentMeasure::Words,
                strategy: SegmentationStrategy::FixedWindow,
                content_category: "biography".to_string(),
                source_database: "Wikipedia".to_string(),
            },
            other => return Err(PipelineError::UnknownPersona(other.to_string())),
        };
        Ok(profile)
    }

    pub fn chunk_prefix(&self) -> String {
        format!("{}_chunk", self.tag)
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions::for_measure(self.measure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_for_every_built_in_id() -> Result<(), PipelineError> {
        for id in PersonaProfile::BUILT_IN {
            let profile = PersonaProfile::preset(id)?;
            assert_eq!(profile.id, id);
            assert!(!profile.tag.contains(' '));
        }
        Ok(())
    }

    #[test]
    fn unknown_persona_is_an_error() {
        assert!(matches!(
            PersonaProfile::preset("nobody"),
            Err(PipelineError::UnknownPersona(_))
        ));
    }

    #[test]
    fn poet_counts_characters_and_keeps_structure() -> Result<(), PipelineError> {
        let poet = PersonaProfile::preset("du_fu")?;
        assert_eq!(poet.measure, ContentMeasure::Characters);
        assert_eq!(poet.strategy, SegmentationStrategy::StructureAware);
        assert_eq!(poet.chunk_prefix(), "dufu_chunk");
        Ok(())
    }
}
