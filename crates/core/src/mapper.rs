//! Turns raw records and collected articles into structured documents.

use std::collections::HashSet;

use regex::Regex;

use crate::error::PipelineError;
use crate::models::{
    ChunkingOptions, ContentMeasure, DocumentContent, DocumentKind, DocumentMetadata,
    DocumentSource, RawRecord, SourceArticle, StructuredDocument, UNKNOWN,
};
use crate::persona::PersonaProfile;

pub const UNTITLED: &str = "Untitled";

pub fn document_id(tag: &str, source_id: &str) -> String {
    format!("{tag}_{source_id}")
}

/// Maps one extracted record. Only `collected` varies between runs and it
/// lives in the source block, never in the rendered text.
pub fn map_record(
    record: &RawRecord,
    profile: &PersonaProfile,
    options: &ChunkingOptions,
    collected: Option<String>,
) -> StructuredDocument {
    let lines = record.line_texts();
    let allusions = record.allusion_texts();
    let annotations = record.text_annotations();

    let full_text = render_record(record, &lines, &allusions, &annotations, options);
    let length = lines
        .iter()
        .map(|line| profile.measure.measure(line))
        .sum();

    StructuredDocument {
        id: record
            .record_id
            .as_deref()
            .map(|id| document_id(&profile.tag, id))
            .unwrap_or_default(),
        kind: DocumentKind::Poem,
        title: record
            .title
            .clone()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string()),
        source: DocumentSource {
            database: profile.source_database.clone(),
            record_id: record.record_id.clone(),
            author: record.author.clone(),
            author_id: record.author_id.clone(),
            url: None,
            collected,
        },
        content: DocumentContent {
            full_text,
            line_count: lines.len(),
            lines,
            summary: None,
            length,
            measure: profile.measure,
            allusions: allusions.clone(),
            annotations: annotations.clone(),
        },
        metadata: DocumentMetadata {
            persona: profile.display_name.clone(),
            time_period: or_unknown(&record.creation_date),
            place: or_unknown(&record.place_code),
            form: or_unknown(&record.form),
            form_detail: or_unknown(&record.form_detail),
            rhyme_category: or_unknown(&record.rhyme_category),
            has_allusions: !allusions.is_empty(),
            allusion_count: allusions.len(),
            has_annotations: !annotations.is_empty(),
            annotation_count: annotations.len(),
            language: profile.language.clone(),
            content_category: profile.content_category.clone(),
        },
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn render_record(
    record: &RawRecord,
    lines: &[String],
    allusions: &[String],
    annotations: &[String],
    options: &ChunkingOptions,
) -> String {
    let mut blocks: Vec<Vec<String>> = Vec::new();

    if let Some(title) = record.title.as_deref().filter(|title| !title.trim().is_empty()) {
        blocks.push(vec![format!("Title: {title}")]);
    }

    if !lines.is_empty() {
        let mut block = vec!["Poem:".to_string()];
        block.extend(lines.iter().cloned());
        blocks.push(block);
    }

    let creation = labeled(&[
        ("Date", &record.creation_date),
        ("Place", &record.place_code),
    ]);
    if !creation.is_empty() {
        blocks.push(header("Creation Information:", creation));
    }

    let literary = labeled(&[
        ("Type", &record.form),
        ("Rhyme", &record.rhyme_category),
    ]);
    if !literary.is_empty() {
        blocks.push(header("Literary Characteristics:", literary));
    }

    if !allusions.is_empty() {
        let items = allusions.iter().map(|text| format!("  - {text}")).collect();
        blocks.push(header("Allusions:", items));
    }

    if !annotations.is_empty() {
        let limit = options.document_annotation_limit;
        let mut items: Vec<String> = annotations
            .iter()
            .take(limit)
            .map(|text| format!("  - {text}"))
            .collect();
        if annotations.len() > limit {
            items.push(format!("  ... and {} more", annotations.len() - limit));
        }
        blocks.push(header("Annotations:", items));
    }

    blocks
        .into_iter()
        .map(|block| block.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn labeled(fields: &[(&str, &Option<String>)]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| format!("{label}: {value}"))
        })
        .collect()
}

fn header(title: &str, mut items: Vec<String>) -> Vec<String> {
    items.insert(0, title.to_string());
    items
}

/// Compiled patterns for [`clean_article_text`].
pub struct ArticleCleaner {
    whitespace: Regex,
    citation: Regex,
    heading: Regex,
    slug_strip: Regex,
    slug_join: Regex,
}

impl ArticleCleaner {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            citation: Regex::new(r"\[\d+\]")?,
            heading: Regex::new(r"==+\s*(.+?)\s*==+")?,
            slug_strip: Regex::new(r"[^\w\s-]")?,
            slug_join: Regex::new(r"[\s_]+")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let collapsed = self.whitespace.replace_all(text, " ");
        let uncited = self.citation.replace_all(&collapsed, "");
        let sectioned = self.heading.replace_all(&uncited, "\n\n$1\n\n");
        sectioned
            .replace(" ,", ",")
            .replace(" .", ".")
            .trim()
            .to_string()
    }

    pub fn slug(&self, title: &str) -> String {
        let lowered = title.trim().to_lowercase();
        let stripped = self.slug_strip.replace_all(&lowered, "");
        let joined = self.slug_join.replace_all(stripped.trim(), "_");
        if joined.is_empty() {
            "untitled".to_string()
        } else {
            joined.into_owned()
        }
    }
}

pub fn clean_article_text(text: &str) -> Result<String, PipelineError> {
    Ok(ArticleCleaner::new()?.clean(text))
}

pub fn map_article(
    article: &SourceArticle,
    kind: DocumentKind,
    profile: &PersonaProfile,
) -> Result<StructuredDocument, PipelineError> {
    map_article_with(&ArticleCleaner::new()?, article, kind, profile)
}

/// Same as [`map_article`] but reuses compiled patterns across a batch.
pub fn map_article_with(
    cleaner: &ArticleCleaner,
    article: &SourceArticle,
    kind: DocumentKind,
    profile: &PersonaProfile,
) -> Result<StructuredDocument, PipelineError> {
    let title = article
        .title
        .clone()
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());
    let full_text = cleaner.clean(article.content.as_deref().unwrap_or_default());
    let summary = article
        .summary
        .as_deref()
        .map(|summary| cleaner.clean(summary))
        .filter(|summary| !summary.is_empty());

    Ok(StructuredDocument {
        id: document_id(&profile.tag, &cleaner.slug(&title)),
        kind,
        source: DocumentSource {
            database: profile.source_database.clone(),
            url: article.url.clone(),
            collected: article.collected.clone(),
            ..DocumentSource::default()
        },
        content: DocumentContent {
            length: ContentMeasure::Words.measure(&full_text),
            measure: ContentMeasure::Words,
            line_count: full_text
                .split("\n\n")
                .filter(|paragraph| !paragraph.trim().is_empty())
                .count(),
            full_text,
            summary,
            ..DocumentContent::default()
        },
        metadata: DocumentMetadata {
            persona: profile.display_name.clone(),
            time_period: profile.era.clone(),
            form: kind.as_str().to_string(),
            language: profile.language.clone(),
            content_category: article
                .category
                .clone()
                .filter(|category| !category.trim().is_empty())
                .unwrap_or_else(|| profile.content_category.clone()),
            ..DocumentMetadata::default()
        },
        title,
    })
}

/// Suffixes repeated document ids with `_2`, `_3`, ... in input order. The
/// first holder of an id keeps it unchanged.
pub fn disambiguate_ids(documents: &mut [StructuredDocument]) {
    let mut taken: HashSet<String> = documents.iter().map(|doc| doc.id.clone()).collect();
    let mut seen = HashSet::new();

    for document in documents.iter_mut() {
        if document.id.is_empty() || seen.insert(document.id.clone()) {
            continue;
        }
        let mut n = 2;
        let unique = loop {
            let candidate = format!("{}_{n}", document.id);
            if !taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        taken.insert(unique.clone());
        seen.insert(unique.clone());
        document.id = unique;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Allusion, Annotation, AnnotationKind, PoemLine};

    fn chun_wang() -> RawRecord {
        let line = |text: &str| PoemLine {
            text: text.to_string(),
            ..PoemLine::default()
        };
        let note = |content: &str| Annotation {
            kind: AnnotationKind::Text,
            index: None,
            content: content.to_string(),
        };
        RawRecord {
            record_id: Some("1024".to_string()),
            author: Some("杜甫".to_string()),
            author_id: Some("7".to_string()),
            creation_date: Some("757".to_string()),
            form: Some("五言律诗".to_string()),
            has_title: true,
            title: Some("春望".to_string()),
            lines: vec![
                line("国破山河在，城春草木深。"),
                line("感时花溅泪，恨别鸟惊心。"),
                line("烽火连三月，家书抵万金。"),
                line("白头搔更短，浑欲不胜簪。"),
            ],
            allusions: vec![
                Allusion {
                    text: "烽火".to_string(),
                    ..Allusion::default()
                },
                Allusion {
                    text: "  ".to_string(),
                    ..Allusion::default()
                },
                Allusion {
                    text: "家书".to_string(),
                    ..Allusion::default()
                },
            ],
            annotations: (1..=6).map(|n| note(&format!("note {n}"))).collect(),
            ..RawRecord::default()
        }
    }

    #[test]
    fn record_text_is_built_from_labeled_blocks() -> Result<(), PipelineError> {
        let profile = PersonaProfile::preset("du_fu")?;
        let document = map_record(&chun_wang(), &profile, &ChunkingOptions::default(), None);

        assert_eq!(document.id, "dufu_1024");
        assert_eq!(document.title, "春望");
        let text = &document.content.full_text;
        assert!(text.starts_with("Title: 春望\n\nPoem:\n国破山河在"));
        assert!(text.contains("Creation Information:\nDate: 757"));
        assert!(!text.contains("Place:"));
        assert!(text.contains("Literary Characteristics:\nType: 五言律诗"));
        assert!(text.contains("Allusions:\n  - 烽火\n  - 家书"));
        assert!(text.ends_with("  - note 5\n  ... and 1 more"));
        assert_eq!(document.content.length, 48);
        assert_eq!(document.metadata.place, UNKNOWN);
        assert_eq!(document.metadata.allusion_count, 2);
        assert_eq!(document.metadata.annotation_count, 6);
        Ok(())
    }

    #[test]
    fn empty_blocks_are_omitted() -> Result<(), PipelineError> {
        let profile = PersonaProfile::preset("du_fu")?;
        let record = RawRecord {
            record_id: Some("9".to_string()),
            ..RawRecord::default()
        };
        let document = map_record(&record, &profile, &ChunkingOptions::default(), None);

        assert_eq!(document.content.full_text, "");
        assert_eq!(document.title, UNTITLED);
        assert_eq!(document.metadata.time_period, UNKNOWN);
        assert!(!document.metadata.has_allusions);
        Ok(())
    }

    #[test]
    fn mapping_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let profile = PersonaProfile::preset("du_fu")?;
        let options = ChunkingOptions::default();
        let first = serde_json::to_string(&map_record(&chun_wang(), &profile, &options, None))?;
        let second = serde_json::to_string(&map_record(&chun_wang(), &profile, &options, None))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn article_text_is_cleaned() -> Result<(), PipelineError> {
        let cleaned = clean_article_text(
            "Early life[1]\n\n  He was born ,  raised .[23] == Career == Founded   companies .",
        )?;
        assert_eq!(
            cleaned,
            "Early life He was born, raised. \n\nCareer\n\n Founded companies."
        );
        Ok(())
    }

    #[test]
    fn articles_get_slug_ids_and_word_counts() -> Result<(), PipelineError> {
        let profile = PersonaProfile::preset("queen_elizabeth_ii")?;
        let article = SourceArticle {
            title: Some("Coronation of Elizabeth II!".to_string()),
            content: Some("The coronation took place[4] in 1953 .".to_string()),
            category: None,
            ..SourceArticle::default()
        };
        let document = map_article(&article, DocumentKind::Context, &profile)?;

        assert_eq!(document.id, "qe2_coronation_of_elizabeth_ii");
        assert_eq!(document.kind, DocumentKind::Context);
        assert_eq!(document.content.full_text, "The coronation took place in 1953.");
        assert_eq!(document.content.length, 6);
        assert_eq!(document.content.measure, ContentMeasure::Words);
        assert_eq!(document.metadata.content_category, "biography");
        Ok(())
    }

    #[test]
    fn colliding_article_ids_are_suffixed_in_order() -> Result<(), PipelineError> {
        let profile = PersonaProfile::preset("elon_musk")?;
        let titled = |title: Option<&str>| SourceArticle {
            title: title.map(str::to_string),
            content: Some("Body text.".to_string()),
            ..SourceArticle::default()
        };
        let cleaner = ArticleCleaner::new()?;
        let mut documents = [
            titled(Some("Tesla, Inc.")),
            titled(Some("Tesla Inc")),
            titled(None),
            titled(None),
            titled(Some("Tesla Inc 2")),
        ]
        .iter()
        .map(|article| map_article_with(&cleaner, article, DocumentKind::Context, &profile))
        .collect::<Result<Vec<_>, _>>()?;

        disambiguate_ids(&mut documents);
        let ids: Vec<&str> = documents.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "musk_tesla_inc",
                "musk_tesla_inc_3",
                "musk_untitled",
                "musk_untitled_2",
                "musk_tesla_inc_2",
            ]
        );
        Ok(())
    }
}
