use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::RawRecord;
use crate::statistics::{average, percentage};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

/// Corpus-level view of the extracted records, before any structuring.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RecordStatistics {
    pub total_records: usize,
    pub author_id: Option<String>,
    pub creation_dates: BTreeMap<String, usize>,
    pub date_range: DateRange,
    pub places: BTreeMap<String, usize>,
    pub unique_places: usize,
    pub forms: BTreeMap<String, usize>,
    pub form_details: BTreeMap<String, usize>,
    pub rhyme_categories: BTreeMap<String, usize>,
    pub total_lines: usize,
    pub records_with_title: usize,
    pub records_with_allusions: usize,
    pub records_with_sources: usize,
    pub records_with_annotations: usize,
    pub total_allusions: usize,
    pub total_source_citations: usize,
    pub annotation_kinds: BTreeMap<String, usize>,
    pub average_lines_per_record: f64,
    pub records_with_title_percentage: f64,
    pub records_with_allusions_percentage: f64,
}

impl RecordStatistics {
    pub fn compute(records: &[RawRecord]) -> Self {
        let mut stats = RecordStatistics {
            total_records: records.len(),
            author_id: records.iter().find_map(|record| record.author_id.clone()),
            ..Self::default()
        };
        let mut places = BTreeSet::new();

        for record in records {
            if let Some(date) = &record.creation_date {
                *stats.creation_dates.entry(date.clone()).or_default() += 1;
                let range = &mut stats.date_range;
                if range.earliest.as_ref().map_or(true, |earliest| date < earliest) {
                    range.earliest = Some(date.clone());
                }
                if range.latest.as_ref().map_or(true, |latest| date > latest) {
                    range.latest = Some(date.clone());
                }
            }
            if let Some(place) = &record.place_code {
                *stats.places.entry(place.clone()).or_default() += 1;
                places.insert(place.as_str());
            }
            tally(&mut stats.forms, &record.form);
            tally(&mut stats.form_details, &record.form_detail);
            tally(&mut stats.rhyme_categories, &record.rhyme_category);

            stats.total_lines += record.lines.len();
            if record.has_title {
                stats.records_with_title += 1;
            }
            if !record.allusions.is_empty() {
                stats.records_with_allusions += 1;
                stats.total_allusions += record.allusions.len();
            }
            if !record.source_citations.is_empty() {
                stats.records_with_sources += 1;
                stats.total_source_citations += record.source_citations.len();
            }

            let mut annotated = false;
            for annotation in &record.annotations {
                if annotation.kind.is_recognized() {
                    annotated = true;
                    *stats
                        .annotation_kinds
                        .entry(annotation.kind.tag().to_string())
                        .or_default() += 1;
                }
            }
            if annotated {
                stats.records_with_annotations += 1;
            }
        }

        stats.unique_places = places.len();
        stats.average_lines_per_record = average(stats.total_lines, records.len());
        stats.records_with_title_percentage = percentage(stats.records_with_title, records.len());
        stats.records_with_allusions_percentage =
            percentage(stats.records_with_allusions, records.len());
        stats
    }
}

fn tally(target: &mut BTreeMap<String, usize>, value: &Option<String>) {
    if let Some(value) = value {
        *target.entry(value.clone()).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Allusion, Annotation, AnnotationKind, PoemLine};

    fn record(date: &str, place: Option<&str>, allusions: usize) -> RawRecord {
        RawRecord {
            author_id: Some("42".to_string()),
            creation_date: Some(date.to_string()),
            place_code: place.map(str::to_string),
            form: Some("五言律诗".to_string()),
            has_title: place.is_some(),
            lines: vec![PoemLine::default(); 4],
            allusions: vec![Allusion::default(); allusions],
            annotations: vec![
                Annotation {
                    kind: AnnotationKind::Text,
                    index: None,
                    content: "note".to_string(),
                },
                Annotation {
                    kind: AnnotationKind::Other("Footnote".to_string()),
                    index: None,
                    content: String::new(),
                },
            ],
            ..RawRecord::default()
        }
    }

    #[test]
    fn distributions_and_ranges_are_collected() {
        let records = vec![
            record("759", Some("秦州"), 2),
            record("757", Some("长安"), 0),
            record("766", Some("长安"), 1),
            record("760", None, 0),
        ];
        let stats = RecordStatistics::compute(&records);

        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.author_id.as_deref(), Some("42"));
        assert_eq!(stats.date_range.earliest.as_deref(), Some("757"));
        assert_eq!(stats.date_range.latest.as_deref(), Some("766"));
        assert_eq!(stats.unique_places, 2);
        assert_eq!(stats.places.get("长安"), Some(&2));
        assert_eq!(stats.forms.get("五言律诗"), Some(&4));
        assert_eq!(stats.total_lines, 16);
        assert_eq!(stats.records_with_allusions, 2);
        assert_eq!(stats.total_allusions, 3);
        assert_eq!(stats.records_with_title_percentage, 75.0);
        assert_eq!(stats.average_lines_per_record, 4.0);
        assert_eq!(stats.annotation_kinds.get("Text"), Some(&4));
        assert!(!stats.annotation_kinds.contains_key("Footnote"));
    }

    #[test]
    fn empty_input_yields_zeroed_statistics() {
        let stats = RecordStatistics::compute(&[]);
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.average_lines_per_record, 0.0);
        assert_eq!(stats.records_with_allusions_percentage, 0.0);
    }
}
