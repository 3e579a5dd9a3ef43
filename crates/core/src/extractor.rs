//! Forward-only record extraction from the writings XML corpus.
//!
//! The corpus is far too large to hold as a tree, so [`RecordStream`] pulls
//! parser events one at a time into a single reusable buffer. Each `<Poem>`
//! start tag is tested against the [`RecordFilter`] as soon as its attributes
//! are read: a match has its subtree assembled into a [`RawRecord`], anything
//! else is skipped to its closing tag without being materialised. The buffer
//! is cleared after every event, so memory stays proportional to the largest
//! single record rather than to the document.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{Allusion, Annotation, AnnotationKind, PoemLine, RawRecord};

const RECORD_TAG: &[u8] = b"Poem";
const READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Author,
    AuthorId,
    Dynasty,
    RecordId,
}

impl FromStr for FilterField {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "author" => Ok(FilterField::Author),
            "author-id" | "author_id" => Ok(FilterField::AuthorId),
            "dynasty" => Ok(FilterField::Dynasty),
            "record-id" | "record_id" => Ok(FilterField::RecordId),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown filter field: {other}"
            ))),
        }
    }
}

impl FilterField {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterField::Author => "author",
            FilterField::AuthorId => "author_id",
            FilterField::Dynasty => "dynasty",
            FilterField::RecordId => "record_id",
        }
    }
}

/// Equality test on one record attribute.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub field: FilterField,
    pub value: String,
}

impl RecordFilter {
    pub fn author(name: impl Into<String>) -> Self {
        Self {
            field: FilterField::Author,
            value: name.into(),
        }
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        let candidate = match self.field {
            FilterField::Author => &record.author,
            FilterField::AuthorId => &record.author_id,
            FilterField::Dynasty => &record.dynasty,
            FilterField::RecordId => &record.record_id,
        };
        candidate.as_deref() == Some(self.value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub filter: RecordFilter,
    /// Emit a progress event every this many scanned records; zero disables it.
    pub progress_every: u64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            filter: RecordFilter::author("杜甫"),
            progress_every: 100_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScanStats {
    pub records_scanned: u64,
    pub matches_found: u64,
    /// Author id of the first matching record.
    pub first_author_id: Option<String>,
    pub elapsed_secs: f64,
}

impl ScanStats {
    pub fn records_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.records_scanned as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

pub struct Extraction {
    pub records: Vec<RawRecord>,
    pub stats: ScanStats,
}

/// Pull-based iterator over the records that pass the filter, in document order.
pub struct RecordStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    options: ExtractionOptions,
    stats: ScanStats,
    started: Instant,
    finished: bool,
}

enum Boundary {
    Open(RawRecord, quick_xml::events::BytesEnd<'static>),
    SelfClosed(RawRecord),
    Eof,
    Continue,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(source: R, options: ExtractionOptions) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            options,
            stats: ScanStats::default(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            ..self.stats.clone()
        }
    }

    /// Capacity of the event buffer; bounded by the largest single event.
    pub fn buffer_capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn next_match(&mut self) -> Result<Option<RawRecord>> {
        loop {
            let boundary = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) if e.local_name().as_ref() == RECORD_TAG => {
                    Boundary::Open(record_header(&e), e.to_end().into_owned())
                }
                Event::Empty(e) if e.local_name().as_ref() == RECORD_TAG => {
                    Boundary::SelfClosed(record_header(&e))
                }
                Event::Eof => Boundary::Eof,
                _ => Boundary::Continue,
            };
            self.buf.clear();

            let matched = match boundary {
                Boundary::Continue => continue,
                Boundary::Eof => return Ok(None),
                Boundary::SelfClosed(header) => {
                    self.stats.records_scanned += 1;
                    self.options.filter.matches(&header).then_some(header)
                }
                Boundary::Open(header, end) => {
                    self.stats.records_scanned += 1;
                    if self.options.filter.matches(&header) {
                        let record =
                            RecordBuilder::new(header).read_body(&mut self.reader, &mut self.buf)?;
                        Some(record)
                    } else {
                        self.reader.read_to_end_into(end.name(), &mut self.buf)?;
                        self.buf.clear();
                        None
                    }
                }
            };

            if let Some(record) = &matched {
                self.stats.matches_found += 1;
                if self.stats.first_author_id.is_none() {
                    self.stats.first_author_id = record.author_id.clone();
                }
            }
            self.report_progress();

            if matched.is_some() {
                return Ok(matched);
            }
        }
    }

    fn report_progress(&self) {
        let every = self.options.progress_every;
        if every == 0 || self.stats.records_scanned % every != 0 {
            return;
        }
        let stats = self.stats();
        info!(
            records_scanned = stats.records_scanned,
            matches = stats.matches_found,
            rate = stats.records_per_second().round() as u64,
            "extraction progress"
        );
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_match() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

/// Scan a corpus file and collect every matching record.
///
/// A missing or unreadable file is reported before any scanning starts.
pub fn extract_records(path: &Path, options: &ExtractionOptions) -> Result<Extraction> {
    if !path.is_file() {
        return Err(PipelineError::MissingSource(path.to_path_buf()));
    }
    let file = File::open(path)?;
    info!(path = %path.display(), filter = options.filter.field.as_str(), value = %options.filter.value, "scanning corpus");

    let mut stream = RecordStream::new(
        BufReader::with_capacity(READ_BUFFER_BYTES, file),
        options.clone(),
    );
    let mut records = Vec::new();
    for record in stream.by_ref() {
        records.push(record?);
    }

    let stats = stream.stats();
    info!(
        records_scanned = stats.records_scanned,
        matches = stats.matches_found,
        elapsed_secs = stats.elapsed_secs,
        "extraction complete"
    );
    Ok(Extraction { records, stats })
}

fn attr(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attribute| attribute.key.as_ref() == key)
        .and_then(|attribute| attribute.unescape_value().ok().map(|value| value.trim().to_string()))
        .filter(|value| !value.is_empty())
}

fn record_header(element: &BytesStart<'_>) -> RawRecord {
    RawRecord {
        record_id: attr(element, b"Id"),
        group_number: attr(element, b"G"),
        dynasty: attr(element, b"D"),
        author: attr(element, b"AU"),
        author_id: attr(element, b"AId"),
        creation_date: attr(element, b"AD"),
        place_code: attr(element, b"AP"),
        form: attr(element, b"T"),
        form_detail: attr(element, b"TD"),
        rhyme_category: attr(element, b"R"),
        rhyme_number: attr(element, b"RA"),
        final_rhyme: attr(element, b"FR"),
        has_title: attr(element, b"TS").as_deref() == Some("true"),
        ..RawRecord::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Title,
    Lines,
    Line,
    Allusions,
    Allusion,
    Sources,
    Source,
    SentenceGroups,
    SentenceGroup,
    SentenceIndex,
    Note,
    Other,
}

impl Scope {
    fn collects_text(self) -> bool {
        matches!(
            self,
            Scope::Allusion | Scope::Source | Scope::SentenceIndex | Scope::Note
        )
    }
}

/// Assembles the body of one matching record from its child events.
struct RecordBuilder {
    record: RawRecord,
    scopes: Vec<Scope>,
    // One buffer per open text-collecting scope, innermost last.
    texts: Vec<String>,
    pending_allusion: Option<Allusion>,
    pending_note: Option<(AnnotationKind, Option<String>)>,
}

impl RecordBuilder {
    fn new(header: RawRecord) -> Self {
        Self {
            record: header,
            scopes: Vec::new(),
            texts: Vec::new(),
            pending_allusion: None,
            pending_note: None,
        }
    }

    fn read_body<R: BufRead>(mut self, reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<RawRecord> {
        loop {
            let done = match reader.read_event_into(buf)? {
                Event::Start(e) => {
                    let scope = self.open(&e);
                    self.enter(scope);
                    self.scopes.push(scope);
                    false
                }
                Event::Empty(e) => {
                    let scope = self.open(&e);
                    self.enter(scope);
                    self.close(scope);
                    false
                }
                Event::Text(t) => {
                    if let Some(buffer) = self.texts.last_mut() {
                        match t.unescape() {
                            Ok(text) => buffer.push_str(&text),
                            Err(error) => warn!(
                                record_id = ?self.record.record_id,
                                %error,
                                "dropping text node with an invalid escape"
                            ),
                        }
                    }
                    false
                }
                Event::CData(c) => {
                    if let Some(buffer) = self.texts.last_mut() {
                        buffer.push_str(&String::from_utf8_lossy(&c));
                    }
                    false
                }
                Event::End(_) => match self.scopes.pop() {
                    Some(scope) => {
                        self.close(scope);
                        false
                    }
                    None => true,
                },
                Event::Eof => {
                    return Err(PipelineError::MalformedSource(format!(
                        "input ended inside record {}",
                        self.record.record_id.as_deref().unwrap_or("<no id>")
                    )))
                }
                _ => false,
            };
            buf.clear();
            if done {
                debug!(record_id = ?self.record.record_id, lines = self.record.lines.len(), "record assembled");
                return Ok(self.record);
            }
        }
    }

    fn enter(&mut self, scope: Scope) {
        if scope.collects_text() {
            self.texts.push(String::new());
        }
    }

    fn open(&mut self, element: &BytesStart<'_>) -> Scope {
        let parent = self.scopes.last().copied();
        match (element.local_name().as_ref(), parent) {
            (b"Title", _) => {
                self.record.title = attr(element, b"C");
                Scope::Title
            }
            (b"Jus", _) => Scope::Lines,
            (b"Ju", Some(Scope::Lines)) => {
                self.record.lines.push(PoemLine {
                    text: attr(element, b"C").unwrap_or_default(),
                    tone: attr(element, b"T"),
                    rhyme: attr(element, b"R"),
                    annotations: Vec::new(),
                });
                Scope::Line
            }
            (b"As", _) => Scope::Allusions,
            (b"A", Some(Scope::Allusions)) => {
                self.pending_allusion = Some(Allusion {
                    allusion_id: attr(element, b"AI"),
                    sentence_index: attr(element, b"SI"),
                    text: String::new(),
                });
                Scope::Allusion
            }
            (b"Fs", _) => Scope::Sources,
            (b"F", Some(Scope::Sources)) => Scope::Source,
            (b"SIs", _) => Scope::SentenceGroups,
            (b"SI", Some(Scope::SentenceGroups)) => {
                self.record.sentence_indices.push(Vec::new());
                Scope::SentenceGroup
            }
            (b"int", Some(Scope::SentenceGroup)) => Scope::SentenceIndex,
            (b"N", _) => {
                let kind = AnnotationKind::from_tag(attr(element, b"T").as_deref().unwrap_or(""));
                self.pending_note = Some((kind, attr(element, b"I")));
                Scope::Note
            }
            _ => Scope::Other,
        }
    }

    fn close(&mut self, scope: Scope) {
        let text = if scope.collects_text() {
            self.take_text()
        } else {
            String::new()
        };
        match scope {
            Scope::Allusion => {
                if let Some(mut allusion) = self.pending_allusion.take() {
                    allusion.text = text;
                    self.record.allusions.push(allusion);
                }
            }
            Scope::Source => {
                let citation = text;
                if !citation.is_empty() {
                    self.record.source_citations.push(citation);
                }
            }
            Scope::SentenceIndex => {
                if let (Ok(index), Some(group)) = (
                    text.parse::<u32>(),
                    self.record.sentence_indices.last_mut(),
                ) {
                    group.push(index);
                }
            }
            Scope::Note => {
                if let Some((kind, index)) = self.pending_note.take() {
                    let annotation = Annotation {
                        kind,
                        index,
                        content: text,
                    };
                    if self.scopes.contains(&Scope::Line) {
                        if let Some(line) = self.record.lines.last_mut() {
                            line.annotations.push(annotation.clone());
                        }
                    } else if self.scopes.contains(&Scope::Title) {
                        self.record.title_annotations.push(annotation.clone());
                    }
                    self.record.annotations.push(annotation);
                }
            }
            _ => {}
        }
    }

    fn take_text(&mut self) -> String {
        self.texts
            .pop()
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }
}
