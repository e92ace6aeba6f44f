//! Registrar timetable source.
//!
//! The timetable is a single HTML page listing every section of every
//! course. The first row of the data table carries the column headers; each
//! following row becomes one record keyed `Term-Subj-Num-Sec`.

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::http::HttpFetcher;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::traits::source::{RawDocument, SnapshotSource};
use crate::types::snapshot::{FieldValue, Record, Snapshot};

/// Public timetable query endpoint.
pub const DEFAULT_TIMETABLE_URL: &str =
    "https://oracle-www.dartmouth.edu/dart/groucho/timetable.display_courses";

/// Form fields selecting every subject, term and delivery mode.
pub const TIMETABLE_FORM: &[(&str, &str)] = &[
    ("distribradio", "alldistribs"),
    ("depts", "no_value"),
    ("periods", "no_value"),
    ("distribs", "no_value"),
    ("distribs_i", "no_value"),
    ("distribs_wc", "no_value"),
    ("deliverymodes", "no_value"),
    ("pmode", "public"),
    ("term", ""),
    ("levl", ""),
    ("fys", "n"),
    ("wrt", "n"),
    ("pe", "n"),
    ("review", "n"),
    ("crnl", "no_value"),
    ("classyear", "2008"),
    ("searchtype", "Subject Area(s)"),
    ("termradio", "allterms"),
    ("terms", "no_value"),
    ("deliveryradio", "selectdelivery"),
    ("subjectradio", "allsubjects"),
    ("hoursradio", "allhours"),
    ("sortorder", "dept"),
];

/// Column whose cell is split into `Title`, `DeliveryMode` and `Description`.
const TITLE_COLUMN: &str = "Title and Delivery Mode";

/// Columns that make up the record key, in key order.
const KEY_COLUMNS: [&str; 4] = ["Term", "Subj", "Num", "Sec"];

lazy_static! {
    static ref ROW_SELECTOR: Selector =
        Selector::parse("div.data-table > table > tbody > tr").unwrap();
    static ref HEADER_SELECTOR: Selector = Selector::parse("th").unwrap();
    static ref CELL_SELECTOR: Selector = Selector::parse("td").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse("a").unwrap();

    // "Title (Remote: Synchronous)(Lab)" -> title, delivery mode, addendum
    static ref TITLE_REGEX: Regex = Regex::new(
        r"(?i)^(.*?)(?:\s\(((?:Remote|On Campus|Individualized)[^)]*)\))?(\(.*\))?$"
    )
    .unwrap();
}

/// Scrapes the course timetable.
pub struct TimetableSource {
    fetcher: HttpFetcher,
    url: String,
}

impl TimetableSource {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            url: DEFAULT_TIMETABLE_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for TimetableSource {
    async fn fetch(&self) -> AcquisitionResult<RawDocument> {
        let body = self.fetcher.post_form(&self.url, TIMETABLE_FORM).await?;
        Ok(RawDocument {
            body,
            url: Some(self.url.clone()),
            fetched_at: Utc::now(),
        })
    }

    fn parse(&self, document: &RawDocument) -> AcquisitionResult<Snapshot> {
        parse_timetable(&document.body)
    }

    fn name(&self) -> &str {
        "timetable"
    }
}

/// Parse a timetable page into a snapshot of course sections.
///
/// Fails when the data table is missing, when a key column is missing from
/// the headers, or when no section could be read. Rows without a complete
/// key are skipped.
pub fn parse_timetable(html: &str) -> AcquisitionResult<Snapshot> {
    let document = Html::parse_document(html);
    let mut rows = document.select(&ROW_SELECTOR);

    let header_row = rows.next().ok_or_else(|| AcquisitionError::Parse {
        reason: "timetable data table not found".to_string(),
    })?;
    let headers: Vec<String> = header_row
        .select(&HEADER_SELECTOR)
        .map(|th| element_text(&th))
        .collect();

    if let Some(missing) = KEY_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h.as_str() == **column))
    {
        return Err(AcquisitionError::Parse {
            reason: format!("timetable header is missing the {} column", missing),
        });
    }

    let mut snapshot = Snapshot::new();
    let mut skipped = 0usize;

    for row in rows {
        let cells: Vec<ElementRef> = row.select(&CELL_SELECTOR).collect();
        if cells.is_empty() {
            continue;
        }

        let record = parse_row(&headers, &cells);
        match record_key(&record) {
            Some(key) => {
                if snapshot.insert(key.clone(), record).is_some() {
                    debug!(key = %key, "Duplicate timetable row, keeping the last one");
                }
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, "Skipped timetable rows without a complete key");
    }

    if snapshot.is_empty() {
        return Err(AcquisitionError::Parse {
            reason: "timetable contained no course sections".to_string(),
        });
    }

    Ok(snapshot)
}

fn parse_row(headers: &[String], cells: &[ElementRef]) -> Record {
    let mut record = Record::new();

    for (header, cell) in headers.iter().zip(cells) {
        if header == TITLE_COLUMN {
            parse_title_cell(cell, &mut record);
            continue;
        }

        let value = element_text(cell);
        if value.is_empty() {
            record.insert(header.as_str(), FieldValue::Null);
        } else {
            record.insert(header.as_str(), value);
        }
    }

    record
}

/// Fill `Title`, `DeliveryMode` and `Description` from the title cell.
fn parse_title_cell(cell: &ElementRef, record: &mut Record) {
    let description = cell
        .select(&LINK_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| href.split('\'').nth(1));
    if let Some(description) = description {
        record.insert("Description", description);
    }

    let text = element_text(cell);
    let (title, delivery_mode) = split_title(&text);
    record.insert("Title", title);
    if let Some(mode) = delivery_mode {
        record.insert("DeliveryMode", mode);
    }
}

/// Split `"Calculus (Remote: Asynchronous)(Lab)"` into
/// `("Calculus (Lab)", Some("Remote: Asynchronous"))`.
pub fn split_title(text: &str) -> (String, Option<String>) {
    let Some(captures) = TITLE_REGEX.captures(text) else {
        return (text.to_string(), None);
    };

    let base = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let title = match captures.get(3) {
        Some(addendum) => format!("{} {}", base, addendum.as_str()),
        None => base.to_string(),
    };
    let delivery_mode = captures.get(2).map(|m| m.as_str().to_string());

    (title, delivery_mode)
}

fn record_key(record: &Record) -> Option<String> {
    let parts: Option<Vec<&str>> = KEY_COLUMNS
        .iter()
        .map(|column| record.get(column).and_then(FieldValue::as_str))
        .map(|part| part.filter(|p| !p.is_empty()))
        .collect();
    parts.map(|parts| parts.join("-"))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}
