//! Course catalog (ORC) source.
//!
//! The catalog is a tree of department pages whose leaves are course pages.
//! `fetch` walks the tree from the departments index, downloads every course
//! page and bundles them into one JSON document; `parse` reads each page
//! into a record keyed `Subj-Num`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use super::http::HttpFetcher;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::traits::source::{RawDocument, SnapshotSource};
use crate::types::snapshot::{FieldValue, Record, Snapshot};

/// Catalog host.
pub const DEFAULT_ORC_ROOT: &str = "http://dartmouth.smartcatalogiq.com";

/// Departments index below the catalog root.
pub const DEFAULT_ORC_INDEX_PATH: &str = "/en/current/orc/Departments-Programs-Undergraduate";

/// Course pages fetched at the same time.
const FETCH_BATCH: usize = 10;

/// Headings on a course page and the fields they fill.
const SECTION_FIELDS: [(&str, &str); 4] = [
    ("Instructor", "Instructor"),
    ("Cross Listed Courses", "Xlist"),
    ("Distributive and/or World Culture", "Distrib"),
    ("Offered", "Offered"),
];

lazy_static! {
    static ref CHILD_SELECTOR: Selector = Selector::parse("ul.navLocal > li").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse("a").unwrap();
    static ref MAIN_SELECTOR: Selector =
        Selector::parse("div#rightpanel > div#main").unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse("h1").unwrap();
    static ref DESCRIPTION_SELECTOR: Selector = Selector::parse("div.desc").unwrap();
    static ref SECTION_SELECTOR: Selector = Selector::parse("h3").unwrap();

    // "COSC 1" or "MATH 8.01"
    static ref COURSE_REGEX: Regex = Regex::new(r"^[A-Z]+\s[0-9]+(\.[0-9]+)?$").unwrap();
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// One entry of a department navigation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    pub text: String,
    pub href: String,
    pub has_children: bool,
}

impl CatalogLink {
    /// `(subject, number)` when the link text names a course.
    pub fn course(&self) -> Option<(String, String)> {
        if !COURSE_REGEX.is_match(&self.text) {
            return None;
        }
        let (subj, num) = self.text.split_once(char::is_whitespace)?;
        Some((subj.to_string(), num.trim().to_string()))
    }
}

/// A downloaded course page, as bundled by `fetch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoursePage {
    pub subj: String,
    pub num: String,
    pub url: String,
    pub html: String,
}

/// Scrapes the course catalog.
pub struct OrcSource {
    fetcher: HttpFetcher,
    root: String,
    index_path: String,
}

impl OrcSource {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            root: DEFAULT_ORC_ROOT.to_string(),
            index_path: DEFAULT_ORC_INDEX_PATH.to_string(),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_index_path(mut self, path: impl Into<String>) -> Self {
        self.index_path = path.into();
        self
    }

    fn resolve(&self, href: &str) -> AcquisitionResult<Url> {
        let base = Url::parse(&self.root).map_err(|e| AcquisitionError::Parse {
            reason: format!("invalid catalog root {}: {}", self.root, e),
        })?;
        base.join(href).map_err(|e| AcquisitionError::Parse {
            reason: format!("invalid catalog link {}: {}", href, e),
        })
    }

    /// Walk the department tree and collect every course page URL.
    async fn crawl_courses(&self) -> AcquisitionResult<BTreeMap<(String, String), String>> {
        let mut courses = BTreeMap::new();
        let mut visited = BTreeSet::new();
        let mut queue = vec![self.resolve(&self.index_path)?.to_string()];

        while let Some(url) = queue.pop() {
            if !visited.insert(url.clone()) {
                continue;
            }
            debug!(url = %url, "Crawling catalog page");
            let html = self.fetcher.get(&url).await?;

            for link in parse_children(&html) {
                if link.has_children {
                    let mut child = self.resolve(&link.href)?;
                    child.set_query(Some("getchildren=1"));
                    queue.push(child.to_string());
                }
                if let Some(course) = link.course() {
                    let page = self.resolve(&link.href)?.to_string();
                    courses.entry(course).or_insert(page);
                }
            }
        }

        info!(pages = visited.len(), courses = courses.len(), "Crawled catalog");
        Ok(courses)
    }
}

#[async_trait]
impl SnapshotSource for OrcSource {
    async fn fetch(&self) -> AcquisitionResult<RawDocument> {
        let courses: Vec<((String, String), String)> =
            self.crawl_courses().await?.into_iter().collect();
        let mut pages = Vec::with_capacity(courses.len());

        for batch in courses.chunks(FETCH_BATCH) {
            let mut tasks = JoinSet::new();
            for ((subj, num), url) in batch.iter().cloned() {
                let fetcher = self.fetcher.clone();
                tasks.spawn(async move {
                    let html = fetcher.get(&url).await?;
                    Ok::<_, AcquisitionError>(CoursePage {
                        subj,
                        num,
                        url,
                        html,
                    })
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let page = joined.map_err(|e| AcquisitionError::Source(Box::new(e)))??;
                pages.push(page);
            }
            debug!(fetched = pages.len(), total = courses.len(), "Fetched course batch");
        }

        let body = serde_json::to_string(&pages).map_err(|e| AcquisitionError::Source(Box::new(e)))?;
        Ok(RawDocument {
            body,
            url: Some(self.resolve(&self.index_path)?.to_string()),
            fetched_at: Utc::now(),
        })
    }

    fn parse(&self, document: &RawDocument) -> AcquisitionResult<Snapshot> {
        let pages: Vec<CoursePage> =
            serde_json::from_str(&document.body).map_err(|e| AcquisitionError::Parse {
                reason: format!("course bundle is not valid JSON: {}", e),
            })?;
        parse_orc(&pages)
    }

    fn name(&self) -> &str {
        "orc"
    }
}

/// Navigation entries of a department page.
pub fn parse_children(html: &str) -> Vec<CatalogLink> {
    let document = Html::parse_document(html);

    document
        .select(&CHILD_SELECTOR)
        .filter_map(|item| {
            let link = item.select(&LINK_SELECTOR).next()?;
            let href = link.value().attr("href")?;
            Some(CatalogLink {
                text: collapse(&link.text().collect::<String>()),
                href: href.to_string(),
                has_children: item.value().classes().any(|c| c == "hasChildren"),
            })
        })
        .collect()
}

/// Parse downloaded course pages into a snapshot.
///
/// A page without the main content panel fails the whole snapshot.
pub fn parse_orc(pages: &[CoursePage]) -> AcquisitionResult<Snapshot> {
    if pages.is_empty() {
        return Err(AcquisitionError::Parse {
            reason: "catalog contained no courses".to_string(),
        });
    }

    let mut snapshot = Snapshot::new();
    for page in pages {
        let mut record = parse_course(&page.html).ok_or_else(|| AcquisitionError::Parse {
            reason: format!("course page {} has no content panel", page.url),
        })?;
        record.insert("Subj", page.subj.as_str());
        record.insert("Num", page.num.as_str());

        let key = format!("{}-{}", page.subj, page.num);
        if snapshot.insert(key.clone(), record).is_some() {
            warn!(key = %key, "Duplicate course page, keeping the last one");
        }
    }

    Ok(snapshot)
}

/// Read one course page. `None` when the content panel is missing.
pub fn parse_course(html: &str) -> Option<Record> {
    let document = Html::parse_document(html);
    let main = document.select(&MAIN_SELECTOR).next()?;

    let mut record = Record::new();
    record.insert("Title", first_text(&main, &TITLE_SELECTOR));
    record.insert("Description", first_text(&main, &DESCRIPTION_SELECTOR));
    for (_, field) in SECTION_FIELDS {
        record.insert(field, FieldValue::Null);
    }

    for heading in main.select(&SECTION_SELECTOR) {
        let name = collapse(&heading.text().collect::<String>());
        let Some((_, field)) = SECTION_FIELDS.iter().find(|(section, _)| *section == name) else {
            continue;
        };

        let content = section_text(&heading);
        if !content.is_empty() {
            record.insert(*field, content);
        }
    }

    Some(record)
}

/// Text between a heading and the next heading or block.
fn section_text(heading: &ElementRef) -> String {
    let mut text = String::new();

    for sibling in heading.next_siblings() {
        match sibling.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if matches!(e.name(), "h3" | "div") => break,
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(sibling) {
                    text.extend(element.text());
                }
                text.push(' ');
            }
            _ => {}
        }
    }

    collapse(&text)
}

fn first_text(parent: &ElementRef, selector: &Selector) -> FieldValue {
    match parent.select(selector).next() {
        Some(element) => {
            let text = collapse(&element.text().collect::<String>());
            if text.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(text)
            }
        }
        None => FieldValue::Null,
    }
}

fn collapse(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").to_string()
}
