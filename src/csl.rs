use crate::reference::{ParsedReference, RefKind};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// CSL-JSON item type. Inferred from the parsed record, never supplied by
/// the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CslType {
    #[serde(rename = "article-journal")]
    ArticleJournal,
    #[serde(rename = "book")]
    Book,
    #[serde(rename = "chapter")]
    Chapter,
    #[serde(rename = "webpage")]
    Webpage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslName {
    pub family: String,
    pub given: String,
}

/// CSL-JSON date: `{"date-parts": [[year]]}` or `[[year, month, day]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslDate {
    #[serde(rename = "date-parts")]
    pub date_parts: Vec<Vec<i32>>,
}

impl CslDate {
    pub fn year(year: i32) -> Self {
        Self {
            date_parts: vec![vec![year]],
        }
    }

    pub fn ymd(date: NaiveDate) -> Self {
        Self {
            date_parts: vec![vec![
                date.year(),
                date.month() as i32,
                date.day() as i32,
            ]],
        }
    }
}

/// One bibliographic record in the citation engine's input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: CslType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<CslName>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "container-title", skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<CslDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(rename = "PMID", skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(rename = "PMCID", skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<CslDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "publisher-place", skip_serializing_if = "Option::is_none")]
    pub publisher_place: Option<String>,
}

impl CslItem {
    pub fn new(id: impl Into<String>, item_type: CslType) -> Self {
        Self {
            id: id.into(),
            item_type,
            author: None,
            title: None,
            container_title: None,
            issued: None,
            volume: None,
            issue: None,
            page: None,
            doi: None,
            pmid: None,
            pmcid: None,
            url: None,
            accessed: None,
            publisher: None,
            publisher_place: None,
        }
    }
}

/// Convert a parsed service record into the citation engine's schema.
/// The item type is re-derived here; a URL-bearing record with no stronger
/// signal becomes a webpage, and GOST's retrieval-date requirement stamps
/// `accessed` with the supplied date for any online source.
pub fn to_csl_item(parsed: &ParsedReference, id: &str, today: NaiveDate) -> CslItem {
    let item_type = if parsed.kind == Some(RefKind::Article) || parsed.journal.is_some() {
        CslType::ArticleJournal
    } else if parsed.kind == Some(RefKind::Chapter) {
        CslType::Chapter
    } else if parsed.url.is_some() {
        CslType::Webpage
    } else {
        CslType::Book
    };

    let mut item = CslItem::new(id, item_type);

    if !parsed.authors.is_empty() {
        item.author = Some(
            parsed
                .authors
                .iter()
                .map(|a| CslName {
                    family: a.surname.clone(),
                    given: a.forename.clone(),
                })
                .collect(),
        );
    }

    item.title = parsed.title.clone();
    item.container_title = parsed.journal.clone();
    item.volume = parsed.volume.clone();
    item.issue = parsed.issue.clone();
    item.page = parsed.pages.clone();
    item.doi = parsed.doi.clone();
    item.pmid = parsed.pmid.clone();
    item.pmcid = parsed.pmcid.clone();
    item.url = parsed.url.clone();
    item.publisher = parsed.publisher.clone();
    item.publisher_place = parsed.publisher_place.clone();

    // "2020" or a full "2020-05-01"; anything without a leading integer
    // year is dropped rather than propagated as zero.
    if let Some(year_str) = &parsed.year {
        let leading = year_str
            .split(['-', '/', '.'])
            .next()
            .unwrap_or(year_str.as_str());
        if let Ok(year) = leading.trim().parse::<i32>() {
            item.issued = Some(CslDate::year(year));
        }
    }

    if item.url.is_some() {
        item.accessed = Some(CslDate::ymd(today));
    }

    item
}

/// Expected-field check. Returns human-readable Russian field names, in a
/// fixed order; журнал and страницы apply to journal articles only.
pub fn missing_fields(item: &CslItem) -> Vec<&'static str> {
    let mut missing = Vec::new();

    if item.author.as_ref().map_or(true, |a| a.is_empty()) {
        missing.push("автор");
    }
    if item.title.is_none() {
        missing.push("название");
    }
    if item.issued.is_none() {
        missing.push("год");
    }
    if item.item_type == CslType::ArticleJournal {
        if item.container_title.is_none() {
            missing.push("журнал");
        }
        if item.page.is_none() {
            missing.push("страницы");
        }
    }

    missing
}
