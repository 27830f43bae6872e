use serde::{Deserialize, Serialize};

/// One author as extracted from the parsing service. A surname is required
/// for the entry to be kept; forenames are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub surname: String,
    pub forename: String,
}

/// Reference kind inferred from the TEI structure, never user-supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Article,
    Book,
    Chapter,
    Webpage,
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefKind::Article => write!(f, "article"),
            RefKind::Book => write!(f, "book"),
            RefKind::Chapter => write!(f, "chapter"),
            RefKind::Webpage => write!(f, "webpage"),
        }
    }
}

/// Structured record extracted from one citation by the parsing service.
/// Every field is optional: a service failure yields the default (empty)
/// record rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReference {
    pub authors: Vec<Author>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub year: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub arxiv: Option<String>,
    pub url: Option<String>,
    pub publisher: Option<String>,
    pub publisher_place: Option<String>,
    pub kind: Option<RefKind>,
    /// Markup-stripped rendition of the raw service response. Display-only
    /// last resort; never fed back into the structured fields.
    pub raw_citation: Option<String>,
}

impl ParsedReference {
    /// True when the service extracted nothing at all.
    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
            && self.title.is_none()
            && self.journal.is_none()
            && self.year.is_none()
            && self.url.is_none()
            && self.doi.is_none()
    }
}
