use crate::cleaner;
use crate::reference::{Author, ParsedReference, RefKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GROBID_URL: &str = "https://kermitt2-grobid.hf.space";

const PARSE_TIMEOUT: Duration = Duration::from_secs(10);
const ALIVE_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = "gostbib/0.1.0";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

#[derive(Error, Debug)]
pub enum GrobidError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Failed to parse TEI response: {0}")]
    ParseError(String),
}

/// Seam for the external citation-parsing service. Failures are absorbed
/// behind this trait: an unreachable service or a malformed response yields
/// an empty record, never an error.
#[async_trait]
pub trait CitationParser: Send + Sync {
    async fn parse_citation(&self, text: &str) -> ParsedReference;

    /// Liveness of the backing service. Parsers without a remote service
    /// are always available.
    async fn is_alive(&self) -> bool {
        true
    }
}

/// Client for a GROBID-compatible citation parsing service.
pub struct GrobidClient {
    client: Client,
    base_url: String,
}

impl GrobidClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one reference string to the service and extract a structured
    /// record from the TEI XML it returns.
    async fn try_parse(&self, text: &str) -> Result<ParsedReference, GrobidError> {
        let response = self
            .client
            .post(format!("{}/api/processCitation", self.base_url))
            .form(&[("citations", text), ("consolidateCitations", "1")])
            .timeout(PARSE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let xml = response.text().await?;
        let mut parsed = parse_tei(&xml)?;

        // The service sometimes loses a URL present verbatim in the input.
        if parsed.url.is_none() {
            parsed.url = cleaner::extract_url(text);
        }

        Ok(parsed)
    }

    /// Liveness probe against the service.
    pub async fn is_alive(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/isalive", self.base_url))
            .timeout(ALIVE_TIMEOUT)
            .send()
            .await;

        matches!(result, Ok(response) if response.status().is_success())
    }
}

impl Default for GrobidClient {
    fn default() -> Self {
        Self::new(DEFAULT_GROBID_URL)
    }
}

#[async_trait]
impl CitationParser for GrobidClient {
    async fn parse_citation(&self, text: &str) -> ParsedReference {
        match self.try_parse(text).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "GROBID parsing failed, treating as empty extraction");
                ParsedReference::default()
            }
        }
    }

    async fn is_alive(&self) -> bool {
        GrobidClient::is_alive(self).await
    }
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

#[derive(Default)]
struct TeiState {
    in_analytic: bool,
    in_monogr: bool,
    in_imprint: bool,
    in_author: bool,
    current_tag: String,

    surname: Option<String>,
    forenames: Vec<String>,
    analytic_authors: Vec<Author>,
    monogr_authors: Vec<Author>,

    // (level attribute, text) pairs from both analytic and monogr
    titles: Vec<(Option<String>, String)>,
    title_level: Option<String>,
    title_text: String,

    year: Option<String>,

    scope_unit: Option<String>,
    scope_from: Option<String>,
    scope_to: Option<String>,
    scope_text: String,
    volume: Option<String>,
    issue: Option<String>,
    pages: Option<String>,

    // (type attribute, value) pairs
    idnos: Vec<(Option<String>, String)>,
    idno_type: Option<String>,
    idno_text: String,

    ptr_target: Option<String>,
    ref_target: Option<String>,

    publisher: Option<String>,
    pub_place: Option<String>,
}

impl TeiState {
    fn open(&mut self, e: &BytesStart) {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
        self.current_tag = name.clone();

        match name.as_str() {
            "analytic" => self.in_analytic = true,
            "monogr" => self.in_monogr = true,
            "imprint" => self.in_imprint = true,
            "author" => {
                self.in_author = true;
                self.surname = None;
                self.forenames.clear();
            }
            "title" => {
                self.title_level = attr(e, "level");
                self.title_text.clear();
            }
            "biblScope" if self.in_imprint => {
                self.scope_unit = attr(e, "unit");
                self.scope_from = attr(e, "from");
                self.scope_to = attr(e, "to");
                self.scope_text.clear();
            }
            "idno" => {
                self.idno_type = attr(e, "type");
                self.idno_text.clear();
            }
            "date" if self.in_imprint => {
                if self.year.is_none() {
                    self.year = attr(e, "when");
                }
            }
            "ptr" => {
                if self.ptr_target.is_none() {
                    self.ptr_target = attr(e, "target");
                }
            }
            "ref" => {
                if self.ref_target.is_none() {
                    self.ref_target = attr(e, "target");
                }
            }
            _ => {}
        }
    }

    /// Self-closing elements carry all their data in attributes.
    fn empty(&mut self, e: &BytesStart) {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();

        match name.as_str() {
            "date" if self.in_imprint => {
                if self.year.is_none() {
                    self.year = attr(e, "when");
                }
            }
            "biblScope" if self.in_imprint => {
                self.scope_unit = attr(e, "unit");
                self.scope_from = attr(e, "from");
                self.scope_to = attr(e, "to");
                self.scope_text.clear();
                self.finish_scope();
            }
            "ptr" => {
                if self.ptr_target.is_none() {
                    self.ptr_target = attr(e, "target");
                }
            }
            "ref" => {
                if self.ref_target.is_none() {
                    self.ref_target = attr(e, "target");
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        match self.current_tag.as_str() {
            "surname" if self.in_author => self.surname = Some(text.to_string()),
            "forename" if self.in_author => self.forenames.push(text.to_string()),
            "title" => self.title_text.push_str(text),
            "biblScope" => self.scope_text.push_str(text),
            "idno" => self.idno_text.push_str(text),
            "publisher" if self.in_imprint => self.publisher = Some(text.to_string()),
            "pubPlace" if self.in_imprint => self.pub_place = Some(text.to_string()),
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "analytic" => self.in_analytic = false,
            "monogr" => self.in_monogr = false,
            "imprint" => self.in_imprint = false,
            "author" => {
                self.in_author = false;
                // Surname is required for an author entry to be kept.
                if let Some(surname) = self.surname.take() {
                    let author = Author {
                        surname,
                        forename: self.forenames.join(" "),
                    };
                    if self.in_analytic {
                        self.analytic_authors.push(author);
                    } else if self.in_monogr {
                        self.monogr_authors.push(author);
                    }
                }
                self.forenames.clear();
            }
            "title" => {
                let text = self.title_text.trim().to_string();
                if !text.is_empty() {
                    self.titles.push((self.title_level.take(), text));
                } else {
                    self.title_level = None;
                }
            }
            "biblScope" => self.finish_scope(),
            "idno" => {
                let value = self.idno_text.trim().to_string();
                if !value.is_empty() {
                    self.idnos.push((self.idno_type.take(), value));
                } else {
                    self.idno_type = None;
                }
            }
            _ => {}
        }
        self.current_tag.clear();
    }

    fn finish_scope(&mut self) {
        let text = self.scope_text.trim().to_string();
        let text = if text.is_empty() { None } else { Some(text) };

        match self.scope_unit.take().as_deref() {
            Some("volume") => self.volume = text,
            Some("issue") => self.issue = text,
            Some("page") => {
                let from = self.scope_from.take();
                let to = self.scope_to.take();
                self.pages = match (from, to) {
                    (Some(from), Some(to)) => Some(format!("{}-{}", from, to)),
                    (Some(bound), None) | (None, Some(bound)) => Some(bound),
                    (None, None) => text,
                };
            }
            _ => {}
        }
        self.scope_from = None;
        self.scope_to = None;
    }

    fn title_by_level(&self, level: &str) -> Option<String> {
        self.titles
            .iter()
            .find(|(l, _)| l.as_deref() == Some(level))
            .map(|(_, t)| t.clone())
    }

    fn into_reference(self, raw_xml: &str) -> ParsedReference {
        let authors = if !self.analytic_authors.is_empty() {
            self.analytic_authors.clone()
        } else {
            self.monogr_authors.clone()
        };

        let title_analytic = self.title_by_level("a");
        let title_monograph = self.title_by_level("m");
        let journal = self.title_by_level("j");

        let mut doi = None;
        let mut pmid = None;
        let mut pmcid = None;
        let mut arxiv = None;
        let mut url_idno = None;

        for (id_type, value) in &self.idnos {
            match id_type.as_deref() {
                Some(t) if t.eq_ignore_ascii_case("doi") => doi = Some(value.clone()),
                Some(t) if t.eq_ignore_ascii_case("pmid") => pmid = Some(value.clone()),
                Some(t) if t.eq_ignore_ascii_case("pmcid") => pmcid = Some(value.clone()),
                Some(t) if t.eq_ignore_ascii_case("arxiv") => arxiv = Some(value.clone()),
                Some(t) if t.eq_ignore_ascii_case("url") || t.eq_ignore_ascii_case("uri") => {
                    url_idno = Some(value.clone())
                }
                // An untyped identifier with a value defaults to a DOI.
                None if doi.is_none() => doi = Some(value.clone()),
                _ => {}
            }
        }

        let url = url_idno.or(self.ptr_target).or(self.ref_target);

        let kind = if journal.is_some() {
            RefKind::Article
        } else if title_analytic.is_some() && title_monograph.is_some() {
            RefKind::Chapter
        } else if title_monograph.is_some() {
            RefKind::Book
        } else {
            RefKind::Article
        };

        ParsedReference {
            authors,
            title: title_analytic.or(title_monograph),
            journal,
            year: self.year,
            volume: self.volume,
            issue: self.issue,
            pages: self.pages,
            doi,
            pmid,
            pmcid,
            arxiv,
            url,
            publisher: self.publisher,
            publisher_place: self.pub_place,
            kind: Some(kind),
            raw_citation: Some(derive_raw_citation(raw_xml)),
        }
    }
}

/// Parse the TEI `biblStruct` response of the citation service into a
/// structured record. An unexpected shape yields an empty record.
pub fn parse_tei(xml: &str) -> Result<ParsedReference, GrobidError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = TeiState::default();
    let mut seen_bibl_struct = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"biblStruct" {
                    seen_bibl_struct = true;
                }
                state.open(e);
            }
            Ok(Event::Empty(ref e)) => state.empty(e),
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                state.text(&text);
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                state.close(&name);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(GrobidError::ParseError(format!(
                    "Error reading TEI XML: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_bibl_struct {
        return Ok(ParsedReference::default());
    }

    Ok(state.into_reference(xml))
}

/// Build a display-only citation string from the raw TEI by punctuating
/// element boundaries and stripping all markup.
fn derive_raw_citation(xml: &str) -> String {
    let punctuated = xml
        .replace("/title>", "/title>. ")
        .replace("/forename>", "/forename> ")
        .replace("/surname>", "/surname> ")
        .replace("/persName>", "/persName>, ")
        .replace("/date>", "/date>. ")
        .replace("/publisher>", "/publisher>, ")
        .replace("/pubPlace>", "/pubPlace>. ")
        .replace("unit=\"volume\">", "unit=\"volume\">, vol. ")
        .replace("unit=\"page\">", "unit=\"page\">, p. ");

    let stripped = TAG_RE.replace_all(&punctuated, "");

    let unescaped = stripped
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'");

    unescaped
        .replace('\n', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ,", ",")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_XML: &str = r#"<biblStruct xmlns="http://www.tei-c.org/ns/1.0">
  <analytic>
    <title level="a" type="main">Заголовок статьи</title>
    <author>
      <persName><forename type="first">И</forename><surname>Иванов</surname></persName>
    </author>
    <idno type="DOI">10.1234/example</idno>
  </analytic>
  <monogr>
    <title level="j">Журнал</title>
    <imprint>
      <date type="published" when="2020"/>
      <biblScope unit="volume">5</biblScope>
      <biblScope unit="issue">2</biblScope>
      <biblScope unit="page" from="10" to="15"/>
    </imprint>
  </monogr>
</biblStruct>"#;

    #[test]
    fn parses_article_bibl_struct() {
        let parsed = parse_tei(ARTICLE_XML).unwrap();

        assert_eq!(parsed.authors.len(), 1);
        assert_eq!(parsed.authors[0].surname, "Иванов");
        assert_eq!(parsed.authors[0].forename, "И");
        assert_eq!(parsed.title, Some("Заголовок статьи".to_string()));
        assert_eq!(parsed.journal, Some("Журнал".to_string()));
        assert_eq!(parsed.year, Some("2020".to_string()));
        assert_eq!(parsed.volume, Some("5".to_string()));
        assert_eq!(parsed.issue, Some("2".to_string()));
        assert_eq!(parsed.pages, Some("10-15".to_string()));
        assert_eq!(parsed.doi, Some("10.1234/example".to_string()));
        assert_eq!(parsed.kind, Some(RefKind::Article));
    }

    #[test]
    fn falls_back_to_monograph_title() {
        let xml = r#"<biblStruct>
  <monogr>
    <title level="m">Название книги</title>
    <author><persName><surname>Петров</surname></persName></author>
    <imprint>
      <date when="2019"/>
      <publisher>Наука</publisher>
      <pubPlace>Москва</pubPlace>
    </imprint>
  </monogr>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.title, Some("Название книги".to_string()));
        assert_eq!(parsed.journal, None);
        assert_eq!(parsed.publisher, Some("Наука".to_string()));
        assert_eq!(parsed.publisher_place, Some("Москва".to_string()));
        assert_eq!(parsed.authors[0].forename, "");
        assert_eq!(parsed.kind, Some(RefKind::Book));
    }

    #[test]
    fn analytic_plus_monograph_titles_form_a_chapter() {
        let xml = r#"<biblStruct>
  <analytic><title level="a">Глава</title></analytic>
  <monogr><title level="m">Сборник</title></monogr>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.title, Some("Глава".to_string()));
        assert_eq!(parsed.kind, Some(RefKind::Chapter));
    }

    #[test]
    fn page_text_used_when_bounds_absent() {
        let xml = r#"<biblStruct>
  <monogr>
    <title level="j">Journal</title>
    <imprint><biblScope unit="page">10-15</biblScope></imprint>
  </monogr>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.pages, Some("10-15".to_string()));
    }

    #[test]
    fn single_page_bound_is_kept() {
        let xml = r#"<biblStruct>
  <monogr>
    <title level="j">Journal</title>
    <imprint><biblScope unit="page" from="42"/></imprint>
  </monogr>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.pages, Some("42".to_string()));
    }

    #[test]
    fn untyped_idno_defaults_to_doi() {
        let xml = r#"<biblStruct>
  <analytic>
    <title level="a">Title</title>
    <idno>10.5555/fallback</idno>
    <idno type="PMID">123456</idno>
  </analytic>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.doi, Some("10.5555/fallback".to_string()));
        assert_eq!(parsed.pmid, Some("123456".to_string()));
    }

    #[test]
    fn url_priority_prefers_typed_idno_over_ptr() {
        let xml = r#"<biblStruct>
  <analytic>
    <title level="a">Title</title>
    <idno type="url">https://idno.example.com</idno>
  </analytic>
  <ptr target="https://ptr.example.com"/>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.url, Some("https://idno.example.com".to_string()));
    }

    #[test]
    fn ptr_target_wins_over_ref_target() {
        let xml = r#"<biblStruct>
  <analytic><title level="a">Title</title></analytic>
  <ref target="https://ref.example.com"/>
  <ptr target="https://ptr.example.com"/>
</biblStruct>"#;

        let parsed = parse_tei(xml).unwrap();
        assert_eq!(parsed.url, Some("https://ptr.example.com".to_string()));
    }

    #[test]
    fn non_tei_response_yields_empty_record() {
        let parsed = parse_tei("<html><body>Bad Gateway</body></html>").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn raw_citation_strips_markup_and_punctuates() {
        let raw = derive_raw_citation(
            "<analytic><title level=\"a\">Заголовок</title><author><persName><forename>И</forename><surname>Иванов</surname></persName></author></analytic>",
        );
        assert!(raw.contains("Заголовок."));
        assert!(raw.contains("И Иванов"));
        assert!(!raw.contains('<'));
    }

    #[tokio::test]
    async fn client_parses_service_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/processCitation")
            .with_status(200)
            .with_body(ARTICLE_XML)
            .create_async()
            .await;

        let client = GrobidClient::new(server.url());
        let parsed = client
            .parse_citation("Иванов И. Заголовок статьи // Журнал. 2020.")
            .await;

        mock.assert_async().await;
        assert_eq!(parsed.title, Some("Заголовок статьи".to_string()));
        assert_eq!(parsed.journal, Some("Журнал".to_string()));
    }

    #[tokio::test]
    async fn service_failure_is_absorbed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/processCitation")
            .with_status(502)
            .create_async()
            .await;

        let client = GrobidClient::new(server.url());
        let parsed = client.parse_citation("Иванов И. Статья.").await;
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn literal_url_in_input_survives_extraction() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/processCitation")
            .with_status(200)
            .with_body("<biblStruct><analytic><title level=\"a\">Title</title></analytic></biblStruct>")
            .create_async()
            .await;

        let client = GrobidClient::new(server.url());
        let parsed = client.parse_citation("Title. https://example.com/paper.").await;
        assert_eq!(parsed.url, Some("https://example.com/paper".to_string()));
    }

    #[tokio::test]
    async fn is_alive_reflects_service_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/isalive")
            .with_status(200)
            .with_body("true")
            .create_async()
            .await;

        let client = GrobidClient::new(server.url());
        assert!(client.is_alive().await);
    }
}
