use crate::csl::{CslItem, CslType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static LEADING_NUMERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*").unwrap());

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to read style file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSL style file not found: {file_name} (tried {tried:?})")]
    StyleNotFound {
        file_name: &'static str,
        tried: Vec<PathBuf>,
    },
    #[error("Style engine failed: {0}")]
    EngineError(String),
}

/// The two supported GOST bibliography styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GostStyle {
    /// GOST R 7.0.5-2008
    Gost2008,
    /// GOST R 7.0.100-2018
    #[default]
    Gost2018,
}

impl GostStyle {
    pub fn file_name(&self) -> &'static str {
        match self {
            GostStyle::Gost2008 => "gost-r-7-0-5-2008.csl",
            GostStyle::Gost2018 => "gost-r-7-0-100-2018.csl",
        }
    }
}

impl std::fmt::Display for GostStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GostStyle::Gost2008 => write!(f, "gost-2008"),
            GostStyle::Gost2018 => write!(f, "gost-2018"),
        }
    }
}

impl FromStr for GostStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gost-2008" => Ok(GostStyle::Gost2008),
            "gost-2018" => Ok(GostStyle::Gost2018),
            other => Err(format!(
                "unknown style '{}', expected gost-2008 or gost-2018",
                other
            )),
        }
    }
}

/// Minimal ru-RU locale handed to the style engine.
pub const RU_LOCALE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<locale xmlns="http://purl.org/net/xbiblio/csl" version="1.0" xml:lang="ru-RU">
  <terms>
    <term name="accessed">дата обращения</term>
    <term name="and">и</term>
    <term name="et-al">и др.</term>
    <term name="page" form="short">С.</term>
    <term name="volume" form="short">Т.</term>
    <term name="issue" form="short">№</term>
  </terms>
</locale>"#;

/// Seam for an external CSL rendering engine. The built-in fallback
/// formatter is used whenever no engine is configured or the engine fails.
pub trait StyleEngine: Send + Sync {
    fn render(
        &self,
        style_xml: &str,
        locale_xml: &str,
        items: &[CslItem],
    ) -> Result<Vec<String>, FormatError>;
}

fn candidate_paths(file_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("styles")
        .join(file_name)];
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(file_name));
        paths.push(cwd.join("styles").join(file_name));
    }
    paths
}

fn read_first(paths: &[PathBuf]) -> Option<String> {
    for path in paths {
        if let Ok(content) = fs::read_to_string(path) {
            tracing::debug!(path = %path.display(), "loaded CSL style");
            return Some(content);
        }
    }
    None
}

/// Load the CSL definition for a style, trying the crate's styles
/// directory, the working directory, and a styles subdirectory of it.
pub fn load_csl_style(style: GostStyle) -> Result<String, FormatError> {
    let file_name = style.file_name();
    let paths = candidate_paths(file_name);
    read_first(&paths).ok_or(FormatError::StyleNotFound {
        file_name,
        tried: paths,
    })
}

/// Strip residual engine markup, collapse whitespace, and drop any leading
/// numeral the engine emitted; numbering belongs to the caller.
fn clean_engine_entry(entry: &str) -> String {
    let stripped = TAG_RE.replace_all(entry, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    LEADING_NUMERAL_RE.replace(&collapsed, "").trim().to_string()
}

fn try_engine(
    items: &[CslItem],
    style: GostStyle,
    engine: &dyn StyleEngine,
) -> Result<Vec<String>, FormatError> {
    let style_xml = load_csl_style(style)?;
    let entries = engine.render(&style_xml, RU_LOCALE, items)?;
    Ok(entries.iter().map(|e| clean_engine_entry(e)).collect())
}

/// Format a batch of records. The engine path degrades to the built-in
/// GOST formatter for the whole batch on any failure, including a missing
/// style file.
pub fn format_bibliography(
    items: &[CslItem],
    style: GostStyle,
    engine: Option<&dyn StyleEngine>,
) -> Vec<String> {
    if let Some(engine) = engine {
        match try_engine(items, style, engine) {
            Ok(entries) => return entries,
            Err(e) => {
                tracing::warn!(error = %e, "style engine failed, using built-in GOST formatter");
            }
        }
    }

    items.iter().map(format_fallback).collect()
}

fn author_initials(given: &str) -> String {
    given
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .map(|c| format!("{}.", c.to_uppercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_segments(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        if !out.is_empty() {
            if out.ends_with('.') {
                out.push(' ');
            } else {
                out.push_str(". ");
            }
        }
        out.push_str(segment);
    }
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

/// Deterministic GOST formatter used when the style engine is unavailable.
/// Produces a non-empty, period-terminated string for any record.
pub fn format_fallback(item: &CslItem) -> String {
    let mut segments: Vec<String> = Vec::new();

    if let Some(authors) = &item.author {
        if !authors.is_empty() {
            let joined = authors
                .iter()
                .map(|a| format!("{} {}", a.family, author_initials(&a.given)).trim().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            segments.push(joined);
        }
    }

    if let Some(title) = &item.title {
        segments.push(title.clone());
    }

    match item.item_type {
        CslType::ArticleJournal => {
            if let Some(journal) = &item.container_title {
                let mut journal_segment = format!("// {}", journal);
                if let Some(year) = issued_year(item) {
                    journal_segment.push_str(&format!(". {}", year));
                }
                if let Some(volume) = &item.volume {
                    journal_segment.push_str(&format!(". Т. {}", volume));
                }
                if let Some(issue) = &item.issue {
                    journal_segment.push_str(&format!(". № {}", issue));
                }
                segments.push(journal_segment);

                if let Some(page) = &item.page {
                    segments.push(format!("С. {}", page));
                }
            }
        }
        CslType::Book | CslType::Chapter => {
            let mut publisher_parts = Vec::new();
            if let Some(place) = &item.publisher_place {
                publisher_parts.push(place.clone());
            }
            if let Some(publisher) = &item.publisher {
                publisher_parts.push(publisher.clone());
            }
            if !publisher_parts.is_empty() {
                segments.push(publisher_parts.join(": "));
            }
            if let Some(year) = issued_year(item) {
                segments.push(year.to_string());
            }
        }
        // Webpage year is carried by the access date
        CslType::Webpage => {}
    }

    if let Some(doi) = &item.doi {
        segments.push(format!("DOI: {}", doi));
    }

    if let Some(url) = &item.url {
        let mut url_segment = format!("URL: {}", url);
        if let Some(parts) = item.accessed.as_ref().and_then(|d| d.date_parts.first()) {
            if let [year, month, day] = parts[..] {
                url_segment.push_str(&format!(
                    " (дата обращения: {:02}.{:02}.{})",
                    day, month, year
                ));
            }
        }
        segments.push(url_segment);
    }

    join_segments(&segments)
}

fn issued_year(item: &CslItem) -> Option<i32> {
    item.issued
        .as_ref()
        .and_then(|d| d.date_parts.first())
        .and_then(|parts| parts.first())
        .copied()
}
