pub mod cleaner;
pub mod csl;
pub mod format;
pub mod grobid;
pub mod reference;
pub mod report;

use chrono::{Local, NaiveDate};
use format::{format_bibliography, GostStyle, StyleEngine};
use futures::{stream, StreamExt};
use grobid::{CitationParser, GrobidClient, DEFAULT_GROBID_URL};
use indicatif::{ProgressBar, ProgressStyle};
use report::{CitationResult, ProcessSummary};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONCURRENCY_LIMIT: usize = 20;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("formatter produced no entry for the reference")]
    MissingFormattedEntry,
}

/// Configuration for the processing pipeline. Passed explicitly; no
/// component reads the process environment on its own.
pub struct PipelineConfig {
    pub grobid_url: String,
    pub style: GostStyle,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grobid_url: DEFAULT_GROBID_URL.to_string(),
            style: GostStyle::default(),
            show_progress: true,
        }
    }
}

/// Result of the clean-only preview operation: no service calls, just the
/// normalizer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanPreview {
    pub cleaned: String,
    pub references: Vec<String>,
}

/// Liveness-check result for the parsing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub available: bool,
    pub message: String,
}

/// Coordinates the reference pipeline: clean and split the pasted text,
/// fan the lines out to the parsing service, map to the citation schema,
/// and format per GOST.
pub struct Pipeline {
    parser: Box<dyn CitationParser>,
    engine: Option<Box<dyn StyleEngine>>,
    style: GostStyle,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let parser = Box::new(GrobidClient::new(config.grobid_url));
        Self {
            parser,
            engine: None,
            style: config.style,
            show_progress: config.show_progress,
        }
    }

    /// Build a pipeline around a custom parser implementation.
    pub fn with_parser(config: PipelineConfig, parser: Box<dyn CitationParser>) -> Self {
        Self {
            parser,
            engine: None,
            style: config.style,
            show_progress: config.show_progress,
        }
    }

    /// Plug in an external CSL style engine. Without one the built-in GOST
    /// formatter handles everything.
    pub fn with_engine(mut self, engine: Box<dyn StyleEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Process a pasted bibliography block into GOST-formatted entries.
    pub async fn process(&self, text: &str) -> ProcessSummary {
        let references = cleaner::split_references(text);

        if references.is_empty() {
            return ProcessSummary::empty();
        }

        let today = Local::now().date_naive();

        let pb = if self.show_progress && references.len() > 1 {
            let pb = ProgressBar::new(references.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        // Lines complete in arbitrary order; pairing each result with its
        // input index keeps the output list input-ordered.
        let mut indexed: Vec<(usize, CitationResult)> =
            stream::iter(references.into_iter().enumerate())
                .map(|(index, reference)| async move {
                    let result = self.process_line(reference, index, today).await;
                    (index, result)
                })
                .buffer_unordered(CONCURRENCY_LIMIT)
                .inspect(|_| pb.inc(1))
                .collect()
                .await;

        pb.finish_and_clear();

        indexed.sort_by_key(|(index, _)| *index);
        ProcessSummary::from_results(indexed.into_iter().map(|(_, result)| result).collect())
    }

    /// Clean-only preview: the normalizer alone, no service calls.
    pub fn clean_preview(&self, text: &str) -> CleanPreview {
        let references = cleaner::split_references(text);
        CleanPreview {
            cleaned: references.join("\n"),
            references,
        }
    }

    /// Probe the parsing service.
    pub async fn check_service(&self) -> ServiceStatus {
        if self.parser.is_alive().await {
            ServiceStatus {
                available: true,
                message: "GROBID сервер доступен".to_string(),
            }
        } else {
            ServiceStatus {
                available: false,
                message: "GROBID сервер недоступен. Убедитесь, что сервер запущен.".to_string(),
            }
        }
    }

    /// Per-line boundary: any failure becomes a non-fatal result entry and
    /// never aborts sibling lines.
    async fn process_line(
        &self,
        reference: String,
        index: usize,
        today: NaiveDate,
    ) -> CitationResult {
        match self.try_process_line(&reference, index, today).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(index, error = %e, "reference processing failed");
                CitationResult {
                    original: reference.clone(),
                    formatted: reference,
                    warnings: vec!["Ошибка обработки ссылки".to_string()],
                    success: false,
                }
            }
        }
    }

    async fn try_process_line(
        &self,
        reference: &str,
        index: usize,
        today: NaiveDate,
    ) -> Result<CitationResult, PipelineError> {
        let annotated = cleaner::add_access_date(reference, today);
        let parsed = self.parser.parse_citation(&annotated).await;
        let item = csl::to_csl_item(&parsed, &format!("ref-{}", index), today);

        let mut warnings = Vec::new();
        let missing = csl::missing_fields(&item);
        if !missing.is_empty() {
            warnings.push(format!("Отсутствуют поля: {}", missing.join(", ")));
        }

        let formatted =
            format_bibliography(std::slice::from_ref(&item), self.style, self.engine.as_deref())
                .into_iter()
                .next()
                .ok_or(PipelineError::MissingFormattedEntry)?;

        Ok(CitationResult {
            original: reference.to_string(),
            formatted,
            warnings,
            success: true,
        })
    }
}
