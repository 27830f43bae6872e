use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Outcome for one reference line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationResult {
    /// The cleaned input line (or the raw line when processing failed).
    pub original: String,
    /// GOST-formatted bibliography entry.
    pub formatted: String,
    /// Human-readable warnings, e.g. missing fields.
    pub warnings: Vec<String>,
    pub success: bool,
}

/// Aggregated outcome of one processing request. This is the response
/// contract of the processing operation, serialized as-is for `--json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub results: Vec<CitationResult>,
    pub total_processed: usize,
    pub total_success: usize,
    pub total_warnings: usize,
}

impl ProcessSummary {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_processed: 0,
            total_success: 0,
            total_warnings: 0,
        }
    }

    /// Build a summary from per-line results.
    pub fn from_results(results: Vec<CitationResult>) -> Self {
        let total_processed = results.len();
        let total_success = results.iter().filter(|r| r.success).count();
        let total_warnings = results.iter().map(|r| r.warnings.len()).sum();

        Self {
            results,
            total_processed,
            total_success,
            total_warnings,
        }
    }

    pub fn count_failed(&self) -> usize {
        self.total_processed - self.total_success
    }

    /// Print the formatted bibliography and warnings to stdout with colors.
    pub fn print(&self) {
        println!();
        println!("{}", "Список литературы (ГОСТ)".bold());
        println!("{}", "=".repeat(50));
        println!();

        for (index, result) in self.results.iter().enumerate() {
            let number = format!("{}.", index + 1);
            if result.success {
                println!("{} {}", number.bold(), result.formatted);
            } else {
                println!("{} {}", number.bold(), result.formatted.dimmed());
            }

            for warning in &result.warnings {
                println!("   {} {}", "!".yellow().bold(), warning.yellow());
            }
        }

        println!();
        println!(
            "Обработано {} ссылок: {} успешно, {} с ошибками",
            self.total_processed,
            self.total_success.to_string().green(),
            self.count_failed().to_string().red()
        );

        if self.total_warnings > 0 {
            println!(
                "{}",
                format!("Предупреждений: {}", self.total_warnings).yellow()
            );
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_is_zero_valued() {
        let summary = ProcessSummary::empty();
        assert!(summary.results.is_empty());
        assert_eq!(summary.total_processed, 0);
        assert_eq!(summary.total_success, 0);
        assert_eq!(summary.total_warnings, 0);
    }

    #[test]
    fn summary_counts_follow_results() {
        let results = vec![
            CitationResult {
                original: "a".to_string(),
                formatted: "A.".to_string(),
                warnings: vec!["Отсутствуют поля: год".to_string()],
                success: true,
            },
            CitationResult {
                original: "b".to_string(),
                formatted: "b".to_string(),
                warnings: vec!["Ошибка обработки ссылки".to_string()],
                success: false,
            },
        ];

        let summary = ProcessSummary::from_results(results);
        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.total_success, 1);
        assert_eq!(summary.total_warnings, 2);
        assert_eq!(summary.count_failed(), 1);
    }

    #[test]
    fn serializes_with_camel_case_totals() {
        let summary = ProcessSummary::from_results(vec![CitationResult {
            original: "a".to_string(),
            formatted: "A.".to_string(),
            warnings: vec![],
            success: true,
        }]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalProcessed"], 1);
        assert_eq!(json["totalSuccess"], 1);
        assert_eq!(json["totalWarnings"], 0);
        assert_eq!(json["results"][0]["original"], "a");
    }
}
