use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBERING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\s*").unwrap());

static BRACKET_NUMBERING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[\d+\]\s*").unwrap());

static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\*\s*").unwrap());

static GLYPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[▶•→»]").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new("[\"«»“”]").unwrap());

static ET_AL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bet\s+al\.").unwrap());

static SOAVT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)и\s+соавт\.").unwrap());

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://[^\s)]+").unwrap());

/// Clean a single pasted reference line: drop numbering and decoration,
/// collapse whitespace, normalize the et-al abbreviation, and make sure the
/// line ends in sentence punctuation.
pub fn clean_line(text: &str) -> String {
    let mut cleaned = NUMBERING_RE.replace(text, "").into_owned();
    cleaned = BRACKET_NUMBERING_RE.replace(&cleaned, "").into_owned();
    cleaned = BULLET_RE.replace(&cleaned, "").into_owned();
    cleaned = GLYPH_RE.replace_all(&cleaned, "").into_owned();
    cleaned = WHITESPACE_RE.replace_all(&cleaned, " ").into_owned();
    cleaned = QUOTE_RE.replace_all(&cleaned, "").into_owned();
    cleaned = ET_AL_RE.replace_all(&cleaned, "и др.").into_owned();
    cleaned = SOAVT_RE.replace_all(&cleaned, "и др.").into_owned();

    let mut cleaned = cleaned.trim().to_string();
    if !cleaned.is_empty() && !cleaned.ends_with(['.', '!', '?']) {
        cleaned.push('.');
    }

    cleaned
}

/// Split pasted text into cleaned reference lines, one per input line.
/// Lines that clean down to nothing are dropped; order is preserved.
pub fn split_references(text: &str) -> Vec<String> {
    text.lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Append the GOST access-date annotation to a URL-bearing line.
/// Idempotent: a line already carrying "дата обращения" is returned as-is.
pub fn add_access_date(text: &str, today: NaiveDate) -> String {
    if URL_RE.is_match(text) && !text.contains("дата обращения") {
        format!("{} (дата обращения: {})", text, today.format("%d.%m.%Y"))
    } else {
        text.to_string()
    }
}

/// First literal URL in a line, if any. Used by the parser adapter as a
/// fallback when the service extracts no URL.
pub fn extract_url(text: &str) -> Option<String> {
    // Cleaned lines end in a period; that period is not part of the URL.
    URL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn strips_numbering_variants() {
        assert_eq!(clean_line("1. Иванов И.И. Статья."), "Иванов И.И. Статья.");
        assert_eq!(clean_line("[12] Petrov A. Paper."), "Petrov A. Paper.");
        assert_eq!(clean_line("* Сидоров С. Книга."), "Сидоров С. Книга.");
    }

    #[test]
    fn removes_glyphs_and_quotes() {
        assert_eq!(
            clean_line("▶ Иванов И. «Заголовок» // Журнал."),
            "Иванов И. Заголовок // Журнал."
        );
    }

    #[test]
    fn collapses_whitespace_and_adds_period() {
        assert_eq!(clean_line("Иванов  И.   Статья"), "Иванов И. Статья.");
        assert_eq!(clean_line("Вопрос?"), "Вопрос?");
    }

    #[test]
    fn normalizes_et_al() {
        assert_eq!(clean_line("Smith J. et al. Title."), "Smith J. и др. Title.");
        assert_eq!(
            clean_line("Иванов И. и соавт. Название."),
            "Иванов И. и др. Название."
        );
    }

    #[test]
    fn clean_is_idempotent() {
        let inputs = [
            "1. Иванов И.И. Заголовок статьи // Журнал. 2020",
            "[3]  «Название»  et al.",
            "* https://example.com/paper",
        ];
        for input in inputs {
            let once = clean_line(input);
            assert_eq!(clean_line(&once), once);
        }
    }

    #[test]
    fn split_drops_empty_lines_and_preserves_order() {
        let text = "1. Первая ссылка\n\n   \n2. Вторая ссылка";
        let refs = split_references(text);
        assert_eq!(refs, vec!["Первая ссылка.", "Вторая ссылка."]);
    }

    #[test]
    fn access_date_added_for_urls() {
        let line = "Статья. https://example.com/paper.";
        assert_eq!(
            add_access_date(line, date()),
            "Статья. https://example.com/paper. (дата обращения: 07.03.2024)"
        );
    }

    #[test]
    fn access_date_skipped_without_url() {
        let line = "Иванов И. Статья.";
        assert_eq!(add_access_date(line, date()), line);
    }

    #[test]
    fn access_date_is_idempotent() {
        let line = "https://example.com (дата обращения: 01.01.2020)";
        let once = add_access_date(line, date());
        assert_eq!(once, line);
        assert_eq!(add_access_date(&once, date()), once);
    }

    #[test]
    fn extracts_first_url() {
        assert_eq!(
            extract_url("см. https://example.com/paper) и далее"),
            Some("https://example.com/paper".to_string())
        );
        assert_eq!(
            extract_url("Название. https://example.com/paper."),
            Some("https://example.com/paper".to_string())
        );
        assert_eq!(extract_url("без ссылок"), None);
    }
}
