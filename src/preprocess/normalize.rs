use std::sync::LazyLock;

use regex::Regex;

use super::chunker::PARAGRAPH_SEPARATOR;

static BLANK_LINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());
static WHITESPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonicalize the whitespace of one page of extracted text.
///
/// Runs of blank lines are first reduced to a single blank line, then every whitespace run
/// (newlines included) becomes one space and the ends are trimmed.
pub fn normalize_text(raw: &str) -> String {
    let collapsed = BLANK_LINE_RUNS.replace_all(raw, "\n\n");
    WHITESPACE_RUNS
        .replace_all(&collapsed, " ")
        .trim()
        .to_string()
}

/// Normalize every page and join them into one text, one paragraph per non-empty page.
pub fn normalize_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| normalize_text(page.as_ref()))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(
            normalize_text("  Intro\n\n\n\nBody\ttext \r\n  end  "),
            "Intro Body text end"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "",
            "   ",
            "a\n\n\n\nb",
            "\u{a0}lead\u{2003}and\n trail\n\n",
            "one\ntwo\n\nthree\n\n\n\nfour",
        ];
        for sample in samples {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "input: {sample:?}");
        }
    }

    #[test]
    fn pages_become_paragraphs() {
        let pages = vec![
            "First  page\nline".to_string(),
            "\n\n  \n".to_string(),
            "Second\n\npage".to_string(),
        ];
        assert_eq!(normalize_pages(&pages), "First page line\n\nSecond page");
    }
}
