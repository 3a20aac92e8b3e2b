//! Text Formatter
//!
//! Turns generated text into the small markup dialect surfaces render:
//! paragraphs, line breaks and emphasized reading keywords.
//!
//! The transform is a pure function of its input. Streaming callers re-format
//! the whole accumulated text after every fragment, never the delta.

use std::sync::OnceLock;

use regex::Regex;

use crate::language::Language;

const KEYWORDS_ZH: &[&str] = &[
    "愛情", "事業", "學業", "財運", "健康", "整體運勢", "建議", "提醒", "過去", "現在", "未來",
    "總結", "綜合建議",
];

const KEYWORDS_EN: &[&str] = &[
    "love",
    "career",
    "studies",
    "wealth",
    "health",
    "overall fortune",
    "advice",
    "reminder",
    "past",
    "present",
    "future",
    "summary",
    "overall advice",
];

/// Emphasis keywords for a language
#[must_use]
pub fn keywords(language: Language) -> &'static [&'static str] {
    match language {
        Language::TraditionalChinese => KEYWORDS_ZH,
        Language::English => KEYWORDS_EN,
    }
}

fn keyword_pattern(language: Language) -> &'static Regex {
    static ZH: OnceLock<Regex> = OnceLock::new();
    static EN: OnceLock<Regex> = OnceLock::new();

    let (cell, word_bounded) = match language {
        Language::TraditionalChinese => (&ZH, false),
        Language::English => (&EN, true),
    };
    cell.get_or_init(|| build_pattern(keywords(language), word_bounded))
}

fn build_pattern(words: &[&str], word_bounded: bool) -> Regex {
    // Longest first so "overall advice" wins over "advice"
    let mut sorted: Vec<&str> = words.to_vec();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    let alternation = sorted
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");

    let pattern = if word_bounded {
        format!(r"(?i)\b(?:{alternation})\b(?:\s*[:：])?")
    } else {
        format!(r"(?i)(?:{alternation})(?:\s*[:：])?")
    };
    // Built from escaped literals only
    Regex::new(&pattern).expect("keyword pattern is valid")
}

fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn paragraph_breaks() -> &'static Regex {
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    BREAKS.get_or_init(|| Regex::new(r"\n{2,}").expect("paragraph pattern is valid"))
}

/// Format generated text as markup
///
/// 1. runs of two or more line breaks become a paragraph break
/// 2. remaining single line breaks become `<br>`
/// 3. keywords (optionally followed by a colon) are wrapped in `<strong>`
/// 4. the result is wrapped in one `<p>` container
#[must_use]
pub fn format_markup(language: Language, text: &str) -> String {
    let escaped = escape_markup(&text.replace("\r\n", "\n"));
    let paragraphs = paragraph_breaks().replace_all(&escaped, "</p><p>");
    let lines = paragraphs.replace('\n', "<br>");
    let emphasized = keyword_pattern(language).replace_all(&lines, "<strong>$0</strong>");
    format!("<p>{emphasized}</p>")
}
