use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // A word optionally wrapped in quotes, brackets and trailing punctuation.
    static ref WORD: Regex =
        Regex::new(r#"^["'(«„“]*(\p{L}+)[;:,.!?)"'»“”…]*$"#).expect("valid regex");
}

/// Split text into surface terms: NFKC normalization, lowercase, surrounding
/// punctuation stripped. Tokens containing digits, hyphens or other inner
/// symbols are not words and are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    normalized
        .split_whitespace()
        .filter_map(|raw| WORD.captures(raw).map(|c| c[1].to_string()))
        .collect()
}
