//! Accent-insensitive whole-word matching of configured terms.

use regex::{Regex, RegexBuilder};
use tenderwatch_shared::{Result, TenderWatchError};

/// Character classes that may not touch either end of a match.
const WORD_CHARS: &str = r"\p{L}\p{N}\p{M}";

/// Matches any of a list of terms anywhere in a text.
///
/// Each vowel in a term matches its accented variants, whitespace matches any
/// whitespace run, and the match may not be glued to a letter, digit or
/// combining mark on either side. Case-insensitive. A matcher built from no
/// terms matches nothing.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    regex: Option<Regex>,
}

impl TermMatcher {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = terms
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(term_pattern)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }

        let pattern = format!(
            "(?:^|[^{inner}])(?:{alts})(?:$|[^{inner}])",
            inner = WORD_CHARS,
            alts = alternatives.join("|"),
        );

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| TenderWatchError::validation(format!("invalid term list: {e}")))?;

        Ok(Self { regex: Some(regex) })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// Regex fragment for one term.
fn term_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() * 4);
    let mut in_space = false;

    for ch in term.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push_str(r"\s+");
                in_space = true;
            }
            continue;
        }
        in_space = false;

        match vowel_class(ch) {
            Some(class) => {
                out.push_str(class);
                out.push_str(r"\p{M}*");
            }
            None => out.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

fn vowel_class(ch: char) -> Option<&'static str> {
    let class = match ch.to_lowercase().next()? {
        'a' | 'á' | 'à' | 'â' | 'ä' => "[aáàâä]",
        'e' | 'é' | 'è' | 'ê' | 'ë' => "[eéèêë]",
        'i' | 'í' | 'ì' | 'î' | 'ï' => "[iíìîï]",
        'o' | 'ó' | 'ò' | 'ô' | 'ö' => "[oóòôö]",
        'u' | 'ú' | 'ù' | 'û' | 'ü' => "[uúùûü]",
        _ => return None,
    };
    Some(class)
}
