//! Text cleanup for keyword matching.
//!
//! Title and summary arrive as raw feed text: numeric and named entities,
//! inline markup, and sometimes escaped markup that only becomes a tag once
//! decoded. Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Strip markup, decode entities and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let mut result = strip_tags(raw);
    result = decode_entities(&result);
    result = strip_tags(&result);
    collapse_whitespace(&result)
}

/// Replace every tag with a space so adjacent words stay apart.
///
/// Only well-formed tags and comments match, so a decoded `<` or `>` used
/// as a comparison sign stays in the text.
fn strip_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r#"(?s)<!--.*?-->|</?[A-Za-z][A-Za-z0-9-]*(?:\s+[A-Za-z_:][-A-Za-z0-9_:.]*(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*\s*/?>"#,
        )
        .expect("valid regex")
    });

    TAG_RE.replace_all(text, " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    Html::parse_fragment(text)
        .root_element()
        .text()
        .collect::<String>()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_and_named_entities() {
        assert_eq!(clean_text("Instalaci&#243;n &amp; climatizaci&oacute;n"), "Instalación & climatización");
    }

    #[test]
    fn strips_markup_with_spacing() {
        assert_eq!(clean_text("Planta<b>fotovoltaica</b>\n\n  muelle"), "Planta fotovoltaica muelle");
    }

    #[test]
    fn strips_escaped_markup() {
        assert_eq!(clean_text("&lt;p&gt;Eficiencia energ&#233;tica&lt;/p&gt;"), "Eficiencia energética");
    }

    #[test]
    fn keeps_escaped_comparison_signs() {
        assert_eq!(clean_text("a &lt; b y c &gt; d"), "a < b y c > d");
        assert_eq!(clean_text("importe &lt;= 40.000 &#8364;"), "importe <= 40.000 €");
    }

    #[test]
    fn strips_tags_with_attributes_and_comments() {
        assert_eq!(
            clean_text(r#"<a href="x.html" class='c'>Lote 1</a><!-- nota -->Suministro<br/>"#),
            "Lote 1 Suministro"
        );
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(clean_text("obra civil"), "obra civil");
        assert_eq!(clean_text(""), "");
    }
}
