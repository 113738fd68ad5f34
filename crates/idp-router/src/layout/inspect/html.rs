//! Page metrics for HTML documents and HTML e-mail bodies.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::PageMetrics;

/// Characters that make a fully dense HTML page.
const HTML_CHARS_PER_PAGE: f64 = 4000.0;
const IMAGE_DENSITY_PER_IMAGE: f64 = 0.1;
const TABLE_DENSITY_PER_TABLE: f64 = 0.25;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").expect("tag regex is valid"));
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex is valid"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex is valid"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").expect("entity regex is valid")
});
static INPUT_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\btype\s*=\s*["']?([a-z]+)"#).expect("input type regex is valid"));

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TagCounts {
    tables: u32,
    images: u32,
    checkboxes: u32,
    radio_buttons: u32,
}

fn count_tags(html: &str) -> TagCounts {
    let mut counts = TagCounts::default();
    for captures in TAG_RE.captures_iter(html) {
        if !captures[1].is_empty() {
            continue;
        }
        let tag = captures[2].to_ascii_lowercase();
        match tag.as_str() {
            "table" => counts.tables += 1,
            "img" => counts.images += 1,
            "input" => {
                let input_type = INPUT_TYPE_RE
                    .captures(&captures[3])
                    .map(|c| c[1].to_ascii_lowercase())
                    .unwrap_or_default();
                match input_type.as_str() {
                    "checkbox" => counts.checkboxes += 1,
                    "radio" => counts.radio_buttons += 1,
                    _ => {}
                }
            }
            _ => {}
        }
    }
    counts
}

/// Visible text of an HTML fragment with entities counted as one character.
pub(crate) fn visible_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    let without_styles = STYLE_RE.replace_all(&without_scripts, "");
    let without_tags = TAG_RE.replace_all(&without_styles, "");
    ENTITY_RE.replace_all(&without_tags, "_").into_owned()
}

/// Metrics for one HTML page or body part.
pub fn html_page_metrics(html: &str, index: u32) -> PageMetrics {
    let counts = count_tags(html);
    let char_count = visible_text(html).trim().chars().count() as u64;

    PageMetrics::new(
        index,
        char_count as f64 / HTML_CHARS_PER_PAGE,
        counts.images as f64 * IMAGE_DENSITY_PER_IMAGE,
        counts.tables as f64 * TABLE_DENSITY_PER_TABLE,
    )
    .with_char_count(char_count)
    .with_tables(counts.tables)
    .with_images(counts.images)
    .with_form_fields(counts.checkboxes, counts.radio_buttons)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"<html><head><style>p { color: red }</style></head><body>
        <h1>Claim &amp; Intake</h1>
        <table><tr><td>Policy</td></tr></table>
        <TABLE><tr><td>Amount</td></tr></TABLE>
        <img src="logo.png">
        <input type="checkbox" name="a"><input TYPE='radio' name="b"><input type=radio name="c">
        <input type="text" name="d">
        <script>var hidden = "not counted";</script>
    </body></html>"#;

    #[test]
    fn test_counts_tags() {
        let metrics = html_page_metrics(FORM, 0);
        assert_eq!(metrics.table_count, 2);
        assert_eq!(metrics.image_count, 1);
        assert_eq!(metrics.checkbox_count, 1);
        assert_eq!(metrics.radio_button_count, 2);
        assert!((metrics.table_density - 0.5).abs() < 1e-9);
        assert!((metrics.image_density - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_visible_text_excludes_markup() {
        let text = visible_text(FORM);
        assert!(text.contains("Claim _ Intake"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn test_text_density_scale() {
        let body = format!("<p>{}</p>", "x".repeat(2000));
        let metrics = html_page_metrics(&body, 3);
        assert_eq!(metrics.index, 3);
        assert_eq!(metrics.char_count, Some(2000));
        assert!((metrics.text_density - 0.5).abs() < 1e-9);

        let dense = format!("<p>{}</p>", "x".repeat(9000));
        assert_eq!(html_page_metrics(&dense, 0).text_density, 1.0);
    }
}
