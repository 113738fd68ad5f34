//! Page metrics for plain-text documents and text e-mail bodies.
use crate::types::PageMetrics;

/// Characters that make a fully dense text page.
const TEXT_CHARS_PER_PAGE: f64 = 3000.0;
const TEXT_IMAGE_DENSITY: f64 = 0.05;

pub fn text_page_metrics(text: &str, index: u32) -> PageMetrics {
    let char_count = text.trim().chars().count() as u64;
    PageMetrics::new(index, char_count as f64 / TEXT_CHARS_PER_PAGE, TEXT_IMAGE_DENSITY, 0.0).with_char_count(char_count)
}
