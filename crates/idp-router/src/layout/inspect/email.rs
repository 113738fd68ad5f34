//! RFC822 e-mail inspection: one page per text or HTML body part.
use mail_parser::{MessageParser, PartType};

use super::html::html_page_metrics;
use super::text::text_page_metrics;
use crate::types::PageMetrics;
use crate::{Result, RouterError};

/// Page metrics for every text-bearing part of a message.
///
/// A message without any text part is measured as plain text.
pub fn email_page_metrics(data: &[u8]) -> Result<Vec<PageMetrics>> {
    let message = MessageParser::default()
        .parse(data)
        .ok_or_else(|| RouterError::parsing("Failed to parse e-mail: invalid RFC822 message"))?;

    let mut pages = Vec::new();
    for part in &message.parts {
        let index = pages.len() as u32;
        match &part.body {
            PartType::Html(html) => pages.push(html_page_metrics(html, index)),
            PartType::Text(text) => pages.push(text_page_metrics(text, index)),
            _ => {}
        }
    }

    if pages.is_empty() {
        pages.push(text_page_metrics(&String::from_utf8_lossy(data), 0));
    }

    Ok(pages)
}
