//! Local content inspection.
//!
//! [`ContentInspectingLayoutAnalyser`] parses document bytes in-process and
//! dispatches on MIME type, then on the object key extension:
//!
//! | Format | Module | Feature |
//! |---|---|---|
//! | PDF | `pdf` (lopdf) | `pdf` |
//! | RFC822 e-mail | `email` (mail-parser) | `email` |
//! | HTML | `html` | always |
//! | Plain text | `text` | always |
use super::LayoutAnalyser;
use crate::core::mime;
use crate::types::{DocumentDescriptor, DocumentProfile, PageMetrics};
use crate::{Result, RouterError};

#[cfg(feature = "email")]
pub mod email;
pub mod html;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod text;

/// Formats the inspector knows how to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectedFormat {
    Pdf,
    Email,
    Html,
    PlainText,
}

impl InspectedFormat {
    /// Classify a descriptor; PDF and e-mail are checked before markup and text.
    pub fn detect(descriptor: &DocumentDescriptor) -> Option<Self> {
        let mime_type = descriptor.mime_type.as_str();
        let key = descriptor.object_key.as_str();
        if mime::is_pdf(mime_type, key) {
            Some(InspectedFormat::Pdf)
        } else if mime::is_email(mime_type, key) {
            Some(InspectedFormat::Email)
        } else if mime::is_html(mime_type, key) {
            Some(InspectedFormat::Html)
        } else if mime::is_plain_text(mime_type, key) {
            Some(InspectedFormat::PlainText)
        } else {
            None
        }
    }
}

/// Parses raw document bytes locally.
///
/// Needs content: without bytes it fails with `MissingContent`, and formats it
/// cannot measure fail with `UnsupportedContent`. Chain it with a
/// [`FallbackAnalyser`](super::FallbackAnalyser) to recover.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentInspectingLayoutAnalyser;

impl ContentInspectingLayoutAnalyser {
    pub fn new() -> Self {
        Self
    }

    fn measure(&self, format: InspectedFormat, data: &[u8]) -> Result<Vec<PageMetrics>> {
        match format {
            InspectedFormat::Pdf => measure_pdf(data),
            InspectedFormat::Email => measure_email(data),
            InspectedFormat::Html => Ok(vec![html::html_page_metrics(&String::from_utf8_lossy(data), 0)]),
            InspectedFormat::PlainText => Ok(vec![text::text_page_metrics(&String::from_utf8_lossy(data), 0)]),
        }
    }
}

#[cfg(feature = "pdf")]
fn measure_pdf(data: &[u8]) -> Result<Vec<PageMetrics>> {
    pdf::pdf_page_metrics(data)
}

#[cfg(not(feature = "pdf"))]
fn measure_pdf(_data: &[u8]) -> Result<Vec<PageMetrics>> {
    Err(RouterError::UnsupportedContent(
        "PDF inspection requires the 'pdf' feature".to_string(),
    ))
}

#[cfg(feature = "email")]
fn measure_email(data: &[u8]) -> Result<Vec<PageMetrics>> {
    email::email_page_metrics(data)
}

#[cfg(not(feature = "email"))]
fn measure_email(_data: &[u8]) -> Result<Vec<PageMetrics>> {
    Err(RouterError::UnsupportedContent(
        "E-mail inspection requires the 'email' feature".to_string(),
    ))
}

impl LayoutAnalyser for ContentInspectingLayoutAnalyser {
    fn name(&self) -> &str {
        "content_inspecting"
    }

    fn requires_content(&self) -> bool {
        true
    }

    fn analyse(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<DocumentProfile> {
        let data = content
            .filter(|data| !data.is_empty())
            .ok_or_else(|| RouterError::MissingContent(descriptor.object_key.clone()))?;

        let format = InspectedFormat::detect(descriptor)
            .ok_or_else(|| RouterError::UnsupportedContent(descriptor.mime_type.clone()))?;

        let pages = self.measure(format, data)?;
        if pages.is_empty() {
            return Err(RouterError::parsing(format!(
                "No pages found in '{}'",
                descriptor.object_key
            )));
        }

        tracing::debug!(
            object_key = %descriptor.object_key,
            format = ?format,
            pages = pages.len(),
            "Inspected document content"
        );
        Ok(DocumentProfile::from_pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(key: &str, mime_type: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            object_key: key.to_string(),
            bucket: None,
            payload: json!({}),
            mime_type: mime_type.to_string(),
            request_override: None,
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            InspectedFormat::detect(&descriptor("a.bin", "application/pdf")),
            Some(InspectedFormat::Pdf)
        );
        assert_eq!(
            InspectedFormat::detect(&descriptor("mail/1.eml", "application/octet-stream")),
            Some(InspectedFormat::Email)
        );
        assert_eq!(
            InspectedFormat::detect(&descriptor("a", "text/html")),
            Some(InspectedFormat::Html)
        );
        assert_eq!(
            InspectedFormat::detect(&descriptor("notes.txt", "application/octet-stream")),
            Some(InspectedFormat::PlainText)
        );
        assert_eq!(InspectedFormat::detect(&descriptor("clip.mp4", "video/mp4")), None);
    }

    #[test]
    fn test_missing_content() {
        let err = ContentInspectingLayoutAnalyser
            .analyse(&descriptor("a.txt", "text/plain"), None)
            .unwrap_err();
        assert!(matches!(err, RouterError::MissingContent(_)));
    }

    #[test]
    fn test_unsupported_content() {
        let err = ContentInspectingLayoutAnalyser
            .analyse(&descriptor("clip.mp4", "video/mp4"), Some(b"\x00\x00\x00\x18ftypmp42"))
            .unwrap_err();
        assert!(matches!(err, RouterError::UnsupportedContent(mime) if mime == "video/mp4"));
    }

    #[test]
    fn test_plain_text_profile() {
        let body = "line of text\n".repeat(100);
        let profile = ContentInspectingLayoutAnalyser
            .analyse(&descriptor("notes.txt", "text/plain"), Some(body.as_bytes()))
            .unwrap();
        assert_eq!(profile.page_count(), 1);
        assert!(profile.total_chars() > 1000);
    }

    #[test]
    fn test_html_profile() {
        let page = "<html><body><table><tr><td>a</td></tr></table><table></table><table></table></body></html>";
        let profile = ContentInspectingLayoutAnalyser
            .analyse(&descriptor("index.html", "text/html"), Some(page.as_bytes()))
            .unwrap();
        assert_eq!(profile.total_tables(), 3);
        assert_eq!(profile.tables_per_page(), 3.0);
    }
}
